// ============================================================
// Layer 4 — Substructure Patterns (SMARTS subset)
// ============================================================
// Compiles the SMARTS entries of the fingerprint key table and
// the QED descriptor queries, and tests molecules for them.
//
// Supported atom primitives:
//   *  a  A  C c N n Hg ...  #n  Hn  Dn  Xn  vn  +n -n
//   R (in ring)  R0 (not in ring)  Rn (in n rings)
//   r (in ring)  r0  rn (smallest ring has n atoms)
//   $(...) recursive query rooted at its first atom
//   isotope prefix ([13C]); labels are not stored, never matches
//   operators: ! (not)  & and implicit (high and)  , (or)  ; (low and)
// Supported bond primitives:
//   - = # : ~ @ / \   with the same operators
//
// Matching is a backtracking search that extends the mapping one
// pattern atom at a time, always next to an atom already mapped
// so candidate sets stay small.

use std::collections::{HashMap, HashSet};

use crate::chem::molecule::{BondOrder, Element, Molecule};
use crate::domain::error::{GenError, GenResult};

// ─── Expressions ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
enum Expr<P> {
    Prim(P),
    Not(Box<Expr<P>>),
    And(Box<Expr<P>>, Box<Expr<P>>),
    Or(Box<Expr<P>>, Box<Expr<P>>),
}

impl<P> Expr<P> {
    fn eval(&self, f: &impl Fn(&P) -> bool) -> bool {
        match self {
            Expr::Prim(p)   => f(p),
            Expr::Not(e)    => !e.eval(f),
            Expr::And(a, b) => a.eval(f) && b.eval(f),
            Expr::Or(a, b)  => a.eval(f) || b.eval(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AtomPrim {
    Any,
    Aromatic,
    Aliphatic,
    Element { number: u8, aromatic: Option<bool> },
    Hydrogens(u8),
    Degree(u8),
    Connectivity(u8),
    Valence(u8),
    InRing(bool),
    RingCount(u8),
    RingSize(u8),
    Isotope(u16),
    Charge(i8),
    Recursive(Box<Pattern>),
}

#[derive(Debug, Clone, PartialEq)]
enum BondPrim {
    Single,
    Double,
    Triple,
    Aromatic,
    Any,
    Ring,
}

impl AtomPrim {
    fn matches(&self, mol: &Molecule, idx: usize) -> bool {
        let atom = mol.atom(idx);
        match self {
            AtomPrim::Any => true,
            AtomPrim::Aromatic => atom.aromatic,
            AtomPrim::Aliphatic => !atom.aromatic,
            AtomPrim::Element { number, aromatic } => {
                atom.number() == *number && aromatic.map_or(true, |a| a == atom.aromatic)
            }
            AtomPrim::Hydrogens(h) => atom.hydrogens == *h,
            AtomPrim::Degree(d) => mol.degree(idx) == *d as usize,
            AtomPrim::Connectivity(x) => mol.degree(idx) + atom.hydrogens as usize == *x as usize,
            AtomPrim::Valence(v) => mol.bond_valence(idx) + atom.hydrogens == *v,
            AtomPrim::InRing(r) => mol.is_ring_atom(idx) == *r,
            AtomPrim::RingCount(n) => mol.ring_count(idx) == *n as usize,
            AtomPrim::RingSize(n) => mol.smallest_ring(idx) == Some(*n as usize),
            AtomPrim::Isotope(_) => false,
            AtomPrim::Charge(c) => atom.charge == *c,
            AtomPrim::Recursive(p) => p.matches_at(mol, idx),
        }
    }
}

impl BondPrim {
    fn matches(&self, mol: &Molecule, bond: usize) -> bool {
        let order = mol.bond(bond).order;
        match self {
            BondPrim::Single   => order == BondOrder::Single,
            BondPrim::Double   => order == BondOrder::Double,
            BondPrim::Triple   => order == BondOrder::Triple,
            BondPrim::Aromatic => order == BondOrder::Aromatic,
            BondPrim::Any      => true,
            BondPrim::Ring     => mol.is_ring_bond(bond),
        }
    }
}

// ─── Pattern ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    atoms:     Vec<Expr<AtomPrim>>,
    /// (a, b, expr); `None` = SMILES default (single or aromatic)
    bonds:     Vec<(usize, usize, Option<Expr<BondPrim>>)>,
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl Pattern {
    pub fn parse(smarts: &str) -> GenResult<Pattern> {
        Parser::new(smarts).parse()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// True when some injective mapping of pattern atoms onto
    /// molecule atoms satisfies every atom and bond expression.
    pub fn matches(&self, mol: &Molecule) -> bool {
        self.search(mol, None, &mut |_| true)
    }

    /// Like `matches`, with pattern atom 0 fixed on `atom`.
    pub fn matches_at(&self, mol: &Molecule, atom: usize) -> bool {
        self.search(mol, Some(atom), &mut |_| true)
    }

    /// Number of distinct molecule atom sets the pattern maps onto.
    /// Symmetric mappings of the same atoms count once.
    pub fn count_unique(&self, mol: &Molecule) -> usize {
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        self.search(mol, None, &mut |mapping| {
            let mut key = mapping.to_vec();
            key.sort_unstable();
            seen.insert(key);
            false
        });
        seen.len()
    }

    /// Runs `visit` on every complete mapping until it returns true.
    fn search(
        &self,
        mol:   &Molecule,
        root:  Option<usize>,
        visit: &mut dyn FnMut(&[usize]) -> bool,
    ) -> bool {
        if self.atoms.is_empty() {
            return true;
        }
        if self.atoms.len() > mol.atom_count() || root.is_some_and(|r| r >= mol.atom_count()) {
            return false;
        }
        let order = self.search_order();
        let mut mapping = vec![usize::MAX; self.atoms.len()];
        let mut used    = vec![false; mol.atom_count()];
        let mut state   = Search { order: &order, mol, root, mapping: &mut mapping, used: &mut used };
        self.extend(0, &mut state, visit)
    }

    /// Breadth-first order; every atom after a component root
    /// carries an already-placed neighbour as anchor.
    fn search_order(&self) -> Vec<(usize, Option<usize>)> {
        let mut seen  = vec![false; self.atoms.len()];
        let mut order = Vec::with_capacity(self.atoms.len());
        for root in 0..self.atoms.len() {
            if seen[root] {
                continue;
            }
            seen[root] = true;
            order.push((root, None));
            let mut head = order.len() - 1;
            while head < order.len() {
                let (cur, _) = order[head];
                head += 1;
                for &(next, _) in &self.adjacency[cur] {
                    if !seen[next] {
                        seen[next] = true;
                        order.push((next, Some(cur)));
                    }
                }
            }
        }
        order
    }

    fn extend(
        &self,
        depth: usize,
        st:    &mut Search<'_>,
        visit: &mut dyn FnMut(&[usize]) -> bool,
    ) -> bool {
        let Some(&(p, anchor)) = st.order.get(depth) else { return visit(&st.mapping[..]) };
        let candidates: Vec<usize> = match (anchor, st.root) {
            (Some(a), _) => st.mol.neighbors(st.mapping[a]).iter().map(|&(n, _)| n).collect(),
            (None, Some(r)) if depth == 0 => vec![r],
            (None, _) => (0..st.mol.atom_count()).collect(),
        };
        for c in candidates {
            if st.used[c] || !self.atom_matches(p, st.mol, c) {
                continue;
            }
            let bonds_ok = self.adjacency[p].iter().all(|&(q, bond)| {
                if st.mapping[q] == usize::MAX {
                    return true;
                }
                st.mol
                    .bond_between(c, st.mapping[q])
                    .is_some_and(|mb| self.bond_matches(bond, st.mol, mb))
            });
            if !bonds_ok {
                continue;
            }
            st.mapping[p] = c;
            st.used[c]    = true;
            let done = self.extend(depth + 1, st, visit);
            st.mapping[p] = usize::MAX;
            st.used[c]    = false;
            if done {
                return true;
            }
        }
        false
    }

    fn atom_matches(&self, p: usize, mol: &Molecule, idx: usize) -> bool {
        self.atoms[p].eval(&|prim: &AtomPrim| prim.matches(mol, idx))
    }

    fn bond_matches(&self, bond: usize, mol: &Molecule, mb: usize) -> bool {
        match &self.bonds[bond].2 {
            Some(expr) => expr.eval(&|prim: &BondPrim| prim.matches(mol, mb)),
            None => matches!(mol.bond(mb).order, BondOrder::Single | BondOrder::Aromatic),
        }
    }
}

/// Mutable state of one backtracking search.
struct Search<'a> {
    order:   &'a [(usize, Option<usize>)],
    mol:     &'a Molecule,
    root:    Option<usize>,
    mapping: &'a mut [usize],
    used:    &'a mut [bool],
}

// ─── Parser ───────────────────────────────────────────────────────────────────
struct Parser {
    chars: Vec<char>,
    pos:   usize,
}

impl Parser {
    fn new(smarts: &str) -> Self {
        Self { chars: smarts.trim().chars().collect(), pos: 0 }
    }

    fn err(&self, message: impl Into<String>) -> GenError {
        GenError::Pattern { index: self.pos, message: message.into() }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse(mut self) -> GenResult<Pattern> {
        if self.chars.is_empty() {
            return Err(self.err("empty pattern"));
        }
        let mut atoms: Vec<Expr<AtomPrim>> = Vec::new();
        let mut bonds: Vec<(usize, usize, Option<Expr<BondPrim>>)> = Vec::new();
        let mut prev: Option<usize> = None;
        let mut stack: Vec<Option<usize>> = Vec::new();
        let mut pending: Option<Expr<BondPrim>> = None;
        let mut rings: HashMap<u32, (usize, Option<Expr<BondPrim>>)> = HashMap::new();

        while let Some(c) = self.peek() {
            match c {
                '(' => {
                    if prev.is_none() {
                        return Err(self.err("branch without atom"));
                    }
                    stack.push(prev);
                    self.pos += 1;
                }
                ')' => {
                    prev = stack.pop().ok_or_else(|| self.err("unmatched ')'"))?;
                    self.pos += 1;
                }
                '.' => {
                    prev = None;
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '~' | '@' | '/' | '\\' | '!' => {
                    pending = Some(self.bond_expr()?);
                }
                '0'..='9' | '%' => {
                    let number = self.ring_number()?;
                    let atom = prev.ok_or_else(|| self.err("ring closure without atom"))?;
                    match rings.remove(&number) {
                        Some((start, opened)) => {
                            bonds.push((start, atom, pending.take().or(opened)));
                        }
                        None => {
                            rings.insert(number, (atom, pending.take()));
                        }
                    }
                }
                '[' => {
                    self.pos += 1;
                    let expr = self.low_and()?;
                    if self.peek() != Some(']') {
                        return Err(self.err("expected ']'"));
                    }
                    self.pos += 1;
                    atoms.push(expr);
                    let idx = atoms.len() - 1;
                    if let Some(p) = prev {
                        bonds.push((p, idx, pending.take()));
                    }
                    prev = Some(idx);
                }
                _ => {
                    let expr = self.organic_atom()?;
                    atoms.push(expr);
                    let idx = atoms.len() - 1;
                    if let Some(p) = prev {
                        bonds.push((p, idx, pending.take()));
                    }
                    prev = Some(idx);
                }
            }
        }
        if !stack.is_empty() || !rings.is_empty() {
            return Err(self.err("unclosed branch or ring"));
        }

        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (i, &(a, b, _)) in bonds.iter().enumerate() {
            adjacency[a].push((b, i));
            adjacency[b].push((a, i));
        }
        Ok(Pattern { atoms, bonds, adjacency })
    }

    fn ring_number(&mut self) -> GenResult<u32> {
        if self.peek() == Some('%') {
            let digits: String = self.chars.iter().skip(self.pos + 1).take(2).collect();
            self.pos += 3;
            digits.parse().map_err(|_| self.err("bad %nn ring number"))
        } else {
            let d = self.peek().and_then(|c| c.to_digit(10)).unwrap_or(0);
            self.pos += 1;
            Ok(d)
        }
    }

    fn organic_atom(&mut self) -> GenResult<Expr<AtomPrim>> {
        let c = self.peek().ok_or_else(|| self.err("unexpected end"))?;
        let next = self.chars.get(self.pos + 1).copied();
        if c == 'C' && next == Some('l') || c == 'B' && next == Some('r') {
            let sym: String = [c, next.unwrap_or_default()].iter().collect();
            self.pos += 2;
            return Ok(element_prim(&sym, Some(false)).map(Expr::Prim).ok_or_else(|| self.err(sym))?);
        }
        self.pos += 1;
        let prim = match c {
            '*' => AtomPrim::Any,
            'a' => AtomPrim::Aromatic,
            'A' => AtomPrim::Aliphatic,
            'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' => {
                element_prim(&c.to_string(), Some(false)).ok_or_else(|| self.err(c.to_string()))?
            }
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => {
                element_prim(&c.to_ascii_uppercase().to_string(), Some(true))
                    .ok_or_else(|| self.err(c.to_string()))?
            }
            _ => return Err(self.err(format!("unexpected '{c}'"))),
        };
        Ok(Expr::Prim(prim))
    }

    // ── Bracket atom expression: ; < , < & / implicit < ! ─────────────────────
    fn low_and(&mut self) -> GenResult<Expr<AtomPrim>> {
        let mut left = self.or()?;
        while self.peek() == Some(';') {
            self.pos += 1;
            let right = self.or()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> GenResult<Expr<AtomPrim>> {
        let mut left = self.high_and()?;
        while self.peek() == Some(',') {
            self.pos += 1;
            let right = self.high_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn high_and(&mut self) -> GenResult<Expr<AtomPrim>> {
        let mut left = self.not(true)?;
        loop {
            match self.peek() {
                Some('&') => {
                    self.pos += 1;
                    let right = self.not(false)?;
                    left = Expr::And(Box::new(left), Box::new(right));
                }
                Some(c) if c != ']' && c != ',' && c != ';' => {
                    let right = self.not(false)?;
                    left = Expr::And(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    fn not(&mut self, leading: bool) -> GenResult<Expr<AtomPrim>> {
        if self.peek() == Some('!') {
            self.pos += 1;
            let inner = self.not(leading)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.atom_primitive(leading).map(Expr::Prim)
    }

    fn read_number(&mut self) -> Option<u8> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits.parse().ok()
    }

    fn atom_primitive(&mut self, leading: bool) -> GenResult<AtomPrim> {
        let c = self.peek().ok_or_else(|| self.err("unexpected end in bracket"))?;
        let next = self.chars.get(self.pos + 1).copied();

        // Two-letter elements first so Hg, Rh, Ru are not read as H / R queries.
        if c.is_ascii_uppercase() {
            if let Some(n) = next.filter(|n| n.is_ascii_lowercase()) {
                let two: String = [c, n].iter().collect();
                if let Some(prim) = element_prim(&two, Some(false)) {
                    self.pos += 2;
                    return Ok(prim);
                }
            }
        }

        match c {
            '*' => { self.pos += 1; Ok(AtomPrim::Any) }
            'a' => { self.pos += 1; Ok(AtomPrim::Aromatic) }
            'A' => { self.pos += 1; Ok(AtomPrim::Aliphatic) }
            '0'..='9' if leading => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let mass = digits.parse().map_err(|_| self.err("bad isotope"))?;
                Ok(AtomPrim::Isotope(mass))
            }
            '#' => {
                self.pos += 1;
                let n = self.read_number().ok_or_else(|| self.err("expected atomic number"))?;
                Ok(AtomPrim::Element { number: n, aromatic: None })
            }
            'H' if !leading || next != Some(']') => {
                self.pos += 1;
                Ok(AtomPrim::Hydrogens(self.read_number().unwrap_or(1)))
            }
            'D' => { self.pos += 1; Ok(AtomPrim::Degree(self.read_number().unwrap_or(1))) }
            'X' => { self.pos += 1; Ok(AtomPrim::Connectivity(self.read_number().unwrap_or(1))) }
            'v' => { self.pos += 1; Ok(AtomPrim::Valence(self.read_number().unwrap_or(1))) }
            'R' | 'r' => {
                self.pos += 1;
                Ok(match self.read_number() {
                    None    => AtomPrim::InRing(true),
                    Some(0) => AtomPrim::InRing(false),
                    Some(n) if c == 'R' => AtomPrim::RingCount(n),
                    Some(n) => AtomPrim::RingSize(n),
                })
            }
            '+' | '-' => {
                self.pos += 1;
                let unit: i8 = if c == '+' { 1 } else { -1 };
                let magnitude = match self.read_number() {
                    Some(n) => n as i8,
                    None => {
                        let mut m = 1i8;
                        while self.peek() == Some(c) {
                            m += 1;
                            self.pos += 1;
                        }
                        m
                    }
                };
                Ok(AtomPrim::Charge(unit * magnitude))
            }
            '$' => self.recursive(),
            '@' => Err(self.err("chirality queries are not supported")),
            _ if c.is_ascii_uppercase() => {
                self.pos += 1;
                element_prim(&c.to_string(), Some(false)).ok_or_else(|| self.err(c.to_string()))
            }
            _ if c.is_ascii_lowercase() => {
                if let Some(n) = next.filter(|n| n.is_ascii_lowercase()) {
                    let two: String = [c.to_ascii_uppercase(), n].iter().collect();
                    if matches!(two.as_str(), "Se" | "As") {
                        self.pos += 2;
                        return element_prim(&two, Some(true)).ok_or_else(|| self.err(two));
                    }
                }
                self.pos += 1;
                element_prim(&c.to_ascii_uppercase().to_string(), Some(true))
                    .ok_or_else(|| self.err(c.to_string()))
            }
            _ => Err(self.err(format!("unsupported primitive '{c}'"))),
        }
    }

    /// `$(...)`: compiles the parenthesised SMARTS as its own pattern.
    fn recursive(&mut self) -> GenResult<AtomPrim> {
        self.pos += 1;
        if self.peek() != Some('(') {
            return Err(self.err("expected '(' after '$'"));
        }
        let open = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        if depth != 0 {
            return Err(self.err("unclosed '$('"));
        }
        let inner: String = self.chars[open + 1..self.pos].iter().collect();
        self.pos += 1;
        let pattern = Pattern::parse(&inner).map_err(|e| match e {
            GenError::Pattern { index, message } => GenError::Pattern { index: open + 1 + index, message },
            other => other,
        })?;
        Ok(AtomPrim::Recursive(Box::new(pattern)))
    }

    // ── Bond expression ───────────────────────────────────────────────────────
    fn bond_expr(&mut self) -> GenResult<Expr<BondPrim>> {
        let mut left = self.bond_or()?;
        while self.peek() == Some(';') {
            self.pos += 1;
            let right = self.bond_or()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn bond_or(&mut self) -> GenResult<Expr<BondPrim>> {
        let mut left = self.bond_and()?;
        while self.peek() == Some(',') {
            self.pos += 1;
            let right = self.bond_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn bond_and(&mut self) -> GenResult<Expr<BondPrim>> {
        let mut left = self.bond_not()?;
        loop {
            match self.peek() {
                Some('&') => {
                    self.pos += 1;
                    let right = self.bond_not()?;
                    left = Expr::And(Box::new(left), Box::new(right));
                }
                Some(c) if is_bond_char(c) => {
                    let right = self.bond_not()?;
                    left = Expr::And(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    fn bond_not(&mut self) -> GenResult<Expr<BondPrim>> {
        if self.peek() == Some('!') {
            self.pos += 1;
            let inner = self.bond_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        let c = self.peek().ok_or_else(|| self.err("expected bond"))?;
        let prim = match c {
            '-' | '/' | '\\' => BondPrim::Single,
            '=' => BondPrim::Double,
            '#' => BondPrim::Triple,
            ':' => BondPrim::Aromatic,
            '~' => BondPrim::Any,
            '@' => BondPrim::Ring,
            _ => return Err(self.err(format!("unexpected bond '{c}'"))),
        };
        self.pos += 1;
        Ok(Expr::Prim(prim))
    }
}

fn is_bond_char(c: char) -> bool {
    matches!(c, '-' | '=' | '#' | ':' | '~' | '@' | '/' | '\\' | '!')
}

fn element_prim(symbol: &str, aromatic: Option<bool>) -> Option<AtomPrim> {
    Element::from_symbol(symbol).map(|e| AtomPrim::Element { number: e.number, aromatic })
}
