// ============================================================
// Layer 4 — SELFIES Decoder
// ============================================================
// Turns a SELFIES string into SMILES.
//
// Every symbol sequence derives some structure: each atom symbol
// bonds to the previous atom with at most the previous atom's
// remaining valence, so the result never violates valence rules.
//
// Symbols understood:
//   [C] [=C] [#N] [NH1] [N+1] [O-1] ...   atoms (optional bond prefix)
//   [Branch1] [=Branch2] [#Branch3]       branch, next 1-3 symbols = length
//   [Ring1] [=Ring2] [#Ring3]             ring bond back to an earlier atom
//   [nop]                                 ignored
//   .                                     fragment separator
//
// Index symbols map to hexadecimal digits through INDEX_ALPHABET;
// any other symbol reads as 0.
//
// Reference: Krenn et al. (2020) SELFIES

use crate::chem::molecule::{Atom, BondOrder, Element, Molecule};
use crate::chem::smiles;
use crate::domain::error::{GenError, GenResult};

const INDEX_ALPHABET: [&str; 16] = [
    "[C]", "[Ring1]", "[Ring2]", "[Branch1]", "[=Branch1]", "[#Branch1]",
    "[Branch2]", "[=Branch2]", "[#Branch2]", "[O]", "[N]", "[=N]",
    "[=C]", "[#C]", "[S]", "[P]",
];

/// Split a SELFIES string into `[...]` symbols and `.` separators.
pub fn split_symbols(selfies: &str) -> GenResult<Vec<&str>> {
    let mut symbols = Vec::new();
    let mut rest = selfies.trim();
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            symbols.push(".");
            rest = tail;
            continue;
        }
        if !rest.starts_with('[') {
            return Err(GenError::decode(format!("expected '[' in SELFIES near '{rest}'")));
        }
        let end = rest
            .find(']')
            .ok_or_else(|| GenError::decode("unterminated SELFIES symbol"))?;
        symbols.push(&rest[..=end]);
        rest = &rest[end + 1..];
    }
    Ok(symbols)
}

/// Decode SELFIES to SMILES.
pub fn decode(selfies: &str) -> GenResult<String> {
    let symbols = split_symbols(selfies)?;
    let mut fragments = Vec::new();
    for fragment in symbols.split(|s| *s == ".") {
        let mol = derive_fragment(fragment)?;
        if mol.atom_count() > 0 {
            fragments.push(smiles::write(&mol));
        }
    }
    if fragments.is_empty() {
        return Err(GenError::decode("SELFIES derived no atoms"));
    }
    Ok(fragments.join("."))
}

// ─── Symbol Classification ────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
enum Symbol {
    Nop,
    Branch { order: u8, length_symbols: usize },
    Ring { order: u8, length_symbols: usize },
    Atom(AtomSpec),
}

#[derive(Debug, Clone, PartialEq)]
struct AtomSpec {
    order:     u8,
    element:   Element,
    hydrogens: Option<u8>,
    charge:    i8,
}

impl AtomSpec {
    /// Bonding capacity: default valence adjusted for charge, minus explicit H.
    fn capacity(&self) -> u8 {
        let base: i16 = match (self.element.symbol, self.charge) {
            ("B", 1) => 2,
            ("B", -1) => 4,
            ("C", 1) | ("C", -1) => 3,
            ("N", 1) => 4,
            ("N", -1) => 2,
            ("O", 1) => 3,
            ("O", -1) => 1,
            ("P", 1) => 4,
            ("P", -1) => 6,
            ("S", 1) | ("S", -1) => 5,
            (_, 0) => *self.element.valences.last().unwrap_or(&0) as i16,
            (_, c) => (*self.element.valences.first().unwrap_or(&0) as i16 - c.abs() as i16).max(0),
        };
        let base = match self.element.symbol {
            // SELFIES default constraints cap N and C at their lowest valence
            "N" | "C" | "O" | "B" if self.charge == 0 => self.element.valences[0] as i16,
            _ => base,
        };
        (base - self.hydrogens.unwrap_or(0) as i16).max(0) as u8
    }

    fn to_atom(&self) -> Atom {
        let atom = Atom::new(self.element);
        if self.hydrogens.is_some() || self.charge != 0 || !self.element.is_organic_subset() {
            atom.bracketed(self.hydrogens.unwrap_or(0), self.charge)
        } else {
            atom
        }
    }
}

fn classify(symbol: &str) -> GenResult<Symbol> {
    let inner = symbol
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| GenError::decode(format!("malformed symbol {symbol}")))?;

    if inner == "nop" || inner == "epsilon" {
        return Ok(Symbol::Nop);
    }

    let (order, body) = match inner.chars().next() {
        Some('=') => (2, &inner[1..]),
        Some('#') => (3, &inner[1..]),
        Some('/') | Some('\\') | Some('-') => (1, &inner[1..]),
        _ => (1, inner),
    };

    for (prefix, is_branch) in [("Branch", true), ("Ring", false)] {
        if let Some(n) = body.strip_prefix(prefix) {
            let length_symbols = n
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=3).contains(n))
                .ok_or_else(|| GenError::decode(format!("bad {prefix} length in {symbol}")))?;
            return Ok(if is_branch {
                Symbol::Branch { order, length_symbols }
            } else {
                Symbol::Ring { order, length_symbols }
            });
        }
    }

    parse_atom_body(body, order).map(Symbol::Atom)
}

fn parse_atom_body(body: &str, order: u8) -> GenResult<AtomSpec> {
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    let first = *chars
        .first()
        .filter(|c| c.is_ascii_uppercase())
        .ok_or_else(|| GenError::decode(format!("unknown SELFIES symbol [{body}]")))?;
    let mut symbol = first.to_string();
    i += 1;
    if let Some(&c) = chars.get(i) {
        if c.is_ascii_lowercase() {
            symbol.push(c);
            i += 1;
        }
    }
    let element = Element::from_symbol(&symbol)
        .ok_or_else(|| GenError::decode(format!("unknown element in [{body}]")))?;

    while chars.get(i) == Some(&'@') {
        i += 1;
    }

    let mut hydrogens = None;
    if chars.get(i) == Some(&'H') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        let digits: String = chars[start..i].iter().collect();
        hydrogens = Some(if digits.is_empty() { 1 } else { digits.parse().unwrap_or(1) });
    }

    let mut charge = 0i8;
    if let Some(&sign) = chars.get(i) {
        if sign == '+' || sign == '-' {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let magnitude: i8 = if digits.is_empty() { 1 } else { digits.parse().unwrap_or(1) };
            charge = if sign == '+' { magnitude } else { -magnitude };
        }
    }

    if i != chars.len() {
        return Err(GenError::decode(format!("unsupported SELFIES atom [{body}]")));
    }
    Ok(AtomSpec { order, element, hydrogens, charge })
}

// ─── Derivation ───────────────────────────────────────────────────────────────
struct Derivation<'a> {
    symbols: &'a [&'a str],
    pos:     usize,
    mol:     Molecule,
    /// Remaining bonding capacity per atom
    free:    Vec<u8>,
    /// Deferred ring bonds: (earlier atom, later atom, order)
    rings:   Vec<(usize, usize, u8)>,
}

fn derive_fragment(symbols: &[&str]) -> GenResult<Molecule> {
    let mut d = Derivation {
        symbols,
        pos:   0,
        mol:   Molecule::new(),
        free:  Vec::new(),
        rings: Vec::new(),
    };
    d.derive(None, None, None)?;
    d.close_rings()?;
    Ok(d.mol)
}

impl<'a> Derivation<'a> {
    fn next_symbol(&mut self) -> Option<&'a str> {
        let s = self.symbols.get(self.pos).copied();
        if s.is_some() {
            self.pos += 1;
        }
        s
    }

    /// Read `n` symbols as a base-16 number.
    fn read_index(&mut self, n: usize) -> usize {
        let mut q = 0;
        for _ in 0..n {
            let digit = self
                .next_symbol()
                .and_then(|s| INDEX_ALPHABET.iter().position(|a| *a == s))
                .unwrap_or(0);
            q = q * 16 + digit;
        }
        q
    }

    /// Derive atoms until the state runs out of valence or
    /// `max_derive` symbols have been consumed. Returns the number
    /// of symbols consumed.
    fn derive(
        &mut self,
        max_derive: Option<usize>,
        init_state: Option<u8>,
        root:       Option<usize>,
    ) -> GenResult<usize> {
        let mut consumed = 0usize;
        let mut state = init_state;
        let mut prev  = root;

        while state.map_or(true, |s| s > 0) && max_derive.map_or(true, |m| consumed < m) {
            let Some(symbol) = self.next_symbol() else { break };
            consumed += 1;

            match classify(symbol)? {
                Symbol::Nop => {}
                Symbol::Branch { order, length_symbols } => {
                    let s = match state {
                        Some(s) if s > 1 => s,
                        _ => continue,
                    };
                    let q = self.read_index(length_symbols);
                    consumed += length_symbols;
                    let branch_state = (s - 1).min(order);
                    consumed += self.derive(Some(q + 1), Some(branch_state), prev)?;
                    state = Some(s - branch_state);
                }
                Symbol::Ring { order, length_symbols } => {
                    let (Some(s), Some(p)) = (state, prev) else { continue };
                    let q = self.read_index(length_symbols);
                    consumed += length_symbols;
                    let target = p.saturating_sub(q + 1);
                    let ring_order = order.min(s);
                    self.rings.push((target, p, ring_order));
                    state = Some(s - ring_order);
                }
                Symbol::Atom(spec) => {
                    let cap = spec.capacity();
                    let bond = match (state, prev) {
                        (Some(s), Some(_)) => spec.order.min(s).min(cap),
                        _ => 0,
                    };
                    let idx = self.mol.add_atom(spec.to_atom());
                    self.free.push(cap - bond);
                    if let (Some(p), true) = (prev, bond > 0) {
                        let order = BondOrder::from_order(bond).unwrap_or(BondOrder::Single);
                        self.mol.add_bond(p, idx, order)?;
                        self.free[p] = self.free[p].saturating_sub(bond);
                    }
                    state = Some(cap - bond);
                    prev  = Some(idx);
                }
            }
        }
        Ok(consumed)
    }

    fn close_rings(&mut self) -> GenResult<()> {
        let rings = std::mem::take(&mut self.rings);
        for (a, b, order) in rings {
            if a == b {
                continue;
            }
            let order = order.min(self.free[a]).min(self.free[b]);
            if order == 0 {
                continue;
            }
            match self.mol.bond_between(a, b) {
                Some(bond) => {
                    let current = self.mol.bond(bond).order.valence();
                    let total   = (current + order).min(3);
                    let added   = total - current;
                    if added == 0 {
                        continue;
                    }
                    if let Some(o) = BondOrder::from_order(total) {
                        self.mol.set_bond_order(bond, o);
                    }
                    self.free[a] -= added;
                    self.free[b] -= added;
                }
                None => {
                    let o = BondOrder::from_order(order).unwrap_or(BondOrder::Single);
                    self.mol.add_bond(a, b, o)?;
                    self.free[a] -= order;
                    self.free[b] -= order;
                }
            }
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_symbols() {
        let s = split_symbols("[C][=O].[N]").unwrap();
        assert_eq!(s, vec!["[C]", "[=O]", ".", "[N]"]);
        assert!(split_symbols("[C]O").is_err());
        assert!(split_symbols("[C").is_err());
    }

    #[test]
    fn test_decode_chain() {
        assert_eq!(decode("[C][C][O]").unwrap(), "CCO");
        assert_eq!(decode("[C][=O]").unwrap(), "C=O");
        assert_eq!(decode("[C][#N]").unwrap(), "C#N");
    }

    #[test]
    fn test_decode_respects_valence() {
        // F has one bond; derivation stops after it
        assert_eq!(decode("[C][F][C]").unwrap(), "CF");
        // O cannot take a triple bond
        assert_eq!(decode("[C][#O]").unwrap(), "C=O");
    }

    #[test]
    fn test_decode_branch() {
        // CC(=O)O : [C][C][=Branch1][C][=O][O]
        let smiles = decode("[C][C][=Branch1][C][=O][O]").unwrap();
        let mol = smiles::parse(&smiles).unwrap();
        assert_eq!(mol.atom_count(), 4);
        assert_eq!(mol.degree(1), 3);
    }

    #[test]
    fn test_decode_benzene_ring() {
        let smiles = decode("[C][=C][C][=C][C][=C][Ring1][=Branch1]").unwrap();
        let mol = smiles::parse(&smiles).unwrap();
        assert_eq!(mol.atom_count(), 6);
        assert_eq!(mol.bonds().len(), 6);
        assert!(mol.atoms().iter().all(|a| a.aromatic));
    }

    #[test]
    fn test_decode_charged_atom() {
        let smiles = decode("[C][N+1][Branch1][C][C][C]").unwrap();
        let mol = smiles::parse(&smiles).unwrap();
        assert!(mol.atoms().iter().any(|a| a.charge == 1));
    }

    #[test]
    fn test_decode_nop_and_unknown() {
        assert_eq!(decode("[nop][C][nop]").unwrap(), "C");
        assert!(decode("[Xyz]").is_err());
        assert!(decode("[nop]").is_err());
        assert!(decode("").is_err());
    }
}
