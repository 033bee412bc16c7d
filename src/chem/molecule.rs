// ============================================================
// Layer 4 — Molecular Graph
// ============================================================
// Heavy-atom graph with implicit hydrogen counts.
//
//   Atom  — element, aromatic flag, formal charge, H count
//   Bond  — pair of atom indices plus order
//
// `finalize()` must run once after construction. It fills
// implicit hydrogens, marks ring bonds (a bond is in a ring
// when it is not a bridge of the graph) and perceives aromatic
// 5- and 6-membered rings so that Kekulé input (the form the
// SELFIES decoder produces) matches aromatic query atoms.
//
// Reference: Weininger (1988) SMILES
//            Hückel 4n+2 rule

use crate::domain::error::{GenError, GenResult};

// ─── Element Table ────────────────────────────────────────────────────────────
/// (symbol, atomic number, average mass, default valences)
const ELEMENTS: &[(&str, u8, f64, &[u8])] = &[
    ("H",  1,  1.008,   &[1]),
    ("Li", 3,  6.94,    &[1]),
    ("Be", 4,  9.012,   &[2]),
    ("B",  5,  10.81,   &[3]),
    ("C",  6,  12.011,  &[4]),
    ("N",  7,  14.007,  &[3, 5]),
    ("O",  8,  15.999,  &[2]),
    ("F",  9,  18.998,  &[1]),
    ("Na", 11, 22.990,  &[1]),
    ("Mg", 12, 24.305,  &[2]),
    ("Al", 13, 26.982,  &[3]),
    ("Si", 14, 28.085,  &[4]),
    ("P",  15, 30.974,  &[3, 5]),
    ("S",  16, 32.06,   &[2, 4, 6]),
    ("Cl", 17, 35.45,   &[1]),
    ("K",  19, 39.098,  &[1]),
    ("Ca", 20, 40.078,  &[2]),
    ("Ti", 22, 47.867,  &[]),
    ("Mn", 25, 54.938,  &[]),
    ("Fe", 26, 55.845,  &[2, 3]),
    ("Ni", 28, 58.693,  &[]),
    ("Cu", 29, 63.546,  &[]),
    ("Zn", 30, 65.38,   &[2]),
    ("Ga", 31, 69.723,  &[3]),
    ("Ge", 32, 72.630,  &[4]),
    ("As", 33, 74.922,  &[3, 5]),
    ("Se", 34, 78.971,  &[2, 4, 6]),
    ("Br", 35, 79.904,  &[1]),
    ("Sr", 38, 87.62,   &[2]),
    ("Nb", 41, 92.906,  &[]),
    ("Mo", 42, 95.95,   &[]),
    ("Ru", 44, 101.07,  &[]),
    ("Rh", 45, 102.906, &[]),
    ("Pd", 46, 106.42,  &[]),
    ("Ag", 47, 107.868, &[]),
    ("Cd", 48, 112.414, &[]),
    ("Sn", 50, 118.71,  &[2, 4]),
    ("Sb", 51, 121.760, &[3, 5]),
    ("Te", 52, 127.60,  &[2, 4, 6]),
    ("I",  53, 126.904, &[1]),
    ("Ba", 56, 137.327, &[2]),
    ("Ho", 67, 164.930, &[]),
    ("Hf", 72, 178.49,  &[]),
    ("Au", 79, 196.967, &[]),
    ("Hg", 80, 200.592, &[]),
    ("Tl", 81, 204.38,  &[]),
    ("Pb", 82, 207.2,   &[]),
    ("Bi", 83, 208.980, &[3, 5]),
];

pub const HYDROGEN_MASS: f64 = 1.008;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub symbol:        &'static str,
    pub number:        u8,
    pub mass:          f64,
    pub valences:      &'static [u8],
}

impl Element {
    pub fn from_symbol(symbol: &str) -> Option<Element> {
        ELEMENTS
            .iter()
            .find(|(s, ..)| *s == symbol)
            .map(|&(symbol, number, mass, valences)| Element { symbol, number, mass, valences })
    }

    /// Symbols that may appear unbracketed in SMILES.
    pub fn is_organic_subset(&self) -> bool {
        matches!(self.symbol, "B" | "C" | "N" | "O" | "P" | "S" | "F" | "Cl" | "Br" | "I")
    }
}

// ─── Atom / Bond ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element:   Element,
    pub aromatic:  bool,
    pub charge:    i8,
    /// Total attached hydrogens. For bracket atoms this is the
    /// written count; otherwise it is filled by `finalize()`.
    pub hydrogens: u8,
    /// Written in square brackets (hydrogens are explicit).
    pub bracket:   bool,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self { element, aromatic: false, charge: 0, hydrogens: 0, bracket: false }
    }

    pub fn aromatic(mut self, aromatic: bool) -> Self {
        self.aromatic = aromatic;
        self
    }

    pub fn bracketed(mut self, hydrogens: u8, charge: i8) -> Self {
        self.bracket   = true;
        self.hydrogens = hydrogens;
        self.charge    = charge;
        self
    }

    pub fn number(&self) -> u8 {
        self.element.number
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    pub fn from_order(order: u8) -> Option<BondOrder> {
        match order {
            1 => Some(BondOrder::Single),
            2 => Some(BondOrder::Double),
            3 => Some(BondOrder::Triple),
            _ => None,
        }
    }

    /// Valence contribution; aromatic bonds count as one, the
    /// extra π electron is added per atom.
    pub fn valence(&self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub a:     usize,
    pub b:     usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.a == atom { self.b } else { self.a }
    }
}

// ─── Molecule ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    atoms:     Vec<Atom>,
    bonds:     Vec<Bond>,
    /// Per atom: (neighbour, bond index)
    adjacency: Vec<Vec<(usize, usize)>>,
    ring_bond: Vec<bool>,
    rings:     Vec<Vec<usize>>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) -> GenResult<usize> {
        if a == b || a >= self.atoms.len() || b >= self.atoms.len() {
            return Err(GenError::decode(format!("invalid bond {a}-{b}")));
        }
        if self.bond_between(a, b).is_some() {
            return Err(GenError::decode(format!("duplicate bond {a}-{b}")));
        }
        self.bonds.push(Bond { a, b, order });
        let idx = self.bonds.len() - 1;
        self.adjacency[a].push((b, idx));
        self.adjacency[b].push((a, idx));
        Ok(idx)
    }

    pub fn set_bond_order(&mut self, bond: usize, order: BondOrder) {
        self.bonds[bond].order = order;
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, idx: usize) -> &Atom {
        &self.atoms[idx]
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond(&self, idx: usize) -> &Bond {
        &self.bonds[idx]
    }

    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    /// Heavy-atom degree.
    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency
            .get(a)?
            .iter()
            .find(|(n, _)| *n == b)
            .map(|&(_, bond)| bond)
    }

    pub fn is_ring_bond(&self, bond: usize) -> bool {
        self.ring_bond.get(bond).copied().unwrap_or(false)
    }

    pub fn is_ring_atom(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|&(_, b)| self.is_ring_bond(b))
    }

    /// Smallest ring through each ring bond, deduplicated.
    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }

    /// Number of perceived rings containing `atom`.
    pub fn ring_count(&self, atom: usize) -> usize {
        self.rings.iter().filter(|r| r.contains(&atom)).count()
    }

    /// Size of the smallest perceived ring containing `atom`.
    pub fn smallest_ring(&self, atom: usize) -> Option<usize> {
        self.rings.iter().filter(|r| r.contains(&atom)).map(Vec::len).min()
    }

    /// Sum of bond valences, counting the aromatic π electron once.
    pub fn bond_valence(&self, atom: usize) -> u8 {
        let sum: u8 = self.adjacency[atom]
            .iter()
            .map(|&(_, b)| self.bonds[b].order.valence())
            .sum();
        if self.atoms[atom].aromatic { sum + 1 } else { sum }
    }

    pub fn heavy_mass(&self) -> f64 {
        self.atoms
            .iter()
            .map(|a| a.element.mass + a.hydrogens as f64 * HYDROGEN_MASS)
            .sum()
    }

    /// Fill implicit hydrogens, ring bonds, ring list and aromaticity.
    pub fn finalize(mut self) -> Self {
        for i in 0..self.atoms.len() {
            if !self.atoms[i].bracket {
                self.atoms[i].hydrogens = self.implicit_hydrogens(i);
            }
        }
        self.ring_bond = self.find_ring_bonds();
        self.rings     = self.find_rings();
        self.perceive_aromaticity();
        self
    }

    fn implicit_hydrogens(&self, atom: usize) -> u8 {
        let a       = &self.atoms[atom];
        let used    = self.bond_valence(atom) as i16 - a.charge.unsigned_abs() as i16;
        let used    = used.max(0) as u8;
        let valence = &a.element.valences;
        if a.aromatic {
            return valence.first().map_or(0, |v| v.saturating_sub(used));
        }
        valence
            .iter()
            .find(|&&v| v >= used)
            .map_or(0, |v| v - used)
    }

    // ── Ring bonds: non-bridges (Tarjan lowlink) ──────────────────────────────
    fn find_ring_bonds(&self) -> Vec<bool> {
        let n = self.atoms.len();
        let mut ring  = vec![true; self.bonds.len()];
        let mut disc  = vec![usize::MAX; n];
        let mut low   = vec![0usize; n];
        let mut timer = 0usize;
        for root in 0..n {
            if disc[root] == usize::MAX {
                self.bridge_dfs(root, usize::MAX, &mut disc, &mut low, &mut timer, &mut ring);
            }
        }
        ring
    }

    fn bridge_dfs(
        &self,
        atom:        usize,
        parent_bond: usize,
        disc:        &mut [usize],
        low:         &mut [usize],
        timer:       &mut usize,
        ring:        &mut [bool],
    ) {
        disc[atom] = *timer;
        low[atom]  = *timer;
        *timer += 1;
        for &(next, bond) in &self.adjacency[atom] {
            if bond == parent_bond {
                continue;
            }
            if disc[next] == usize::MAX {
                self.bridge_dfs(next, bond, disc, low, timer, ring);
                low[atom] = low[atom].min(low[next]);
                if low[next] > disc[atom] {
                    ring[bond] = false;
                }
            } else {
                low[atom] = low[atom].min(disc[next]);
            }
        }
    }

    // ── Ring list: shortest cycle through every ring bond ─────────────────────
    fn find_rings(&self) -> Vec<Vec<usize>> {
        let mut rings: Vec<Vec<usize>> = Vec::new();
        for (idx, bond) in self.bonds.iter().enumerate() {
            if !self.ring_bond[idx] {
                continue;
            }
            if let Some(path) = self.shortest_path_avoiding(bond.a, bond.b, idx) {
                let mut key = path.clone();
                key.sort_unstable();
                if !rings.iter().any(|r| {
                    let mut k = r.clone();
                    k.sort_unstable();
                    k == key
                }) {
                    rings.push(path);
                }
            }
        }
        rings
    }

    fn shortest_path_avoiding(&self, from: usize, to: usize, skip: usize) -> Option<Vec<usize>> {
        let mut prev = vec![usize::MAX; self.atoms.len()];
        let mut queue = std::collections::VecDeque::new();
        prev[from] = from;
        queue.push_back(from);
        while let Some(cur) = queue.pop_front() {
            if cur == to {
                let mut path = vec![to];
                let mut at = to;
                while at != from {
                    at = prev[at];
                    path.push(at);
                }
                path.reverse();
                return Some(path);
            }
            for &(next, bond) in &self.adjacency[cur] {
                if bond != skip && prev[next] == usize::MAX {
                    prev[next] = cur;
                    queue.push_back(next);
                }
            }
        }
        None
    }

    // ── Aromaticity: 5/6 rings with 4n+2 π electrons ──────────────────────────
    fn perceive_aromaticity(&mut self) {
        let mut aromatic_ring = vec![false; self.rings.len()];
        for (r, ring) in self.rings.iter().enumerate() {
            aromatic_ring[r] = ring.iter().all(|&a| self.atoms[a].aromatic);
        }
        loop {
            let mut changed = false;
            for r in 0..self.rings.len() {
                if aromatic_ring[r] || !matches!(self.rings[r].len(), 5 | 6) {
                    continue;
                }
                if self.is_huckel(r, &aromatic_ring) {
                    aromatic_ring[r] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        for (r, ring) in self.rings.clone().iter().enumerate() {
            if !aromatic_ring[r] {
                continue;
            }
            for (i, &a) in ring.iter().enumerate() {
                self.atoms[a].aromatic = true;
                let b = ring[(i + 1) % ring.len()];
                if let Some(bond) = self.bond_between(a, b) {
                    self.bonds[bond].order = BondOrder::Aromatic;
                }
            }
        }
    }

    fn is_huckel(&self, r: usize, aromatic_ring: &[bool]) -> bool {
        let ring = &self.rings[r];
        let in_ring = |x: usize| ring.contains(&x);
        let in_aromatic_ring = |a: usize, b: usize| {
            self.rings
                .iter()
                .zip(aromatic_ring)
                .any(|(other, &arom)| arom && other.contains(&a) && other.contains(&b))
        };
        let mut electrons = 0u32;
        for &a in ring {
            let atom = &self.atoms[a];
            let mut contribution = None;
            for &(n, b) in &self.adjacency[a] {
                match self.bonds[b].order {
                    BondOrder::Double if in_ring(n) || in_aromatic_ring(a, n) => {
                        contribution = Some(1);
                    }
                    BondOrder::Aromatic => contribution = Some(1),
                    BondOrder::Double | BondOrder::Triple => return false,
                    _ => {}
                }
            }
            let contribution = match contribution {
                Some(c) => c,
                None => match atom.number() {
                    7 | 15 if self.degree(a) + atom.hydrogens as usize == 3 => 2,
                    8 | 16 | 34 if self.degree(a) == 2 => 2,
                    _ => return false,
                },
            };
            electrons += contribution;
        }
        electrons >= 2 && (electrons - 2) % 4 == 0
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn carbon() -> Atom {
        Atom::new(Element::from_symbol("C").unwrap())
    }

    #[test]
    fn test_element_lookup() {
        assert_eq!(Element::from_symbol("Cl").unwrap().number, 17);
        assert_eq!(Element::from_symbol("Hg").unwrap().number, 80);
        assert!(Element::from_symbol("Xx").is_none());
    }

    #[test]
    fn test_implicit_hydrogens_on_ethene() {
        let mut m = Molecule::new();
        let a = m.add_atom(carbon());
        let b = m.add_atom(carbon());
        m.add_bond(a, b, BondOrder::Double).unwrap();
        let m = m.finalize();
        assert_eq!(m.atom(0).hydrogens, 2);
        assert_eq!(m.atom(1).hydrogens, 2);
    }

    #[test]
    fn test_duplicate_bond_rejected() {
        let mut m = Molecule::new();
        let a = m.add_atom(carbon());
        let b = m.add_atom(carbon());
        m.add_bond(a, b, BondOrder::Single).unwrap();
        assert!(m.add_bond(b, a, BondOrder::Single).is_err());
    }

    #[test]
    fn test_kekule_benzene_is_aromatic() {
        let mut m = Molecule::new();
        let atoms: Vec<usize> = (0..6).map(|_| m.add_atom(carbon())).collect();
        for i in 0..6 {
            let order = if i % 2 == 0 { BondOrder::Double } else { BondOrder::Single };
            m.add_bond(atoms[i], atoms[(i + 1) % 6], order).unwrap();
        }
        let m = m.finalize();
        assert_eq!(m.rings().len(), 1);
        assert!(m.atoms().iter().all(|a| a.aromatic && a.hydrogens == 1));
        assert!((0..6).all(|b| m.is_ring_bond(b)));
    }

    #[test]
    fn test_fused_ring_membership() {
        // bicyclo[4.4.0]decane
        let mut m = Molecule::new();
        let atoms: Vec<usize> = (0..10).map(|_| m.add_atom(carbon())).collect();
        for i in 0..6 {
            m.add_bond(atoms[i], atoms[(i + 1) % 6], BondOrder::Single).unwrap();
        }
        m.add_bond(atoms[5], atoms[6], BondOrder::Single).unwrap();
        for i in 6..9 {
            m.add_bond(atoms[i], atoms[i + 1], BondOrder::Single).unwrap();
        }
        m.add_bond(atoms[9], atoms[0], BondOrder::Single).unwrap();
        let m = m.finalize();
        assert_eq!(m.rings().len(), 2);
        assert_eq!(m.ring_count(0), 2);
        assert_eq!(m.ring_count(5), 2);
        assert_eq!(m.ring_count(2), 1);
        assert_eq!(m.smallest_ring(2), Some(6));
    }

    #[test]
    fn test_chain_has_no_rings() {
        let mut m = Molecule::new();
        let a = m.add_atom(carbon());
        let b = m.add_atom(carbon());
        let c = m.add_atom(carbon());
        m.add_bond(a, b, BondOrder::Single).unwrap();
        m.add_bond(b, c, BondOrder::Single).unwrap();
        let m = m.finalize();
        assert!(m.rings().is_empty());
        assert!(!m.is_ring_atom(1));
        assert_eq!(m.atom(1).hydrogens, 2);
    }
}
