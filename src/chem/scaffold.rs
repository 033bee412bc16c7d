// ============================================================
// Layer 4 — Bemis–Murcko Scaffolds
// ============================================================
// Reduces a molecule to its ring systems plus the linker atoms
// between them, and names the result with an order-independent
// key so that two molecules share a key exactly when their
// scaffolds are the same graph (up to refinement collisions).
//
//   pruning  non-ring atoms with at most one remaining neighbour
//            are removed until none is left; a multiply bonded
//            terminal atom on a ring atom (C=O on a ring) stays
//   key      iterated neighbourhood hashing of element, aromatic
//            flag and bond order; sorted final labels
//
// Acyclic molecules have the empty scaffold "".
//
// Reference: Bemis & Murcko (1996) The properties of known drugs

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use crate::chem::molecule::{BondOrder, Molecule};

/// Atoms of the Bemis–Murcko scaffold of `mol`.
pub fn scaffold_atoms(mol: &Molecule) -> Vec<bool> {
    let n = mol.atom_count();
    let mut kept = vec![true; n];
    loop {
        let mut changed = false;
        for atom in 0..n {
            if !kept[atom] || mol.is_ring_atom(atom) {
                continue;
            }
            let live: Vec<(usize, usize)> = mol
                .neighbors(atom)
                .iter()
                .copied()
                .filter(|&(nbr, _)| kept[nbr])
                .collect();
            let ring_decoration = matches!(live.as_slice(), [(nbr, bond)]
                if mol.is_ring_atom(*nbr)
                    && matches!(mol.bond(*bond).order, BondOrder::Double | BondOrder::Triple));
            if live.len() <= 1 && !ring_decoration {
                kept[atom] = false;
                changed = true;
            }
        }
        if !changed {
            return kept;
        }
    }
}

/// Order-independent name of the scaffold; "" when acyclic.
pub fn scaffold_key(mol: &Molecule) -> String {
    let kept = scaffold_atoms(mol);
    let atoms: Vec<usize> = (0..mol.atom_count()).filter(|&a| kept[a]).collect();
    if atoms.is_empty() {
        return String::new();
    }

    let mut labels: Vec<u64> = (0..mol.atom_count())
        .map(|a| {
            let atom = mol.atom(a);
            hash_of(&(atom.number(), atom.aromatic, atom.charge))
        })
        .collect();

    for _ in 0..atoms.len() {
        let mut next = labels.clone();
        for &a in &atoms {
            let mut around: Vec<(u64, u8)> = mol
                .neighbors(a)
                .iter()
                .filter(|&&(nbr, _)| kept[nbr])
                .map(|&(nbr, bond)| (labels[nbr], bond_code(mol.bond(bond).order)))
                .collect();
            around.sort_unstable();
            next[a] = hash_of(&(labels[a], around));
        }
        let stable = distinct(&next, &atoms) == distinct(&labels, &atoms);
        labels = next;
        if stable {
            break;
        }
    }

    let mut names: Vec<u64> = atoms.iter().map(|&a| labels[a]).collect();
    names.sort_unstable();
    names.iter().map(|l| format!("{l:016x}")).collect::<Vec<_>>().join(".")
}

fn bond_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single   => 1,
        BondOrder::Double   => 2,
        BondOrder::Triple   => 3,
        BondOrder::Aromatic => 4,
    }
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut h = DefaultHasher::new();
    value.hash(&mut h);
    h.finish()
}

fn distinct(labels: &[u64], atoms: &[usize]) -> usize {
    let mut seen: Vec<u64> = atoms.iter().map(|&a| labels[a]).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::smiles;

    fn key(s: &str) -> String {
        scaffold_key(&smiles::parse(s).unwrap())
    }

    #[test]
    fn test_side_chains_are_pruned() {
        assert_eq!(key("Cc1ccccc1"), key("c1ccccc1"));
        assert_eq!(key("CCCc1ccccc1O"), key("C1=CC=CC=C1"));
        assert_ne!(key("c1ccccc1"), key("C1CCCCC1"));
    }

    #[test]
    fn test_acyclic_scaffold_is_empty() {
        assert_eq!(key("CCO"), "");
        assert_eq!(key("CC(=O)NC"), "");
    }

    #[test]
    fn test_linkers_and_ring_carbonyls_stay() {
        assert_ne!(key("c1ccccc1CCc1ccccc1"), key("c1ccccc1"));
        assert_ne!(key("c1ccccc1CCc1ccccc1"), key("c1ccccc1Cc1ccccc1"));
        assert_ne!(key("O=C1CCCCC1"), key("C1CCCCC1"));
        assert_eq!(key("CCC1CCCC(=O)C1"), key("O=C1CCCCC1"));
    }

    #[test]
    fn test_key_ignores_atom_order() {
        assert_eq!(key("c1ccccc1C1CC1"), key("C1CC1c1ccccc1"));
    }
}
