// ============================================================
// Layer 4 — Chemistry
// ============================================================
// Built-in molecule toolkit used to score generated SELFIES.
//
//   selfies  — SELFIES → SMILES derivation
//   smiles   — SMILES ↔ molecular graph
//   molecule — graph, rings, aromaticity
//   pattern  — SMARTS subset and substructure search
//   qed      — drug-likeness
//   scaffold — Bemis–Murcko scaffolds for the train/val split
//   keys     — fingerprint key table (pattern i ↔ bit i)

pub mod keys;
pub mod molecule;
pub mod pattern;
pub mod qed;
pub mod scaffold;
pub mod selfies;
pub mod smiles;

use crate::domain::error::GenResult;
use crate::domain::traits::MoleculeToolkit;

pub use keys::FingerprintKeyTable;
pub use molecule::Molecule;
pub use pattern::Pattern;

// ─── GraphToolkit ─────────────────────────────────────────────────────────────
/// `MoleculeToolkit` backed by the in-crate graph code.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphToolkit;

impl MoleculeToolkit for GraphToolkit {
    type Molecule = Molecule;
    type Pattern  = Pattern;

    fn selfies_to_smiles(&self, selfies: &str) -> GenResult<String> {
        selfies::decode(selfies)
    }

    fn parse_smiles(&self, smiles: &str) -> GenResult<Molecule> {
        smiles::parse(smiles)
    }

    fn parse_pattern(&self, smarts: &str) -> GenResult<Pattern> {
        Pattern::parse(smarts)
    }

    fn qed(&self, mol: &Molecule) -> f64 {
        qed::qed(mol)
    }

    fn has_substructure(&self, mol: &Molecule, pattern: &Pattern) -> bool {
        pattern.matches(mol)
    }
}
