// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The scoring pipeline talks to chemistry only through
// MoleculeToolkit. The built-in GraphToolkit (chem layer)
// implements it; tests plug in small fakes so scoring logic
// can be exercised without decoding real structures.
//
// Decoding path:
//   SELFIES ──selfies_to_smiles──▶ SMILES ──parse_smiles──▶ Molecule
//
// Scoring path:
//   Molecule ──qed──────────────▶ [0, 1]
//   Molecule ──has_substructure──▶ bool   (per key-table pattern)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use crate::domain::error::GenResult;

// ─── MoleculeToolkit ──────────────────────────────────────────────────────────
/// Chemistry operations needed to turn generated tokens into scores.
///
/// All methods are pure and deterministic. Failures are reported
/// as `GenError::StructureDecode` / `GenError::Pattern` and are
/// absorbed by the caller.
pub trait MoleculeToolkit: Send + Sync {
    /// Parsed molecular structure.
    type Molecule;

    /// Compiled substructure query.
    type Pattern: Send + Sync;

    /// Decode a SELFIES string into SMILES notation.
    fn selfies_to_smiles(&self, selfies: &str) -> GenResult<String>;

    /// Parse SMILES notation into a molecule.
    fn parse_smiles(&self, smiles: &str) -> GenResult<Self::Molecule>;

    /// Compile a SMARTS pattern.
    fn parse_pattern(&self, smarts: &str) -> GenResult<Self::Pattern>;

    /// Drug-likeness score in [0, 1].
    fn qed(&self, mol: &Self::Molecule) -> f64;

    /// True when `pattern` occurs anywhere in `mol`.
    fn has_substructure(&self, mol: &Self::Molecule, pattern: &Self::Pattern) -> bool;

    /// SELFIES straight to a molecule.
    fn decode(&self, selfies: &str) -> GenResult<Self::Molecule> {
        let smiles = self.selfies_to_smiles(selfies)?;
        self.parse_smiles(&smiles)
    }
}
