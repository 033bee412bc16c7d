// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Named failure kinds of the generator. Orchestration code
// still returns anyhow::Result; these variants are wrapped with
// context on the way up and matched on where a failure is local
// (a single molecule, a single fingerprint) and must be absorbed.
//
//   Config              — bad hyperparameters, raised before epoch 0
//   StructureDecode     — SELFIES / SMILES could not become a molecule
//   DegenerateFingerprint — fingerprint with no set bits
//   Pattern             — a key-table SMARTS entry failed to parse
//   Resource            — checkpoint / metrics write failed (fatal)
//   NonFiniteLoss       — divergent optimisation (fatal)

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Structure decode failure: {0}")]
    StructureDecode(String),

    #[error("Fingerprint has no set bits")]
    DegenerateFingerprint,

    #[error("Invalid substructure pattern at bit {index}: {message}")]
    Pattern { index: usize, message: String },

    #[error("Cannot write '{}': {source}", path.display())]
    Resource {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Non-finite {what} loss at epoch {epoch}")]
    NonFiniteLoss { what: &'static str, epoch: usize },
}

impl GenError {
    pub fn config(message: impl Into<String>) -> Self {
        GenError::Config(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        GenError::StructureDecode(message.into())
    }

    /// Adapter for `map_err` on I/O results touching `path`.
    pub fn resource(path: &Path) -> impl FnOnce(std::io::Error) -> GenError {
        let path = path.to_path_buf();
        move |source| GenError::Resource { path, source }
    }

    /// True for failures the scoring pipeline absorbs instead of aborting.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            GenError::StructureDecode(_) | GenError::DegenerateFingerprint | GenError::Pattern { .. }
        )
    }
}

/// Result type alias for domain operations.
pub type GenResult<T> = Result<T, GenError>;

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors_are_absorbable() {
        assert!(GenError::decode("bad ring").is_local());
        assert!(GenError::DegenerateFingerprint.is_local());
        assert!(!GenError::config("epochs must be positive").is_local());
        assert!(!GenError::NonFiniteLoss { what: "train", epoch: 3 }.is_local());
    }

    #[test]
    fn test_resource_error_names_path() {
        let err = GenError::Resource {
            path:   PathBuf::from("models/run/metrics.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("models/run/metrics.csv"));
    }
}
