// ============================================================
// Layer 4 — Fingerprint Key Table
// ============================================================
// Ordered list of substructure patterns; pattern i defines
// fingerprint bit i. Loaded once per run, when the scoring
// pipeline is built, from a text file with one SMARTS entry
// per line.
//
// An entry that fails to compile is kept as `None` and never
// matches, so one bad key cannot abort scoring.

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::error::GenError;
use crate::domain::traits::MoleculeToolkit;

#[derive(Debug, Clone)]
pub struct FingerprintKeyTable<P> {
    patterns: Vec<Option<P>>,
}

impl<P> FingerprintKeyTable<P> {
    pub fn from_patterns(patterns: Vec<Option<P>>) -> Self {
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Compiled pattern for bit `index`, `None` if it failed to parse.
    pub fn get(&self, index: usize) -> Option<&P> {
        self.patterns.get(index).and_then(Option::as_ref)
    }

    pub fn invalid_count(&self) -> usize {
        self.patterns.iter().filter(|p| p.is_none()).count()
    }
}

impl<P: Send + Sync> FingerprintKeyTable<P> {
    /// Compile every line of `text` with `toolkit`.
    ///
    /// The whole trimmed line is the pattern (SMARTS may contain
    /// commas). Trailing blank lines are ignored. The table must
    /// have exactly `fp_len` entries.
    pub fn parse<T>(text: &str, toolkit: &T, fp_len: usize) -> Result<Self>
    where
        T: MoleculeToolkit<Pattern = P>,
    {
        let lines: Vec<&str> = text.trim_end().lines().map(str::trim).collect();
        if lines.len() != fp_len {
            return Err(GenError::config(format!(
                "key table has {} entries but fingerprints have {fp_len} bits",
                lines.len()
            ))
            .into());
        }

        let patterns = lines
            .iter()
            .enumerate()
            .map(|(index, smarts)| match toolkit.parse_pattern(smarts) {
                Ok(p) => Some(p),
                Err(e) => {
                    let e = match e {
                        GenError::Pattern { message, .. } => GenError::Pattern { index, message },
                        other => other,
                    };
                    tracing::warn!("Key '{smarts}' never matches: {e}");
                    None
                }
            })
            .collect();

        let table = Self::from_patterns(patterns);
        tracing::info!(
            "Loaded {} fingerprint keys ({} invalid)",
            table.len(),
            table.invalid_count()
        );
        Ok(table)
    }

    pub fn load<T>(path: &Path, toolkit: &T, fp_len: usize) -> Result<Self>
    where
        T: MoleculeToolkit<Pattern = P>,
    {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read key table '{}'", path.display()))?;
        Self::parse(&text, toolkit, fp_len)
            .with_context(|| format!("Invalid key table '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::GraphToolkit;

    #[test]
    fn test_parse_keeps_bad_entries_as_none() {
        let table = FingerprintKeyTable::parse("C=O\n[C@@H](C)O\n[C,N]\n\n", &GraphToolkit, 3).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.get(0).is_some());
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
        assert_eq!(table.invalid_count(), 1);
    }

    #[test]
    fn test_length_mismatch_is_config_error() {
        let err = FingerprintKeyTable::parse("C\nN\n", &GraphToolkit, 3).unwrap_err();
        assert!(matches!(err.downcast_ref::<GenError>(), Some(GenError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let res = FingerprintKeyTable::load(&dir.path().join("none.txt"), &GraphToolkit, 1);
        assert!(res.is_err());
    }
}
