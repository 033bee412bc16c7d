// ============================================================
// Layer 4 — SELFIES Vectorizer
// ============================================================
// Converts between SELFIES strings and alphabet index
// sequences of fixed length.
//
//   vectorize:    "[C][=O]"  →  [start] [C] [=O] [end] [nop] ... (pad_to_len)
//   devectorize:  indices    →  "[C][=O]" (special symbols removed)
//
// Index 0 is always the padding symbol [nop]. The decoder is
// trained to keep emitting [nop] after [end], so padding takes
// part in the reconstruction loss like any other symbol.
//
// Reference: Krenn et al. (2020) SELFIES

use std::path::Path;

use anyhow::{Context, Result};

use crate::chem::selfies::split_symbols;
use crate::domain::error::{GenError, GenResult};

pub const PAD:   &str = "[nop]";
pub const START: &str = "[start]";
pub const END:   &str = "[end]";

/// Default sequence length of vectorized targets.
pub const DEFAULT_PAD_TO_LEN: usize = 128;

/// 31-symbol default alphabet; [nop] first so padding is index 0.
pub const DEFAULT_ALPHABET: [&str; 31] = [
    "[nop]", "[start]", "[end]",
    "[C]", "[=C]", "[#C]",
    "[N]", "[=N]", "[#N]",
    "[O]", "[=O]",
    "[S]", "[=S]",
    "[F]", "[Cl]", "[Br]", "[I]", "[P]", "[B]",
    "[Branch1]", "[=Branch1]", "[#Branch1]", "[Branch2]", "[=Branch2]",
    "[Ring1]", "[=Ring1]", "[Ring2]",
    "[N+1]", "[=N+1]", "[O-1]", "[S+1]",
];

#[derive(Debug, Clone)]
pub struct SelfiesVectorizer {
    alphabet:   Vec<String>,
    pad_to_len: usize,
}

impl Default for SelfiesVectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHABET.iter().map(|s| s.to_string()).collect(), DEFAULT_PAD_TO_LEN)
    }
}

impl SelfiesVectorizer {
    pub fn new(alphabet: Vec<String>, pad_to_len: usize) -> Self {
        Self { alphabet, pad_to_len }
    }

    pub fn with_pad_to_len(mut self, pad_to_len: usize) -> Self {
        self.pad_to_len = pad_to_len;
        self
    }

    /// Alphabet file: one symbol per line. Must contain the three
    /// special symbols, with [nop] on the first line.
    pub fn from_file(path: &Path, pad_to_len: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read alphabet '{}'", path.display()))?;
        let alphabet: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if alphabet.first().map(String::as_str) != Some(PAD) {
            return Err(GenError::config(format!("alphabet must start with {PAD}")).into());
        }
        for special in [START, END] {
            if !alphabet.iter().any(|s| s == special) {
                return Err(GenError::config(format!("alphabet is missing {special}")).into());
            }
        }
        tracing::info!("Loaded {} symbol alphabet from {}", alphabet.len(), path.display());
        Ok(Self::new(alphabet, pad_to_len))
    }

    pub fn alphabet_len(&self) -> usize {
        self.alphabet.len()
    }

    pub fn pad_to_len(&self) -> usize {
        self.pad_to_len
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.alphabet.iter().position(|s| s == symbol)
    }

    fn is_special(symbol: &str) -> bool {
        matches!(symbol, PAD | START | END)
    }

    /// `[start]` + symbols + `[end]`, padded with `[nop]` to `pad_to_len`.
    /// Longer sequences are truncated (the `[end]` symbol is lost).
    pub fn vectorize(&self, selfies: &str) -> GenResult<Vec<usize>> {
        let lookup = |symbol: &str| {
            self.index_of(symbol)
                .ok_or_else(|| GenError::decode(format!("symbol {symbol} is not in the alphabet")))
        };

        let mut indices = Vec::with_capacity(self.pad_to_len);
        indices.push(lookup(START)?);
        for symbol in split_symbols(selfies)? {
            indices.push(lookup(symbol)?);
        }
        indices.push(lookup(END)?);

        if indices.len() > self.pad_to_len {
            tracing::warn!(
                "SELFIES with {} symbols truncated to {}",
                indices.len(),
                self.pad_to_len
            );
            indices.truncate(self.pad_to_len);
        }
        indices.resize(self.pad_to_len, 0);
        Ok(indices)
    }

    /// Join the symbols for `indices`; out-of-range indices are skipped.
    pub fn devectorize(&self, indices: &[usize], remove_special: bool) -> String {
        indices
            .iter()
            .filter_map(|&i| self.alphabet.get(i))
            .filter(|s| !(remove_special && Self::is_special(s)))
            .map(String::as_str)
            .collect()
    }

    /// Row-major `[seq_len, alphabet]` probabilities; argmax per position.
    pub fn devectorize_probs(&self, probs: &[f32], remove_special: bool) -> String {
        let width = self.alphabet.len().max(1);
        let indices: Vec<usize> = probs
            .chunks(width)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                    .0
            })
            .collect();
        self.devectorize(&indices, remove_special)
    }
}
