//! Hashed TF-IDF query vectorizer
//!
//! Mirrors the vectorizer the document-term matrix was built with:
//! lowercase alphanumeric tokens, 1..=N-grams, FNV-1a hashing into a fixed
//! bucket space, term counts weighted by stored IDF values. Buckets with no
//! stored IDF never appear in the matrix, so they are skipped here too.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Sparse query vector, sorted by bucket index
#[derive(Debug, Clone, Default)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build from entries already sorted by bucket index
    pub(crate) fn from_sorted(entries: Vec<(u32, f32)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries }
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn l2_norm(&self) -> f32 {
        self.entries
            .iter()
            .map(|(_, v)| v * v)
            .sum::<f32>()
            .sqrt()
    }
}

/// On-disk ranker model
#[derive(Debug, Deserialize)]
struct RankerFile {
    ngram: usize,
    hash_size: u32,
    idf: HashMap<u32, f32>,
}

/// TF-IDF ranker loaded from a JSON model file
pub struct TfidfRanker {
    ngram: usize,
    hash_size: u32,
    idf: HashMap<u32, f32>,
}

impl TfidfRanker {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read ranker file: {}", path.display()))?;
        let file: RankerFile = serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed ranker file: {}", path.display()))?;

        Self::new(file.ngram, file.hash_size, file.idf)
    }

    pub fn new(ngram: usize, hash_size: u32, idf: HashMap<u32, f32>) -> Result<Self> {
        if ngram == 0 {
            bail!("Ranker ngram order must be at least 1");
        }
        if hash_size == 0 {
            bail!("Ranker hash size must be positive");
        }
        if let Some(bucket) = idf.keys().find(|&&b| b >= hash_size) {
            bail!(
                "Ranker IDF bucket {} is out of range (hash size {})",
                bucket,
                hash_size
            );
        }

        Ok(Self {
            ngram,
            hash_size,
            idf,
        })
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    /// Turn free text into a sparse TF-IDF vector
    pub fn text2spvec(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let mut counts: HashMap<u32, f32> = HashMap::new();

        for n in 1..=self.ngram {
            for gram in tokens.windows(n) {
                let bucket = (fnv1a64(gram.join(" ").as_bytes()) % self.hash_size as u64) as u32;
                *counts.entry(bucket).or_default() += 1.0;
            }
        }

        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .filter_map(|(bucket, tf)| {
                self.idf
                    .get(&bucket)
                    .map(|idf| (bucket, tf * idf))
                    .filter(|(_, w)| *w != 0.0)
            })
            .collect();
        entries.sort_by_key(|(bucket, _)| *bucket);

        SparseVector { entries }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// FNV-1a 64-bit. Stable across platforms and releases, which matters
/// because the doc matrix persists bucket indices.
pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
