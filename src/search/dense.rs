//! Dense phrase backend over a usearch inner-product index
//!
//! Owns the three artifacts the demo needs at search time: the HNSW index,
//! the key → phrase mapping, and the document store from the phrase dump.
//! All three are loaded once at startup; a missing or malformed file aborts
//! the launch.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::Deserialize;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{PhraseHit, PhraseSearcher, SearchParams};

/// One entry of the id-mapping file: index key → phrase
#[derive(Debug, Clone, Deserialize)]
pub struct PhraseRecord {
    pub key: u64,
    pub doc_id: i64,
    pub answer: String,
}

/// One entry of the document store in the phrase dump
#[derive(Debug, Clone, Deserialize)]
pub struct DocRecord {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct IdMapFile {
    /// Indexed vector width, dummy-zero padding included
    dimension: usize,
    phrases: Vec<PhraseRecord>,
}

pub struct DenseSearcher {
    index: Index,
    phrases: HashMap<u64, PhraseRecord>,
    docs: HashMap<i64, DocRecord>,
    dimension: usize,
    max_answer_length: usize,
    num_dummy_zeros: usize,
}

impl DenseSearcher {
    pub fn open(
        dump_dir: &Path,
        index_path: &Path,
        idx2id_path: &Path,
        max_answer_length: usize,
        num_dummy_zeros: usize,
    ) -> Result<Self> {
        let raw = std::fs::read(idx2id_path)
            .with_context(|| format!("Failed to read id map: {}", idx2id_path.display()))?;
        let id_map: IdMapFile = serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed id map: {}", idx2id_path.display()))?;
        if id_map.dimension == 0 {
            bail!("Id map declares a zero-width index: {}", idx2id_path.display());
        }

        let docs_path = dump_dir.join("docs.json");
        let raw = std::fs::read(&docs_path)
            .with_context(|| format!("Failed to read document store: {}", docs_path.display()))?;
        let docs: HashMap<i64, DocRecord> = serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed document store: {}", docs_path.display()))?;

        let options = IndexOptions {
            dimensions: id_map.dimension,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            ..Default::default()
        };
        let index = Index::new(&options).context("Failed to create index")?;
        index
            .load(index_path.to_str().context("Index path is not valid UTF-8")?)
            .with_context(|| format!("Failed to load index: {}", index_path.display()))?;

        let phrases = id_map
            .phrases
            .into_iter()
            .map(|record| (record.key, record))
            .collect();

        Ok(Self {
            index,
            phrases,
            docs,
            dimension: id_map.dimension,
            max_answer_length,
            num_dummy_zeros,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// k-NN search for each query row, mapped back to phrases.
    ///
    /// Hits are returned in index order (best first). Keys absent from the
    /// id map and answers over the token cap are dropped, so a row may hold
    /// fewer than `count` hits.
    pub(crate) fn raw_search(
        &self,
        phrase_vecs: &Array2<f32>,
        count: usize,
        nprobe: usize,
    ) -> Result<Vec<Vec<PhraseHit>>> {
        if nprobe > 0 {
            self.index.change_expansion_search(nprobe);
        }

        let mut all = Vec::with_capacity(phrase_vecs.nrows());
        for row in phrase_vecs.outer_iter() {
            let mut vec = row.to_vec();
            vec.resize(vec.len() + self.num_dummy_zeros, 0.0);
            if vec.len() != self.dimension {
                bail!(
                    "Query vector has {} dims (with {} dummy zeros), index expects {}",
                    vec.len(),
                    self.num_dummy_zeros,
                    self.dimension
                );
            }

            let matches = self
                .index
                .search(&vec, count)
                .context("Vector search failed")?;

            let mut hits = Vec::with_capacity(matches.keys.len());
            for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
                let Some(record) = self.phrases.get(key) else {
                    continue;
                };
                if token_count(&record.answer) > self.max_answer_length {
                    continue;
                }
                let (title, context) = match self.docs.get(&record.doc_id) {
                    Some(doc) => (doc.title.clone(), doc.text.clone()),
                    None => (String::new(), String::new()),
                };
                hits.push(PhraseHit {
                    doc_id: record.doc_id,
                    title,
                    answer: record.answer.clone(),
                    context,
                    // usearch reports IP distance as 1 - <q, v>
                    score: 1.0 - distance,
                });
            }
            all.push(hits);
        }
        Ok(all)
    }
}

impl PhraseSearcher for DenseSearcher {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn search(
        &self,
        phrase_vecs: &Array2<f32>,
        _queries: &[&str],
        params: &SearchParams,
    ) -> Result<Vec<Vec<PhraseHit>>> {
        let mut rows = self.raw_search(phrase_vecs, params.top_k, params.nprobe)?;
        for hits in &mut rows {
            hits.truncate(params.top_k);
        }
        Ok(rows)
    }
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
