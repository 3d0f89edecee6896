//! Retrieval backends
//!
//! The server holds exactly one `PhraseSearcher`, selected at startup:
//! dense (vector index only) or sparse-hybrid (vector index + TF-IDF
//! document rescoring). Backends are strategies over the same capability,
//! not adapters to external systems.

pub mod dense;
pub mod doc_matrix;
pub mod sparse;
pub mod tfidf;

pub use dense::DenseSearcher;
pub use doc_matrix::CsrMatrix;
pub use sparse::{HybridSearcher, SparseKernel, SparseOptions};
pub use tfidf::{SparseVector, TfidfRanker};

use anyhow::Result;
use ndarray::Array2;
use serde::Serialize;

use crate::config::Config;

/// One retrieved phrase, serialized verbatim into the API response
#[derive(Debug, Clone, Serialize)]
pub struct PhraseHit {
    pub doc_id: i64,
    pub title: String,
    pub answer: String,
    pub context: String,
    pub score: f32,
}

/// Per-call tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub top_k: usize,
    pub nprobe: usize,
}

/// Phrase retrieval interface - one hit list per query row
pub trait PhraseSearcher: Send + Sync {
    /// Backend name for startup logs
    fn name(&self) -> &'static str;

    /// Search all query rows; `queries` carries the raw query texts in
    /// row order (the hybrid backend needs them for sparse scoring).
    fn search(
        &self,
        phrase_vecs: &Array2<f32>,
        queries: &[&str],
        params: &SearchParams,
    ) -> Result<Vec<Vec<PhraseHit>>>;
}

/// Build the backend the configuration selects.
///
/// Any missing or malformed artifact surfaces here and aborts startup.
pub fn build_searcher(config: &Config) -> Result<Box<dyn PhraseSearcher>> {
    if config.cuda {
        eprintln!("⚠️  GPU search is not available in this build, continuing on CPU");
    }

    let dense = DenseSearcher::open(
        &config.dump_dir,
        &config.index_path,
        &config.idx2id_path,
        config.max_answer_length,
        config.num_dummy_zeros,
    )?;

    if !config.sparse {
        return Ok(Box::new(dense));
    }

    let ranker = TfidfRanker::load(&config.ranker_path)?;
    println!("Ranker loaded from {}", config.ranker_path.display());

    let doc_mat = CsrMatrix::load(&config.doc_mat_path)?;
    println!(
        "Doc TF-IDF matrix loaded ({} x {})",
        doc_mat.rows(),
        doc_mat.cols()
    );

    let opts = SparseOptions {
        sparse_weight: config.sparse_weight,
        kernel: config.sparse_type.parse()?,
        start_top_k: config.start_top_k,
        mid_top_k: config.mid_top_k,
        filter: config.filter,
    };
    Ok(Box::new(HybridSearcher::new(dense, ranker, doc_mat, opts)))
}
