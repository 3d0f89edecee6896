//! Client for the external embedding service
//!
//! The embedding service runs as a separate process and answers
//! `GET /api?query=<text>` with a JSON array of three row-matrices:
//! start, end, and span embeddings for the query. The three parts are
//! concatenated along the feature axis into one phrase vector per query.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use ndarray::{concatenate, Array2, Axis};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;

/// Raw response body: `[start, end, span]`, each of shape (rows, d_i)
#[derive(Debug, Deserialize)]
struct EmbeddingTriple(Vec<Vec<f32>>, Vec<Vec<f32>>, Vec<Vec<f32>>);

/// Concatenated phrase embedding plus the embedding-call latency
#[derive(Debug)]
pub struct PhraseEmbedding {
    pub vecs: Array2<f32>,
    pub latency: Duration,
}

/// Blocking client for the embedding service
pub struct EmbedClient {
    base_url: String,
    http: HttpClient,
}

impl EmbedClient {
    /// Create a client for the embedding service on the given local port
    pub fn new(api_port: u16) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://localhost:{}", api_port),
            http,
        }
    }

    /// Fetch and concatenate the phrase embedding for one query
    pub fn fetch(&self, query: &str) -> Result<PhraseEmbedding> {
        let url = format!("{}/api", self.base_url);
        let started = Instant::now();

        let response = self
            .http
            .get(&url)
            .query(&[("query", query)])
            .send()
            .with_context(|| format!("Failed to reach embedding service at {}", self.base_url))?;

        if !response.status().is_success() {
            bail!("Embedding service returned status: {}", response.status());
        }

        let triple: EmbeddingTriple = response
            .json()
            .context("Failed to parse embedding response")?;
        let latency = started.elapsed();

        let vecs = concat_embedding(&triple.0, &triple.1, &triple.2)?;
        Ok(PhraseEmbedding { vecs, latency })
    }
}

/// Concatenate start/end/span row-matrices along the feature axis.
///
/// Shapes (r, d1), (r, d2), (r, d3) become (r, d1+d2+d3). A row-count
/// mismatch between the parts is an error.
pub fn concat_embedding(
    start: &[Vec<f32>],
    end: &[Vec<f32>],
    span: &[Vec<f32>],
) -> Result<Array2<f32>> {
    let start = to_matrix("start", start)?;
    let end = to_matrix("end", end)?;
    let span = to_matrix("span", span)?;

    if start.nrows() != end.nrows() || start.nrows() != span.nrows() {
        bail!(
            "Embedding parts disagree on row count: start={}, end={}, span={}",
            start.nrows(),
            end.nrows(),
            span.nrows()
        );
    }

    concatenate(Axis(1), &[start.view(), end.view(), span.view()])
        .context("Failed to concatenate embedding parts")
}

fn to_matrix(name: &str, rows: &[Vec<f32>]) -> Result<Array2<f32>> {
    let Some(first) = rows.first() else {
        bail!("Embedding part '{}' is empty", name);
    };
    let cols = first.len();
    if cols == 0 {
        bail!("Embedding part '{}' has zero-width rows", name);
    }

    let mut flat = Vec::with_capacity(rows.len() * cols);
    for row in rows {
        if row.len() != cols {
            bail!(
                "Embedding part '{}' is ragged: expected {} values per row, got {}",
                name,
                cols,
                row.len()
            );
        }
        flat.extend_from_slice(row);
    }

    Array2::from_shape_vec((rows.len(), cols), flat)
        .with_context(|| format!("Embedding part '{}' has an invalid shape", name))
}
