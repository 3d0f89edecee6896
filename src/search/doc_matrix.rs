//! On-disk document-term matrix
//!
//! CSR layout over doc rows × hash buckets, persisted as a single binary
//! file: magic + version + dimensions header, then little-endian `indptr`,
//! `indices`, and `data` arrays. Column indices are strictly ascending
//! within each row so row/query dot products run as a linear merge.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::tfidf::SparseVector;

const MAGIC: [u8; 4] = *b"SPTM";
const VERSION: u32 = 1;

/// Sparse document-term matrix in CSR form
#[derive(Debug)]
pub struct CsrMatrix {
    rows: usize,
    cols: u32,
    indptr: Vec<u64>,
    indices: Vec<u32>,
    data: Vec<f32>,
    /// Per-row L2 norms, precomputed for the cosine kernel
    norms: Vec<f32>,
}

impl CsrMatrix {
    /// Build a matrix from per-row (bucket, weight) entries. Rows are
    /// sorted by bucket; duplicate buckets within a row are rejected.
    pub fn from_rows(cols: u32, rows: &[Vec<(u32, f32)>]) -> Result<Self> {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();

        indptr.push(0u64);
        for (row_idx, row) in rows.iter().enumerate() {
            let mut sorted = row.clone();
            sorted.sort_by_key(|(bucket, _)| *bucket);

            for window in sorted.windows(2) {
                if window[0].0 == window[1].0 {
                    bail!("Row {} has duplicate bucket {}", row_idx, window[0].0);
                }
            }
            for &(bucket, weight) in &sorted {
                if bucket >= cols {
                    bail!(
                        "Row {} bucket {} is out of range (cols {})",
                        row_idx,
                        bucket,
                        cols
                    );
                }
                indices.push(bucket);
                data.push(weight);
            }
            indptr.push(indices.len() as u64);
        }

        let norms = row_norms(&indptr, &data);
        Ok(Self {
            rows: rows.len(),
            cols,
            indptr,
            indices,
            data,
            norms,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create doc matrix file: {}", path.display()))?;
        let mut w = std::io::BufWriter::new(file);

        w.write_all(&MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&(self.rows as u64).to_le_bytes())?;
        w.write_all(&self.cols.to_le_bytes())?;
        w.write_all(&(self.nnz() as u64).to_le_bytes())?;

        for &v in &self.indptr {
            w.write_all(&v.to_le_bytes())?;
        }
        for &v in &self.indices {
            w.write_all(&v.to_le_bytes())?;
        }
        for &v in &self.data {
            w.write_all(&v.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let buf = std::fs::read(path)
            .with_context(|| format!("Failed to read doc matrix file: {}", path.display()))?;
        Self::parse(&buf).with_context(|| format!("Malformed doc matrix file: {}", path.display()))
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        let mut r = Reader { buf, pos: 0 };

        if r.take(4)? != MAGIC.as_slice() {
            bail!("Bad magic (expected SPTM)");
        }
        let version = r.u32()?;
        if version != VERSION {
            bail!("Unsupported version {}", version);
        }

        let rows = r.u64()? as usize;
        let cols = r.u32()?;
        let nnz = r.u64()? as usize;

        let mut indptr = Vec::with_capacity(rows + 1);
        for _ in 0..rows + 1 {
            indptr.push(r.u64()?);
        }
        let mut indices = Vec::with_capacity(nnz);
        for _ in 0..nnz {
            indices.push(r.u32()?);
        }
        let mut data = Vec::with_capacity(nnz);
        for _ in 0..nnz {
            data.push(r.f32()?);
        }
        if r.pos != buf.len() {
            bail!("{} trailing bytes", buf.len() - r.pos);
        }

        if indptr.first() != Some(&0) || indptr.last() != Some(&(nnz as u64)) {
            bail!("Row pointers do not span the data");
        }
        for window in indptr.windows(2) {
            if window[0] > window[1] {
                bail!("Row pointers are not monotonic");
            }
        }
        if let Some(&bucket) = indices.iter().find(|&&b| b >= cols) {
            bail!("Bucket {} is out of range (cols {})", bucket, cols);
        }
        for row in 0..rows {
            let slice = &indices[indptr[row] as usize..indptr[row + 1] as usize];
            if slice.windows(2).any(|w| w[0] >= w[1]) {
                bail!("Row {} buckets are not strictly ascending", row);
            }
        }

        let norms = row_norms(&indptr, &data);
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
            data,
            norms,
        })
    }

    /// Dot product of one matrix row with a sparse query vector.
    /// Out-of-range rows score zero.
    pub fn row_dot(&self, row: usize, spvec: &SparseVector) -> f32 {
        if row >= self.rows {
            return 0.0;
        }
        let lo = self.indptr[row] as usize;
        let hi = self.indptr[row + 1] as usize;
        let indices = &self.indices[lo..hi];
        let data = &self.data[lo..hi];
        let query = spvec.entries();

        let mut i = 0;
        let mut j = 0;
        let mut dot = 0.0;
        while i < indices.len() && j < query.len() {
            let (q_bucket, q_weight) = query[j];
            match indices[i].cmp(&q_bucket) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dot += data[i] * q_weight;
                    i += 1;
                    j += 1;
                }
            }
        }
        dot
    }

    /// L2 norm of one matrix row; zero for out-of-range rows.
    pub fn row_norm(&self, row: usize) -> f32 {
        self.norms.get(row).copied().unwrap_or(0.0)
    }
}

fn row_norms(indptr: &[u64], data: &[f32]) -> Vec<f32> {
    indptr
        .windows(2)
        .map(|w| {
            data[w[0] as usize..w[1] as usize]
                .iter()
                .map(|v| v * v)
                .sum::<f32>()
                .sqrt()
        })
        .collect()
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            bail!("Truncated file at offset {}", self.pos);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> CsrMatrix {
        CsrMatrix::from_rows(
            16,
            &[
                vec![(1, 2.0), (4, 1.0)],
                vec![],
                vec![(0, 0.5), (4, 3.0), (15, 1.0)],
            ],
        )
        .unwrap()
    }

    fn query(entries: &[(u32, f32)]) -> SparseVector {
        // Ranker output is sorted, so tests feed sorted entries too
        SparseVector::from_sorted(entries.to_vec())
    }

    #[test]
    fn test_row_dot_matches_dense_product() {
        let mat = sample();
        let q = query(&[(1, 1.0), (4, 2.0)]);

        // row 0: 2.0*1.0 + 1.0*2.0
        assert_relative_eq!(mat.row_dot(0, &q), 4.0, epsilon = 1e-6);
        // row 1 is empty
        assert_relative_eq!(mat.row_dot(1, &q), 0.0, epsilon = 1e-6);
        // row 2 only shares bucket 4
        assert_relative_eq!(mat.row_dot(2, &q), 6.0, epsilon = 1e-6);
        // out of range
        assert_relative_eq!(mat.row_dot(9, &q), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_row_norms() {
        let mat = sample();
        assert_relative_eq!(mat.row_norm(0), (4.0f32 + 1.0).sqrt(), epsilon = 1e-6);
        assert_relative_eq!(mat.row_norm(1), 0.0, epsilon = 1e-6);
        assert_relative_eq!(mat.row_norm(9), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_mat.sptm");

        let mat = sample();
        mat.save(&path).unwrap();
        let loaded = CsrMatrix::load(&path).unwrap();

        assert_eq!(loaded.rows(), 3);
        assert_eq!(loaded.cols(), 16);
        assert_eq!(loaded.nnz(), 5);

        let q = query(&[(4, 1.0)]);
        assert_relative_eq!(loaded.row_dot(2, &q), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_mat.sptm");
        std::fs::write(&path, b"XXXX000000000000").unwrap();

        let err = CsrMatrix::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Malformed"));
    }

    #[test]
    fn test_load_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_mat.sptm");

        let mat = sample();
        mat.save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(CsrMatrix::load(&path).is_err());
    }

    #[test]
    fn test_from_rows_rejects_out_of_range_bucket() {
        assert!(CsrMatrix::from_rows(4, &[vec![(4, 1.0)]]).is_err());
    }

    #[test]
    fn test_from_rows_rejects_duplicate_bucket() {
        assert!(CsrMatrix::from_rows(8, &[vec![(2, 1.0), (2, 3.0)]]).is_err());
    }
}
