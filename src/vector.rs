//! Vector types shared by the two indexes: a sorted sparse vector, a CSR
//! matrix of sparse rows, and a row-major dense matrix, plus the cosine
//! similarity both rankers use.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Sparse vector with strictly increasing indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

/// Borrowed view of one sparse row.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [u32],
    pub values: &'a [f32],
}

impl SparseVector {
    /// Build from `(index, value)` pairs in any order; repeated indices are
    /// summed.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut merged: BTreeMap<u32, f32> = BTreeMap::new();
        for (idx, value) in pairs {
            *merged.entry(idx).or_insert(0.0) += value;
        }
        let (indices, values) = merged.into_iter().unzip();
        Self { indices, values }
    }

    /// Build from parallel arrays. `None` unless the lengths match and the
    /// indices strictly increase.
    pub fn from_sorted(indices: Vec<u32>, values: Vec<f32>) -> Option<Self> {
        if indices.len() != values.len()
            || indices.windows(2).any(|w| w[0] >= w[1])
        {
            return None;
        }
        Some(Self { indices, values })
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn as_row(&self) -> SparseRow<'_> {
        SparseRow {
            indices: &self.indices,
            values: &self.values,
        }
    }

    pub fn norm(&self) -> f32 {
        self.as_row().norm()
    }

    /// Scale every component by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            indices: self.indices.clone(),
            values: self.values.iter().map(|v| factor * v).collect(),
        }
    }

    /// Divide by the L2 norm. All-zero vectors are returned unchanged.
    pub fn l2_normalized(mut self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
        self
    }

    /// Return `self + factor * other`.
    pub fn add_scaled(&self, factor: f32, other: SparseRow<'_>) -> Self {
        let mut indices =
            Vec::with_capacity(self.indices.len() + other.indices.len());
        let mut values = Vec::with_capacity(indices.capacity());

        let (mut i, mut j) = (0, 0);
        while i < self.indices.len() || j < other.indices.len() {
            let a = self.indices.get(i).copied();
            let b = other.indices.get(j).copied();
            match (a, b) {
                (Some(x), Some(y)) if x == y => {
                    indices.push(x);
                    values.push(self.values[i] + factor * other.values[j]);
                    i += 1;
                    j += 1;
                }
                (Some(x), Some(y)) if x < y => {
                    indices.push(x);
                    values.push(self.values[i]);
                    i += 1;
                }
                (Some(x), None) => {
                    indices.push(x);
                    values.push(self.values[i]);
                    i += 1;
                }
                (_, Some(y)) => {
                    indices.push(y);
                    values.push(factor * other.values[j]);
                    j += 1;
                }
                (None, None) => break,
            }
        }

        Self { indices, values }
    }
}

impl SparseRow<'_> {
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn dot(&self, other: SparseRow<'_>) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }
        sum
    }
}

/// Cosine similarity of two sparse vectors; 0 when either is all-zero.
pub fn sparse_cosine(a: SparseRow<'_>, b: SparseRow<'_>) -> f32 {
    let denom = a.norm() * b.norm();
    if denom == 0.0 {
        return 0.0;
    }
    a.dot(b) / denom
}

/// Row-compressed sparse matrix `[n_rows x n_cols]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl SparseMatrix {
    pub fn from_rows(n_cols: usize, rows: Vec<SparseVector>) -> Self {
        let nnz = rows.iter().map(SparseVector::nnz).sum();
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);

        indptr.push(0);
        for row in rows {
            indices.extend_from_slice(&row.indices);
            values.extend_from_slice(&row.values);
            indptr.push(indices.len());
        }

        Self {
            n_cols,
            indptr,
            indices,
            values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn row(&self, i: usize) -> SparseRow<'_> {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        SparseRow {
            indices: &self.indices[start..end],
            values: &self.values[start..end],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> {
        (0..self.n_rows()).map(|i| self.row(i))
    }

    /// Cosine similarity between `query` and every row, in row order.
    pub fn cosine_scores(&self, query: &SparseVector) -> Vec<f32> {
        let q = query.as_row();
        (0..self.n_rows())
            .into_par_iter()
            .map(|i| sparse_cosine(q, self.row(i)))
            .collect()
    }

    /// Mean of the given rows, or `None` when `rows` is empty.
    pub fn centroid(&self, rows: &[usize]) -> Option<SparseVector> {
        if rows.is_empty() {
            return None;
        }
        let sum = SparseVector::from_pairs(rows.iter().flat_map(|&r| {
            let row = self.row(r);
            row.indices.iter().copied().zip(row.values.iter().copied())
        }));
        Some(sum.scaled(1.0 / rows.len() as f32))
    }
}

/// Row-major dense matrix `[n_rows x dim]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseMatrix {
    n_rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    pub fn from_flat(n_rows: usize, dim: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != n_rows * dim {
            return Err(Error::InvalidArgument(format!(
                "dense matrix data has {} values, expected {n_rows} x {dim}",
                data.len()
            )));
        }
        Ok(Self { n_rows, dim, data })
    }

    /// Stack equally sized rows. An empty input yields a `0 x 0` matrix.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let n_rows = rows.len();
        let dim = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) =
            rows.iter().enumerate().find(|(_, r)| r.len() != dim)
        {
            return Err(Error::InvalidArgument(format!(
                "row {i} has dimension {}, expected {dim}",
                row.len()
            )));
        }
        Ok(Self {
            n_rows,
            dim,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Cosine similarity between `query` and every row, in row order.
    /// `query` must have length `dim`.
    pub fn cosine_scores(&self, query: &[f32]) -> Vec<f32> {
        if self.dim == 0 {
            return vec![0.0; self.n_rows];
        }
        self.data
            .par_chunks(self.dim)
            .map(|row| dense_cosine(query, row))
            .collect()
    }

    /// Mean of the given rows, or `None` when `rows` is empty.
    pub fn centroid(&self, rows: &[usize]) -> Option<Vec<f32>> {
        if rows.is_empty() {
            return None;
        }
        let mut mean = vec![0.0f32; self.dim];
        for &r in rows {
            for (m, v) in mean.iter_mut().zip(self.row(r)) {
                *m += v;
            }
        }
        let n = rows.len() as f32;
        for m in &mut mean {
            *m /= n;
        }
        Some(mean)
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two dense vectors; 0 when either is all-zero.
pub fn dense_cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    dot(a, b) / denom
}
