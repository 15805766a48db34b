//! Sparse normalized adjacency for the user-item interaction graph.
//!
//! The interaction graph is bipartite: nodes `[0, n_users)` are users,
//! nodes `[n_users, n_users + n_items)` are items, and every observed
//! interaction contributes a symmetric pair of edges. Degree normalization
//! (e.g. `D^{-1/2} A D^{-1/2}`) happens upstream, once, before the matrix
//! reaches this crate; propagation only multiplies by it.
//!
//! [`SparseAdjacency`] keeps the coordinate form as the source of truth.
//! [`SparseAdjacency::to_dense`] materializes the `(N, N)` tensor that the
//! propagation matmul consumes, and [`SparseAdjacency::sparse_dropout`] is
//! a pure function from one coordinate form to another, so structural
//! dropout stays reproducible under a seeded RNG.

use candle_core::{Device, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable sparse matrix in coordinate form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseAdjacency {
    num_nodes: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    weights: Vec<f32>,
}

impl SparseAdjacency {
    /// Build from `(row, col, weight)` entries over a square matrix of
    /// `num_nodes` nodes.
    ///
    /// Duplicate coordinates are allowed and sum when densified. Fails on
    /// out-of-range coordinates or non-finite weights.
    pub fn from_coo<I>(num_nodes: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f32)>,
    {
        if num_nodes == 0 {
            return Err(Error::InvalidConfig(
                "adjacency must have at least one node".into(),
            ));
        }

        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut weights = Vec::new();
        for (row, col, weight) in entries {
            if row >= num_nodes {
                return Err(Error::IndexOutOfRange {
                    index: row,
                    bound: num_nodes,
                    kind: "node",
                });
            }
            if col >= num_nodes {
                return Err(Error::IndexOutOfRange {
                    index: col,
                    bound: num_nodes,
                    kind: "node",
                });
            }
            if !weight.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "non-finite edge weight {weight} at ({row}, {col})"
                )));
            }
            rows.push(row);
            cols.push(col);
            weights.push(weight);
        }

        Ok(Self {
            num_nodes,
            rows,
            cols,
            weights,
        })
    }

    /// Number of nodes on each side of the square matrix.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.weights.len()
    }

    /// Iterate over stored `(row, col, weight)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.weights.iter())
            .map(|((&r, &c), &w)| (r, c, w))
    }

    /// Materialize the dense `(N, N)` tensor consumed by propagation.
    pub fn to_dense(&self, device: &Device) -> Result<Tensor> {
        let n = self.num_nodes;
        let mut data = vec![0f32; n * n];
        for (row, col, weight) in self.entries() {
            data[row * n + col] += weight;
        }
        Ok(Tensor::from_vec(data, (n, n), device)?)
    }

    /// Structural dropout: retain each entry independently with
    /// probability `1 - rate`, rescaling survivors by `1 / (1 - rate)` so
    /// the aggregate magnitude is preserved in expectation.
    ///
    /// `rate == 0` returns an identical matrix without consuming any
    /// randomness. `rate` must lie in `[0, 1)`.
    pub fn sparse_dropout<R: Rng>(&self, rate: f32, rng: &mut R) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "dropout rate must be in [0, 1), got {rate}"
        );
        if rate == 0.0 {
            return self.clone();
        }

        let scale = 1.0 / (1.0 - rate);
        let mut rows = Vec::with_capacity(self.nnz());
        let mut cols = Vec::with_capacity(self.nnz());
        let mut weights = Vec::with_capacity(self.nnz());
        for (row, col, weight) in self.entries() {
            if rng.random::<f32>() >= rate {
                rows.push(row);
                cols.push(col);
                weights.push(weight * scale);
            }
        }

        Self {
            num_nodes: self.num_nodes,
            rows,
            cols,
            weights,
        }
    }
}
