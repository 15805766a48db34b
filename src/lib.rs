//! Neural Graph Collaborative Filtering on candle tensors.
//!
//! `ngcf` implements the embedding-propagation model of
//! [Wang et al., "Neural Graph Collaborative Filtering", SIGIR 2019](https://arxiv.org/abs/1905.08108):
//! user and item embeddings are refined by message passing over the
//! user-item interaction graph, and trained with the BPR pairwise ranking
//! objective. The crate is the numeric kernel only — graph normalization,
//! batch sampling, and the optimizer loop are the caller's side of the
//! contract.
//!
//! # Modules
//!
//! - [`adjacency`]: Sparse normalized adjacency and structural dropout
//! - [`model`]: The propagation model, BPR loss, and scoring
//! - [`config`]: Hyperparameters and external driver settings
//! - [`error`]: Crate error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use candle_core::{DType, Device};
//! use candle_nn::{Optimizer, SGD, VarBuilder, VarMap};
//! use ngcf::{ModelConfig, Ngcf, SparseAdjacency};
//!
//! // Degree-normalized adjacency over n_users + n_items nodes,
//! // produced by the preprocessing pipeline.
//! let adj = SparseAdjacency::from_coo(n_users + n_items, edges)?;
//!
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
//! let mut model = Ngcf::new(n_users, n_items, adj, ModelConfig::default(), vb)?;
//!
//! let mut opt = SGD::new(varmap.all_vars(), 1e-2)?;
//! for (users, pos, neg) in batches {
//!     let loss = model.bpr_loss(&users, &pos, &neg)?;
//!     opt.backward_step(&loss.total)?;
//! }
//!
//! // Rank candidate items for the first three users.
//! let scores = model.score(&[0, 1, 2], &candidate_items)?;
//! ```

pub mod adjacency;
pub mod config;
pub mod error;
pub mod model;

pub use adjacency::SparseAdjacency;
pub use config::{AdversarialConfig, ModelConfig, TrainingSettings};
pub use error::{Error, Result};
pub use model::{BprLoss, Ngcf, PropagationLayer};
