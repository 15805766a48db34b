//! Model hyperparameters and external driver settings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// NGCF hyperparameters.
///
/// Defaults follow the reference setup for implicit-feedback datasets:
/// 24-dimensional ego embeddings propagated through three 64-wide layers,
/// no dropout, no L2 regularization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Width of the layer-0 (ego) embedding tables (default: 24).
    pub embedding_dim: usize,
    /// Output width of each propagation layer, in order (default: [64, 64, 64]).
    pub layer_sizes: Vec<usize>,
    /// Batch size, used only to scale the regularization term (default: 512).
    pub batch_size: usize,
    /// L2 regularization coefficient; 0 disables the term (default: 0).
    pub decay: f32,
    /// Structural dropout rate on adjacency entries, in [0, 1) (default: 0).
    pub node_dropout: f32,
    /// Per-layer message dropout rates, in [0, 1); must match `layer_sizes`
    /// in length (default: [0, 0, 0]).
    pub mess_dropout: Vec<f32>,
    /// Seed for the structural-dropout RNG (default: 42).
    pub seed: u64,
    /// Reserved adversarial-training knobs; not wired into the propagation
    /// or loss path.
    pub adversarial: Option<AdversarialConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 24,
            layer_sizes: vec![64, 64, 64],
            batch_size: 512,
            decay: 0.0,
            node_dropout: 0.0,
            mess_dropout: vec![0.0, 0.0, 0.0],
            seed: 42,
            adversarial: None,
        }
    }
}

impl ModelConfig {
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Set the propagation layer widths. The message-dropout list is resized
    /// to match, padding new layers with 0.
    pub fn with_layer_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.mess_dropout.resize(sizes.len(), 0.0);
        self.layer_sizes = sizes;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_decay(mut self, decay: f32) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_node_dropout(mut self, rate: f32) -> Self {
        self.node_dropout = rate;
        self
    }

    /// Set a uniform message-dropout rate across all layers.
    pub fn with_mess_dropout(mut self, rate: f32) -> Self {
        self.mess_dropout = vec![rate; self.layer_sizes.len()];
        self
    }

    /// Set per-layer message-dropout rates.
    pub fn with_mess_dropout_per_layer(mut self, rates: Vec<f32>) -> Self {
        self.mess_dropout = rates;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total width of the final node representation: the ego embedding
    /// concatenated with every propagated layer block.
    pub fn output_dim(&self) -> usize {
        self.embedding_dim + self.layer_sizes.iter().sum::<usize>()
    }

    /// Check hyperparameter consistency. Called at model construction.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig("embedding_dim must be > 0".into()));
        }
        if self.layer_sizes.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one propagation layer is required".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".into()));
        }
        if !self.decay.is_finite() || self.decay < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "decay must be finite and >= 0, got {}",
                self.decay
            )));
        }
        if !(0.0..1.0).contains(&self.node_dropout) {
            return Err(Error::InvalidConfig(format!(
                "node_dropout must be in [0, 1), got {}",
                self.node_dropout
            )));
        }
        if self.mess_dropout.len() != self.layer_sizes.len() {
            return Err(Error::ShapeMismatch {
                expected: self.layer_sizes.len(),
                got: self.mess_dropout.len(),
            });
        }
        for &rate in &self.mess_dropout {
            if !(0.0..1.0).contains(&rate) {
                return Err(Error::InvalidConfig(format!(
                    "mess_dropout rates must be in [0, 1), got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Reserved knobs for an adversarial-training extension.
///
/// Kept for configuration compatibility; nothing in the propagation or
/// loss path reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdversarialConfig {
    /// Ranking margin between clean and perturbed scores (default: 1.0).
    pub margin: f32,
    /// Scale of the embedding perturbation (default: 0.01).
    pub epsilon: f32,
    /// Number of perturbation steps (default: 100).
    pub steps: usize,
}

impl Default for AdversarialConfig {
    fn default() -> Self {
        Self {
            margin: 1.0,
            epsilon: 0.01,
            steps: 100,
        }
    }
}

/// Settings consumed by an external training driver.
///
/// The core model never reads these; they travel alongside [`ModelConfig`]
/// so a driver can checkpoint one self-describing settings object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Number of passes over the interaction data (default: 40).
    pub epochs: usize,
    /// Mini-batch size for the driver's sampler (default: 512).
    pub batch_size: usize,
    /// Where the driver saves model parameters between runs.
    pub checkpoint_path: std::path::PathBuf,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 40,
            batch_size: 512,
            checkpoint_path: "./model.safetensors".into(),
        }
    }
}
