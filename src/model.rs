//! NGCF: embedding propagation and pairwise ranking loss.
//!
//! Neural Graph Collaborative Filtering ([Wang et al. 2019](https://arxiv.org/abs/1905.08108))
//! refines user and item embeddings by propagating them over the
//! interaction graph, so collaborative signal from multi-hop neighbors
//! lands directly in the representations.
//!
//! # Propagation
//!
//! With `L̂` the normalized adjacency and `E^{(k)}` the node embeddings at
//! layer k:
//!
//! ```text
//! side     = L̂ E^{(k)}
//! E^{(k+1)} = LeakyReLU(side · W_gc + b_gc + (E^{(k)} ⊙ side) · W_bi + b_bi)
//! ```
//!
//! The `⊙` term is the bi-interaction message: it encodes the affinity
//! between a node's own embedding and its aggregated neighborhood, which
//! is what separates NGCF from a plain graph convolution. The final node
//! representation concatenates the ego embedding with the L2-normalized
//! block from every layer, so each hop contributes its own slice of the
//! feature axis.
//!
//! # Training
//!
//! [`Ngcf::bpr_loss`] implements the Bayesian Personalized Ranking
//! objective (Rendle et al., 2009) over (user, positive, negative)
//! triples. Parameters are registered through the caller's
//! [`VarBuilder`], so any candle optimizer can step them between calls.

use candle_core::{Device, Tensor};
use candle_nn::{Activation, Dropout, Init, Module, VarBuilder};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use tracing::{debug, trace};

use crate::adjacency::SparseAdjacency;
use crate::config::ModelConfig;
use crate::error::{Error, Result};

/// Negative slope of the propagation nonlinearity.
const LEAKY_SLOPE: f64 = 0.2;

/// Xavier/Glorot-uniform initialization over a 2-D shape.
fn xavier_uniform(fan_in: usize, fan_out: usize) -> Init {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// Learnable weights of one propagation layer.
///
/// `w_gc`/`b_gc` transform the aggregated neighbor message, `w_bi`/`b_bi`
/// the element-wise ego-neighbor interaction.
#[derive(Debug, Clone)]
pub struct PropagationLayer {
    w_gc: Tensor,
    b_gc: Tensor,
    w_bi: Tensor,
    b_bi: Tensor,
}

impl PropagationLayer {
    fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let w_gc = vb.get_with_hints((in_dim, out_dim), "w_gc", xavier_uniform(in_dim, out_dim))?;
        let b_gc = vb.get_with_hints((1, out_dim), "b_gc", xavier_uniform(1, out_dim))?;
        let w_bi = vb.get_with_hints((in_dim, out_dim), "w_bi", xavier_uniform(in_dim, out_dim))?;
        let b_bi = vb.get_with_hints((1, out_dim), "b_bi", xavier_uniform(1, out_dim))?;
        Ok(Self {
            w_gc,
            b_gc,
            w_bi,
            b_bi,
        })
    }
}

/// Loss components of one training batch.
///
/// All three are scalar tensors attached to the parameter graph; callers
/// backprop through `total` and log `ranking`/`regularization` separately.
#[derive(Debug, Clone)]
pub struct BprLoss {
    /// `ranking + regularization`.
    pub total: Tensor,
    /// `-mean(log σ(pos_score - neg_score))`; always >= 0.
    pub ranking: Tensor,
    /// `decay · (‖u‖² + ‖i‖² + ‖j‖²) / 2 / batch_size`; exactly zero when
    /// decay is zero.
    pub regularization: Tensor,
}

/// Neural Graph Collaborative Filtering model.
///
/// Holds the embedding tables, per-layer transforms, and the normalized
/// adjacency of the interaction graph. The adjacency is immutable after
/// construction; the parameters are mutated only by an external optimizer
/// between calls.
pub struct Ngcf {
    n_users: usize,
    n_items: usize,
    config: ModelConfig,
    user_emb: Tensor,
    item_emb: Tensor,
    layers: Vec<PropagationLayer>,
    mess_dropout: Vec<Dropout>,
    act: Activation,
    adj: SparseAdjacency,
    adj_dense: Tensor,
    device: Device,
    rng: XorShiftRng,
}

impl Ngcf {
    /// Build the model over a normalized adjacency covering
    /// `n_users + n_items` nodes.
    ///
    /// Parameters are created through `vb`, so the caller's `VarMap` owns
    /// them and an optimizer can step `varmap.all_vars()`. Fails if the
    /// adjacency size disagrees with the node count or the configuration
    /// is inconsistent.
    pub fn new(
        n_users: usize,
        n_items: usize,
        adj: SparseAdjacency,
        config: ModelConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        if n_users == 0 || n_items == 0 {
            return Err(Error::InvalidConfig(
                "n_users and n_items must be > 0".into(),
            ));
        }
        let num_nodes = n_users + n_items;
        if adj.num_nodes() != num_nodes {
            return Err(Error::ShapeMismatch {
                expected: num_nodes,
                got: adj.num_nodes(),
            });
        }

        let d0 = config.embedding_dim;
        let user_emb = vb.get_with_hints((n_users, d0), "user_emb", xavier_uniform(n_users, d0))?;
        let item_emb = vb.get_with_hints((n_items, d0), "item_emb", xavier_uniform(n_items, d0))?;

        let mut layers = Vec::with_capacity(config.layer_sizes.len());
        let mut in_dim = d0;
        for (k, &out_dim) in config.layer_sizes.iter().enumerate() {
            layers.push(PropagationLayer::new(
                in_dim,
                out_dim,
                vb.pp(format!("layer_{k}")),
            )?);
            in_dim = out_dim;
        }

        let mess_dropout = config.mess_dropout.iter().map(|&p| Dropout::new(p)).collect();

        let device = vb.device().clone();
        let adj_dense = adj.to_dense(&device)?;
        let rng = XorShiftRng::seed_from_u64(config.seed);

        debug!(
            n_users,
            n_items,
            nnz = adj.nnz(),
            layers = config.layer_sizes.len(),
            output_dim = config.output_dim(),
            "initialized ngcf model"
        );

        Ok(Self {
            n_users,
            n_items,
            config,
            user_emb,
            item_emb,
            layers,
            mess_dropout,
            act: Activation::LeakyRelu(LEAKY_SLOPE),
            adj,
            adj_dense,
            device,
            rng,
        })
    }

    /// Number of user nodes.
    pub fn num_users(&self) -> usize {
        self.n_users
    }

    /// Number of item nodes.
    pub fn num_items(&self) -> usize {
        self.n_items
    }

    /// Width of the final node representation.
    pub fn output_dim(&self) -> usize {
        self.config.output_dim()
    }

    /// Model hyperparameters.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The normalized adjacency the model was built with.
    pub fn adjacency(&self) -> &SparseAdjacency {
        &self.adj
    }

    /// Propagate embeddings and gather the batch rows.
    ///
    /// Returns `(users, positive items, negative items)` with feature
    /// width [`Ngcf::output_dim`]; the negative batch is `None` when
    /// `neg_items` is empty (inference call). With `train` set, structural
    /// and message dropout apply as configured, which advances the
    /// model's dropout RNG.
    pub fn propagate(
        &mut self,
        users: &[u32],
        pos_items: &[u32],
        neg_items: &[u32],
        train: bool,
    ) -> Result<(Tensor, Tensor, Option<Tensor>)> {
        let adj = if train && self.config.node_dropout > 0.0 {
            self.adj
                .sparse_dropout(self.config.node_dropout, &mut self.rng)
                .to_dense(&self.device)?
        } else {
            self.adj_dense.clone()
        };
        self.batch_embeddings(&adj, train, users, pos_items, neg_items)
    }

    /// BPR loss over a batch of (user, positive item, negative item)
    /// triples, with training-mode dropout.
    pub fn bpr_loss(&mut self, users: &[u32], pos_items: &[u32], neg_items: &[u32]) -> Result<BprLoss> {
        if users.is_empty() {
            return Err(Error::InvalidConfig(
                "bpr_loss requires a non-empty batch".into(),
            ));
        }
        if neg_items.len() != users.len() {
            return Err(Error::ShapeMismatch {
                expected: users.len(),
                got: neg_items.len(),
            });
        }

        let (u, pos, neg) = self.propagate(users, pos_items, neg_items, true)?;
        let neg = neg.ok_or_else(|| Error::InvalidConfig("missing negative batch".into()))?;

        let pos_scores = (&u * &pos)?.sum(1)?;
        let neg_scores = (&u * &neg)?.sum(1)?;
        let ranking = log_sigmoid(&(pos_scores - neg_scores)?)?
            .mean_all()?
            .neg()?;

        let frobenius = ((u.sqr()?.sum_all()? + pos.sqr()?.sum_all()?)? + neg.sqr()?.sum_all()?)?;
        let regularization = ((frobenius / 2.0)?
            * (self.config.decay as f64 / self.config.batch_size as f64))?;

        let total = (&ranking + &regularization)?;
        trace!(batch = users.len(), "computed bpr loss");

        Ok(BprLoss {
            total,
            ranking,
            regularization,
        })
    }

    /// Affinity scores between every given user and every given item:
    /// a `(|users|, |items|)` matrix of dot products over the final
    /// representations. Inference path, dropout disabled.
    pub fn score(&self, users: &[u32], items: &[u32]) -> Result<Tensor> {
        let all = self.all_embeddings(&self.adj_dense, false)?;
        let user_all = all.narrow(0, 0, self.n_users)?;
        let item_all = all.narrow(0, self.n_users, self.n_items)?;

        let u = gather(&user_all, users, self.n_users, "user", &self.device)?;
        let i = gather(&item_all, items, self.n_items, "item", &self.device)?;
        Ok(u.matmul(&i.t()?)?)
    }

    /// Run the propagation loop and gather the three index slices.
    fn batch_embeddings(
        &self,
        adj: &Tensor,
        train: bool,
        users: &[u32],
        pos_items: &[u32],
        neg_items: &[u32],
    ) -> Result<(Tensor, Tensor, Option<Tensor>)> {
        if pos_items.len() != users.len() {
            return Err(Error::ShapeMismatch {
                expected: users.len(),
                got: pos_items.len(),
            });
        }
        if !neg_items.is_empty() && neg_items.len() != users.len() {
            return Err(Error::ShapeMismatch {
                expected: users.len(),
                got: neg_items.len(),
            });
        }

        let all = self.all_embeddings(adj, train)?;
        let user_all = all.narrow(0, 0, self.n_users)?;
        let item_all = all.narrow(0, self.n_users, self.n_items)?;

        let u = gather(&user_all, users, self.n_users, "user", &self.device)?;
        let pos = gather(&item_all, pos_items, self.n_items, "item", &self.device)?;
        let neg = if neg_items.is_empty() {
            None
        } else {
            Some(gather(&item_all, neg_items, self.n_items, "item", &self.device)?)
        };
        Ok((u, pos, neg))
    }

    /// The propagation loop: returns the `(N, output_dim)` concatenation
    /// of the ego embedding with every layer's normalized block.
    fn all_embeddings(&self, adj: &Tensor, train: bool) -> Result<Tensor> {
        let mut ego = Tensor::cat(&[&self.user_emb, &self.item_emb], 0)?;
        let mut blocks = vec![ego.clone()];

        for (k, layer) in self.layers.iter().enumerate() {
            // Normalized weighted sum of neighbor embeddings.
            let side = adj.matmul(&ego)?;
            let sum_msg = side.matmul(&layer.w_gc)?.broadcast_add(&layer.b_gc)?;
            // Bi-interaction: second-order ego-neighbor features.
            let bi = (&ego * &side)?
                .matmul(&layer.w_bi)?
                .broadcast_add(&layer.b_bi)?;
            ego = self.act.forward(&(sum_msg + bi)?)?;
            if train {
                ego = self.mess_dropout[k].forward(&ego, true)?;
            }
            // The accumulator gets the normalized copy; propagation
            // continues with the raw activations.
            blocks.push(l2_normalize_rows(&ego)?);
        }

        let refs: Vec<&Tensor> = blocks.iter().collect();
        Ok(Tensor::cat(&refs, 1)?)
    }
}

/// Row-wise L2 normalization. Zero rows pass through unchanged rather
/// than dividing by zero (isolated nodes, edges lost to dropout).
fn l2_normalize_rows(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?;
    let denom = norm.maximum(1e-12)?;
    Ok(x.broadcast_div(&denom)?)
}

/// Numerically stable `log σ(x) = min(x, 0) - ln(1 + e^{-|x|})`.
fn log_sigmoid(x: &Tensor) -> Result<Tensor> {
    let min_part = x.minimum(&x.zeros_like()?)?;
    let softplus = ((x.abs()?.neg()?.exp()? + 1.0)?).log()?;
    Ok((min_part - softplus)?)
}

/// Validate indices against `bound`, then gather the matching rows.
fn gather(
    table: &Tensor,
    ids: &[u32],
    bound: usize,
    kind: &'static str,
    device: &Device,
) -> Result<Tensor> {
    if let Some(&bad) = ids.iter().find(|&&id| id as usize >= bound) {
        return Err(Error::IndexOutOfRange {
            index: bad as usize,
            bound,
            kind,
        });
    }
    let ids = Tensor::new(ids, device)?;
    Ok(table.index_select(&ids, 0)?)
}
