//! Online attribute clustering.
//!
//! Every raw label is embedded once and compared against all centroids.
//! At or above the similarity threshold the label merges into the nearest
//! node; below it the arbiter decides between the top-K nodes and a new node.

use crate::capability::{Arbiter, ArbitrationCandidate, Embedder};
use crate::config::ResolverConfig;
use crate::context::Context;
use crate::graph::{AttrId, AttrNode, Relation};
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::vector::Vector;
use crate::{Error, Result};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a label was resolved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The graph was empty
    Created,
    /// Nearest node was at or above the threshold
    Merged { similarity: f32 },
    /// Arbiter picked one of the top-K nodes
    Arbitrated { similarity: f32, relation: Relation },
    /// Arbiter asked for a new node; `similarity` is the best one seen
    CreatedAfterArbitration { similarity: f32 },
}

impl Decision {
    pub fn created_node(&self) -> bool {
        matches!(self, Decision::Created | Decision::CreatedAfterArbitration { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: AttrId,
    #[serde(flatten)]
    pub decision: Decision,
}

pub struct AttributeResolver {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    arbiter: Arc<dyn Arbiter>,
    config: ResolverConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
    // Shared with every resolver built from the same context
    lock: Arc<Mutex<()>>,
}

impl AttributeResolver {
    pub fn new(ctx: &Context) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            embedder: Arc::clone(&ctx.embedder),
            arbiter: Arc::clone(&ctx.arbiter),
            config: ctx.config.resolver.clone(),
            retry: ctx.retry_policy(),
            cancel: ctx.cancel.clone(),
            lock: Arc::clone(&ctx.resolve_lock),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Map `label` to an attribute node, creating or updating it
    pub async fn resolve(&self, label: &str) -> Result<Resolution> {
        let _guard = self.lock.lock().await;

        let nodes = self.store.attr_nodes()?;
        let query = self.embed(label).await?;

        if nodes.is_empty() {
            let id = self.store.create_attr_node(label, query)?;
            info!(label, id, "created first attribute node");
            return Ok(Resolution {
                id,
                decision: Decision::Created,
            });
        }

        let similarities = similarities(&query, &nodes)?;
        let best = argmax(&similarities);
        let best_similarity = similarities[best];

        if best_similarity >= self.config.similarity_threshold {
            let id = self.merge(&nodes[best], &query, label)?;
            debug!(label, id, similarity = best_similarity, "merged into nearest node");
            return Ok(Resolution {
                id,
                decision: Decision::Merged {
                    similarity: best_similarity,
                },
            });
        }

        let shortlist = top_k(&similarities, self.config.top_k);
        let candidates: Vec<ArbitrationCandidate> = shortlist
            .iter()
            .map(|&i| ArbitrationCandidate {
                label: nodes[i].label.clone(),
                examples: nodes[i].examples.clone(),
            })
            .collect();

        let verdict = self
            .retry
            .call("arbitrate", &self.cancel, || {
                self.arbiter.arbitrate(label, &candidates)
            })
            .await?;

        let picked = usize::try_from(verdict.best_index)
            .ok()
            .and_then(|i| shortlist.get(i).copied());

        match picked {
            Some(i) => {
                let similarity = similarities[i];
                let id = self.merge(&nodes[i], &query, label)?;
                info!(label, id, similarity, relation = %verdict.relation, "arbiter merged label");
                Ok(Resolution {
                    id,
                    decision: Decision::Arbitrated {
                        similarity,
                        relation: verdict.relation,
                    },
                })
            }
            None => {
                if verdict.best_index != -1 {
                    warn!(
                        label,
                        index = verdict.best_index,
                        candidates = shortlist.len(),
                        "arbiter index out of range, creating new node"
                    );
                }
                let id = self.store.create_attr_node(label, query)?;
                info!(label, id, similarity = best_similarity, "created attribute node");
                Ok(Resolution {
                    id,
                    decision: Decision::CreatedAfterArbitration {
                        similarity: best_similarity,
                    },
                })
            }
        }
    }

    async fn embed(&self, label: &str) -> Result<Vector> {
        let texts = [label.to_string()];
        let mut vectors = self
            .retry
            .call("embed", &self.cancel, || self.embedder.embed(&texts))
            .await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() && !v.is_empty() => Ok(Vector::new(v)),
            _ => Err(Error::Capability {
                capability: "embed",
                message: format!("expected one non-empty embedding for {:?}", label),
            }),
        }
    }

    fn merge(&self, node: &AttrNode, query: &Vector, label: &str) -> Result<AttrId> {
        let centroid = node.centroid.midpoint(query);
        self.store.update_attr_node(node.id, centroid, label)?;
        Ok(node.id)
    }
}

fn similarities(query: &Vector, nodes: &[AttrNode]) -> Result<Vec<f32>> {
    if let Some(node) = nodes.iter().find(|n| n.centroid.dim() != query.dim()) {
        return Err(Error::DimensionMismatch {
            expected: node.centroid.dim(),
            actual: query.dim(),
        });
    }
    Ok(nodes
        .par_iter()
        .map(|n| n.centroid.cosine_similarity(query))
        .collect())
}

/// Index of the highest similarity; the earliest node wins ties
fn argmax(similarities: &[f32]) -> usize {
    let mut best = 0;
    for (i, &s) in similarities.iter().enumerate().skip(1) {
        if s > similarities[best] {
            best = i;
        }
    }
    best
}

/// Up to `k` node indices by descending similarity, ascending index on ties
fn top_k(similarities: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..similarities.len()).collect();
    order.sort_by(|&a, &b| {
        OrderedFloat(similarities[b])
            .cmp(&OrderedFloat(similarities[a]))
            .then(a.cmp(&b))
    });
    order.truncate(k);
    order
}
