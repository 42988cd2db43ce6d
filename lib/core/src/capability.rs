//! Contracts for the external capabilities the core consumes.
//!
//! Implementations live outside the core (see `ontomatch-providers`); the
//! core only calls them through [`crate::retry::RetryPolicy`], which applies
//! timeouts, bounded retries and cancellation.

use crate::filter::FilterPlan;
use crate::graph::Relation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a capability implementation
#[derive(Error, Debug, Clone)]
pub enum CapabilityError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CapabilityError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            CapabilityError::Transport(_) | CapabilityError::Timeout | CapabilityError::RateLimited => true,
            CapabilityError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504 | 529),
            CapabilityError::InvalidResponse(_) => false,
        }
    }
}

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Text embedding
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text; the output has one vector per input, all of the
    /// same dimensionality.
    async fn embed(&self, texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>>;
}

/// What the arbiter sees for each top-K node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbitrationCandidate {
    pub label: String,
    pub examples: Vec<String>,
}

/// Arbiter verdict: an index into the candidate list, or -1 for "new node"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arbitration {
    pub best_index: i64,
    #[serde(default)]
    pub relation: Relation,
}

impl Arbitration {
    pub fn new_node() -> Self {
        Self {
            best_index: -1,
            relation: Relation::None,
        }
    }

    pub fn pick(index: usize, relation: Relation) -> Self {
        Self {
            best_index: index as i64,
            relation,
        }
    }
}

/// Merge-or-create judge consulted below the similarity threshold
#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn arbitrate(
        &self,
        candidate: &str,
        top_k: &[ArbitrationCandidate],
    ) -> CapabilityResult<Arbitration>;
}

/// Numeric unit conversion.
///
/// Returns the value unchanged when the units are equal, absent, or the
/// conversion cannot be resolved.
#[async_trait]
pub trait UnitConverter: Send + Sync {
    async fn convert(
        &self,
        value: f64,
        from_unit: Option<&str>,
        to_unit: Option<&str>,
    ) -> CapabilityResult<f64>;
}

/// One extracted characteristic tuple, exactly as the extractor produced it.
/// Any field may be missing; ingestion skips unusable tuples.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedCharacteristic {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "number_or_numeric_string")]
    pub number: Option<f64>,
}

/// Accepts `2.5`, `"2.5"` and `" 2,5 "`; a blank string or null is absent.
fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .replace(',', ".")
                .parse::<f64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("number is not numeric: {:?}", s)))
        }
        Some(other) => Err(D::Error::custom(format!("number has unexpected type: {}", other))),
    }
}

/// Characteristic extraction from an item's title and description
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, title: &str, description: &str) -> CapabilityResult<Vec<ExtractedCharacteristic>>;
}

/// Natural-language query to filter plan
#[async_trait]
pub trait PlanCompiler: Send + Sync {
    async fn compile(&self, query: &str) -> CapabilityResult<FilterPlan>;
}
