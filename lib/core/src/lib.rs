//! # ontomatch Core
//!
//! Attribute ontology and filter evaluation over extracted product
//! characteristics.
//!
//! - [`AttributeResolver`] - Online clustering of raw labels into [`AttrNode`]s
//! - [`PredicateEvaluator`] / [`PlanMatcher`] - Clause and plan decisions
//! - [`Classifier`] - ALL_MATCHING and SINGLE_BEST classification, plan search
//! - [`Ingestor`] - Extraction, resolution and occurrence storage
//! - [`Store`] - Repository interface, with [`MemoryStore`]
//!
//! External models are reached only through the traits in [`capability`],
//! wired together with a [`Context`].
//!
//! ## Example
//!
//! ```rust
//! use ontomatch_core::{Clause, Config, Context, FilterPlan, MemoryStore, Occurrence, PlanMatcher, PredicateEvaluator};
//! use std::sync::Arc;
//!
//! let ctx = Context::builder(Config::default(), Arc::new(MemoryStore::new())).build();
//! let matcher = PlanMatcher::new(PredicateEvaluator::new(&ctx));
//!
//! let occurrences = vec![Occurrence::new("sku-1", "сечение", "2.5").with_number(2.5, Some("мм2"))];
//! let plan = FilterPlan::new().must(Clause::gte("сечение", 2.0).with_unit("мм2"));
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! assert!(rt.block_on(matcher.matches(&occurrences, &plan)).unwrap());
//! ```

pub mod capability;
pub mod classifier;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod filter;
pub mod graph;
pub mod ingest;
pub mod item;
pub mod ontology;
pub mod resolver;
pub mod retry;
pub mod search;
pub mod store;
pub mod units;
pub mod vector;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use capability::{
    Arbiter, Arbitration, ArbitrationCandidate, CapabilityError, CapabilityResult, Embedder,
    ExtractedCharacteristic, Extractor, PlanCompiler, UnitConverter,
};
pub use classifier::{Assignment, Classification, Classifier, ClassifyMode, ItemClassification};
pub use config::{AttributeMatch, Config};
pub use context::{Context, ContextBuilder};
pub use engine::{Engine, LabelOutcome};
pub use error::{Error, Result};
pub use evaluate::{PlanMatcher, PredicateEvaluator, NUMERIC_TOLERANCE};
pub use filter::{Clause, ClauseValue, FilterId, FilterPlan, Operator, SavedFilter, Scalar};
pub use graph::{AttrId, AttrNode, Edge, EdgeId, Relation};
pub use ingest::{IngestReport, Ingestor, ItemInput, LabelFailure};
pub use item::{Item, ItemId, Occurrence};
pub use ontology::AttributeIndex;
pub use resolver::{AttributeResolver, Decision, Resolution};
pub use retry::RetryPolicy;
pub use search::{NumericSummary, SearchReport, SearchStats};
pub use store::{MemoryStore, Store};
pub use units::StaticUnitConverter;
pub use vector::Vector;
