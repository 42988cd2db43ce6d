//! # ontomatch
//!
//! Consolidates free-text product characteristics into a canonical
//! attribute ontology and evaluates structured filter plans against items.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! ontomatch ingest items.jsonl
//! ontomatch compile-filter --id thick --name "Thick copper cable" "медный кабель от 2 мм2"
//! ontomatch classify --mode best
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use ontomatch::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> ontomatch::Result<()> {
//! let store = Arc::new(LmdbStore::open("data/ontomatch")?);
//! let ctx = Context::builder(Config::default(), store).build();
//! let engine = Engine::new(ctx);
//!
//! let plan = FilterPlan::new()
//!     .must(Clause::gte("сечение", 2.0).with_unit("мм2"))
//!     .must_not(Clause::eq("материал", "ПВХ"));
//! let report = engine.search(&plan).await?;
//! println!("{} items matched", report.stats.count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`ontomatch-core`](https://docs.rs/ontomatch-core) - Resolver, evaluator, classifier, ingestion, in-memory store
//! - [`ontomatch-storage`](https://docs.rs/ontomatch-storage) - LMDB persistence
//! - [`ontomatch-providers`](https://docs.rs/ontomatch-providers) - OpenAI-compatible capability client

pub use ontomatch_core::*;
pub use ontomatch_providers::{OpenAiClient, ProviderError};
pub use ontomatch_storage::LmdbStore;

/// Common imports
pub mod prelude {
    pub use ontomatch_core::{
        AttrNode, AttributeResolver, Classification, ClassifyMode, Clause, Config, Context, Decision,
        Engine, Error, FilterPlan, IngestReport, Item, ItemInput, MemoryStore, Occurrence, Operator,
        PlanMatcher, PredicateEvaluator, Resolution, Result, SavedFilter, SearchReport, Store,
    };
    pub use ontomatch_providers::OpenAiClient;
    pub use ontomatch_storage::LmdbStore;
}
