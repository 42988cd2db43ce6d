use crate::classifier::{Classifier, ClassifyMode, ItemClassification};
use crate::context::Context;
use crate::filter::{FilterPlan, SavedFilter};
use crate::ingest::{IngestReport, Ingestor, ItemInput, LabelFailure};
use crate::resolver::{AttributeResolver, Resolution};
use crate::search::SearchReport;
use crate::store::Store;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of resolving one label in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LabelOutcome {
    Resolved { label: String, resolution: Resolution },
    Failed(LabelFailure),
}

/// All operations over one store, sharing a single resolver
pub struct Engine {
    ctx: Context,
    resolver: Arc<AttributeResolver>,
    ingestor: Ingestor,
    classifier: Classifier,
}

impl Engine {
    pub fn new(ctx: Context) -> Self {
        let resolver = Arc::new(AttributeResolver::new(&ctx));
        let ingestor = Ingestor::new(&ctx, Arc::clone(&resolver));
        let classifier = Classifier::new(&ctx);
        Self {
            ctx,
            resolver,
            ingestor,
            classifier,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.ctx.store
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn resolve(&self, label: &str) -> Result<Resolution> {
        self.resolver.resolve(label).await
    }

    /// Resolve labels in order. A capability failure is recorded for its
    /// label and the rest continue; cancellation and store errors abort.
    pub async fn resolve_labels(&self, labels: &[String]) -> Result<Vec<LabelOutcome>> {
        let mut outcomes = Vec::with_capacity(labels.len());
        for label in labels {
            match self.resolver.resolve(label).await {
                Ok(resolution) => outcomes.push(LabelOutcome::Resolved {
                    label: label.clone(),
                    resolution,
                }),
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) if e.is_capability_failure() => {
                    warn!(label = %label, error = %e, "label resolution failed");
                    outcomes.push(LabelOutcome::Failed(LabelFailure {
                        label: label.clone(),
                        error: e.to_string(),
                    }));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    pub async fn ingest(&self, input: ItemInput) -> Result<IngestReport> {
        self.ingestor.ingest(input).await
    }

    pub async fn ingest_batch(&self, inputs: Vec<ItemInput>) -> Vec<Result<IngestReport>> {
        self.ingestor.ingest_batch(inputs).await
    }

    /// Compile a natural-language query into a plan and save it
    pub async fn compile_filter(&self, id: &str, name: &str, query: &str) -> Result<SavedFilter> {
        let compiler = Arc::clone(&self.ctx.compiler);
        let plan = self
            .ctx
            .retry_policy()
            .call("compile_plan", &self.ctx.cancel, || compiler.compile(query))
            .await?;
        if plan.is_empty() {
            info!(id, query, "compiled plan has no clauses");
        }
        self.save_filter(id, name, plan)
    }

    pub fn save_filter(&self, id: &str, name: &str, plan: FilterPlan) -> Result<SavedFilter> {
        if id.trim().is_empty() {
            return Err(Error::InvalidPlan("filter id must not be empty".to_string()));
        }
        let filter = SavedFilter::new(id, name, plan);
        self.ctx.store.save_filter(filter.clone())?;
        info!(id, clauses = filter.plan.must.len() + filter.plan.must_not.len(), "saved filter");
        Ok(filter)
    }

    pub async fn search(&self, plan: &FilterPlan) -> Result<SearchReport> {
        self.classifier.search(plan).await
    }

    pub async fn classify(&self, mode: ClassifyMode) -> Result<Vec<ItemClassification>> {
        self.classifier.classify(mode).await
    }

    pub async fn classify_item(&self, item_id: &str, mode: ClassifyMode) -> Result<ItemClassification> {
        self.classifier.classify_item(item_id, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::filter::Clause;
    use crate::store::MemoryStore;
    use crate::resolver::Decision;
    use crate::testing::{ScriptedArbiter, StaticCompiler, TableEmbedder};

    #[tokio::test]
    async fn test_resolve_labels_continues_past_failures() {
        let embedder = TableEmbedder::new()
            .with("сечение", vec![1.0, 0.0])
            .with("цвет", vec![0.0, 1.0]);
        let mut config = Config::default();
        config.capabilities.max_attempts = 1;
        let ctx = Context::builder(config, Arc::new(MemoryStore::new()))
            .embedder(Arc::new(embedder))
            .arbiter(Arc::new(ScriptedArbiter::new()))
            .build();
        let engine = Engine::new(ctx);

        let labels: Vec<String> = ["сечение", "неизвестно", "цвет"].iter().map(|s| s.to_string()).collect();
        let outcomes = engine.resolve_labels(&labels).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            &outcomes[0],
            LabelOutcome::Resolved { resolution, .. } if resolution.decision == Decision::Created
        ));
        assert!(matches!(&outcomes[1], LabelOutcome::Failed(f) if f.label == "неизвестно"));
        assert!(matches!(&outcomes[2], LabelOutcome::Resolved { label, .. } if label == "цвет"));
        assert_eq!(engine.store().attr_nodes().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_compile_filter_saves_plan() {
        let plan = FilterPlan::new().must(Clause::gte("сечение", 2.0).with_unit("мм2"));
        let compiler = StaticCompiler::new().with("кабели от 2 мм2", plan.clone());
        let ctx = Context::builder(Config::default(), Arc::new(MemoryStore::new()))
            .compiler(Arc::new(compiler))
            .build();
        let engine = Engine::new(ctx);

        let saved = engine.compile_filter("thick", "Толстые кабели", "кабели от 2 мм2").await.unwrap();
        assert_eq!(saved.plan, plan);
        assert_eq!(engine.store().filter("thick").unwrap().unwrap().name, "Толстые кабели");
    }

    #[tokio::test]
    async fn test_empty_filter_id_rejected() {
        let engine = Engine::new(Context::builder(Config::default(), Arc::new(MemoryStore::new())).build());
        assert!(engine.save_filter(" ", "x", FilterPlan::new()).is_err());
    }
}
