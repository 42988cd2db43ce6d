//! Item ingestion: extract characteristics, resolve their labels into the
//! ontology, and append occurrences.

use crate::capability::{ExtractedCharacteristic, Extractor};
use crate::context::Context;
use crate::graph::AttrId;
use crate::item::{Item, ItemId, Occurrence};
use crate::resolver::AttributeResolver;
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// One input record, as read from a JSON line
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemInput {
    #[serde(default, alias = "item_id")]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl ItemInput {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            description: description.into(),
        }
    }

    fn into_item(self) -> Item {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        Item::new(id, self.title, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFailure {
    pub label: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub item_id: ItemId,
    pub occurrences: usize,
    /// Extracted tuples without a usable name or value
    pub skipped: usize,
    /// Distinct labels and the node each resolved to
    pub resolved: Vec<(String, AttrId)>,
    /// Labels whose resolution failed; their occurrences are still stored
    pub failures: Vec<LabelFailure>,
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    extractor: Arc<dyn Extractor>,
    resolver: Arc<AttributeResolver>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(ctx: &Context, resolver: Arc<AttributeResolver>) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            extractor: Arc::clone(&ctx.extractor),
            resolver,
            retry: ctx.retry_policy(),
            cancel: ctx.cancel.clone(),
        }
    }

    pub async fn ingest(&self, input: ItemInput) -> Result<IngestReport> {
        let item = input.into_item();
        self.store.upsert_item(item.clone())?;

        let extracted = self
            .retry
            .call("extract", &self.cancel, || {
                self.extractor.extract(&item.title, &item.description)
            })
            .await?;

        let context = item.context();
        let mut report = IngestReport {
            item_id: item.id.clone(),
            ..IngestReport::default()
        };

        let mut occurrences = Vec::with_capacity(extracted.len());
        for characteristic in &extracted {
            match to_occurrence(characteristic, &item.id, &context) {
                Some(occ) => occurrences.push(occ),
                None => {
                    warn!(item = %item.id, name = ?characteristic.name, "skipping characteristic without name or value");
                    report.skipped += 1;
                }
            }
        }

        let mut labels: Vec<&str> = Vec::new();
        for occ in &occurrences {
            if !labels.contains(&occ.name.as_str()) {
                labels.push(&occ.name);
            }
        }

        for label in labels {
            match self.resolver.resolve(label).await {
                Ok(resolution) => report.resolved.push((label.to_string(), resolution.id)),
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) if e.is_capability_failure() => {
                    warn!(item = %item.id, label, error = %e, "label resolution failed");
                    report.failures.push(LabelFailure {
                        label: label.to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        report.occurrences = occurrences.len();
        self.store.add_occurrences(occurrences)?;
        info!(
            item = %report.item_id,
            occurrences = report.occurrences,
            skipped = report.skipped,
            failures = report.failures.len(),
            "ingested item"
        );
        Ok(report)
    }

    /// Ingest sequentially; one item's failure does not stop the rest
    pub async fn ingest_batch(&self, inputs: Vec<ItemInput>) -> Vec<Result<IngestReport>> {
        let mut reports = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = self.ingest(input).await;
            if let Err(e) = &result {
                warn!(error = %e, "item ingestion failed");
            }
            reports.push(result);
        }
        reports
    }
}

/// Turn an extracted tuple into an occurrence; `None` when it has no usable
/// name or value
fn to_occurrence(ch: &ExtractedCharacteristic, item_id: &str, context: &str) -> Option<Occurrence> {
    let name = ch.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
    let number = ch.number.filter(|n| n.is_finite());
    let value = match &ch.value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) | None => number?.to_string(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => return None,
    };
    let unit = ch.unit.as_deref().map(str::trim).filter(|u| !u.is_empty());

    let mut occurrence = Occurrence::new(item_id, name, value).with_context(context);
    occurrence.unit = unit.map(str::to_string);
    occurrence.number = number;
    Some(occurrence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::testing::{pair, ScriptedArbiter, StaticExtractor, TableEmbedder};
    use serde_json::json;

    fn ingestor(store: Arc<MemoryStore>, embedder: TableEmbedder, extractor: StaticExtractor) -> Ingestor {
        let mut config = Config::default();
        config.capabilities.max_attempts = 1;
        let ctx = Context::builder(config, store)
            .embedder(Arc::new(embedder))
            .arbiter(Arc::new(ScriptedArbiter::new()))
            .extractor(Arc::new(extractor))
            .build();
        let resolver = Arc::new(AttributeResolver::new(&ctx));
        Ingestor::new(&ctx, resolver)
    }

    #[tokio::test]
    async fn test_ingest_stores_occurrences_and_nodes() {
        let store = Arc::new(MemoryStore::new());
        let extractor = StaticExtractor::new().with(
            "Кабель ВВГ 3x2.5",
            vec![
                pair("сечение", json!("2.5"), Some("мм²"), Some(2.5)),
                pair("сечение", json!("1.5"), Some("мм²"), Some(1.5)),
                pair("материал", json!("медь"), None, None),
                pair("", json!("x"), None, None),
                pair("цвет", json!(null), None, None),
            ],
        );
        let embedder = TableEmbedder::new()
            .with("сечение", vec![1.0, 0.0])
            .with("материал", vec![0.0, 1.0]);
        let ingestor = ingestor(store.clone(), embedder, extractor);

        let report = ingestor
            .ingest(ItemInput::new("sku-1", "Кабель ВВГ 3x2.5", "медный"))
            .await
            .unwrap();

        assert_eq!(report.occurrences, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.resolved.len(), 2);
        assert!(report.failures.is_empty());

        let occ = store.occurrences("sku-1").unwrap();
        assert_eq!(occ[0].unit.as_deref(), Some("мм²"));
        assert_eq!(occ[0].number, Some(2.5));
        assert_eq!(occ[0].context, "Кабель ВВГ 3x2.5 медный");
        assert_eq!(occ[2].value, "медь");
        assert_eq!(store.attr_nodes().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_reported_per_label() {
        let store = Arc::new(MemoryStore::new());
        let extractor = StaticExtractor::new().with(
            "t",
            vec![
                pair("known", json!(1), None, Some(1.0)),
                pair("unknown", json!("x"), None, None),
            ],
        );
        let embedder = TableEmbedder::new().with("known", vec![1.0]);
        let ingestor = ingestor(store.clone(), embedder, extractor);

        let report = ingestor.ingest(ItemInput::new("i", "t", "")).await.unwrap();

        assert_eq!(report.resolved, vec![("known".to_string(), 1)]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "unknown");
        assert_eq!(store.occurrences("i").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), TableEmbedder::new(), StaticExtractor::new());

        let input: ItemInput = serde_json::from_str(r#"{"title": "Кабель"}"#).unwrap();
        let report = ingestor.ingest(input).await.unwrap();

        assert_eq!(report.item_id.len(), 32);
        assert!(store.item(&report.item_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.capabilities.max_attempts = 1;
        // No extractor configured: every extraction fails
        let ctx = Context::builder(config, store.clone()).build();
        let ingestor = Ingestor::new(&ctx, Arc::new(AttributeResolver::new(&ctx)));

        let results = ingestor
            .ingest_batch(vec![ItemInput::new("a", "A", ""), ItemInput::new("b", "B", "")])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(store.items().unwrap().len(), 2);
    }

    #[test]
    fn test_numeric_value_without_text() {
        let ch = ExtractedCharacteristic {
            name: Some(" вес ".to_string()),
            value: None,
            unit: Some(" ".to_string()),
            number: Some(12.0),
        };
        let occ = to_occurrence(&ch, "i", "ctx").unwrap();
        assert_eq!(occ.name, "вес");
        assert_eq!(occ.value, "12");
        assert_eq!(occ.unit, None);
    }
}
