//! Item classification against saved filters.
//!
//! [`ClassifyMode::AllMatching`] assigns every filter whose plan matches.
//! [`ClassifyMode::SingleBest`] assigns the single highest-scoring filter;
//! scores are currently 1.0 (match) or 0.0, ties go to the filter stored
//! first.

use crate::config::AttributeMatch;
use crate::context::Context;
use crate::evaluate::{PlanMatcher, PredicateEvaluator};
use crate::filter::{FilterId, FilterPlan, SavedFilter};
use crate::item::{Item, ItemId, Occurrence};
use crate::ontology::AttributeIndex;
use crate::search::{SearchReport, SearchStats};
use crate::store::Store;
use crate::{Error, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMode {
    AllMatching,
    SingleBest,
}

impl FromStr for ClassifyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" | "all_matching" => Ok(ClassifyMode::AllMatching),
            "best" | "single_best" => Ok(ClassifyMode::SingleBest),
            other => Err(Error::InvalidConfig(format!("unknown classify mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub filter_id: FilterId,
    pub score: f64,
}

impl Assignment {
    /// A score of zero means no filter matched
    pub fn is_match(&self) -> bool {
        self.score > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Classification {
    AllMatching { filters: Vec<FilterId> },
    SingleBest { assignment: Option<Assignment> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemClassification {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub classification: Classification,
}

impl PlanMatcher {
    /// Ids of every filter whose plan matches, in filter order
    pub async fn all_matching(&self, occurrences: &[Occurrence], filters: &[SavedFilter]) -> Result<Vec<FilterId>> {
        let mut matched = Vec::new();
        for filter in filters {
            if self.matches(occurrences, &filter.plan).await? {
                matched.push(filter.id.clone());
            }
        }
        Ok(matched)
    }

    /// Highest-scoring filter; the first one wins ties. `None` only when
    /// there are no filters.
    pub async fn single_best(&self, occurrences: &[Occurrence], filters: &[SavedFilter]) -> Result<Option<Assignment>> {
        let mut best: Option<Assignment> = None;
        let mut best_score = -1.0;
        for filter in filters {
            let score = if self.matches(occurrences, &filter.plan).await? {
                1.0
            } else {
                0.0
            };
            if score > best_score {
                best_score = score;
                best = Some(Assignment {
                    filter_id: filter.id.clone(),
                    score,
                });
            }
        }
        Ok(best)
    }
}

/// Store-driven classification and search
pub struct Classifier {
    store: Arc<dyn Store>,
    evaluator: PredicateEvaluator,
    attribute_match: AttributeMatch,
    concurrency: usize,
}

impl Classifier {
    pub fn new(ctx: &Context) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            evaluator: PredicateEvaluator::new(ctx),
            attribute_match: ctx.config.matching.attribute_match,
            concurrency: ctx.config.classifier.concurrency.max(1),
        }
    }

    /// Matcher over a fresh ontology snapshot when ontology matching is on
    pub fn matcher(&self) -> Result<PlanMatcher> {
        let evaluator = match self.attribute_match {
            AttributeMatch::Lexical => self.evaluator.clone(),
            AttributeMatch::Ontology => {
                let index = AttributeIndex::load(self.store.as_ref())?;
                self.evaluator.clone().with_ontology(Arc::new(index))
            }
        };
        Ok(PlanMatcher::new(evaluator))
    }

    /// Classify every stored item against every saved filter
    pub async fn classify(&self, mode: ClassifyMode) -> Result<Vec<ItemClassification>> {
        let filters = self.store.filters()?;
        let items = self.store.items()?;
        let matcher = self.matcher()?;
        info!(items = items.len(), filters = filters.len(), ?mode, "classifying items");

        stream::iter(items)
            .map(|item| self.classify_with(&matcher, item.id, &filters, mode))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    pub async fn classify_item(&self, item_id: &str, mode: ClassifyMode) -> Result<ItemClassification> {
        if self.store.item(item_id)?.is_none() {
            return Err(Error::NotFound(format!("item {}", item_id)));
        }
        let filters = self.store.filters()?;
        let matcher = self.matcher()?;
        self.classify_with(&matcher, item_id.to_string(), &filters, mode).await
    }

    async fn classify_with(
        &self,
        matcher: &PlanMatcher,
        item_id: ItemId,
        filters: &[SavedFilter],
        mode: ClassifyMode,
    ) -> Result<ItemClassification> {
        let occurrences = self.store.occurrences(&item_id)?;
        let classification = match mode {
            ClassifyMode::AllMatching => Classification::AllMatching {
                filters: matcher.all_matching(&occurrences, filters).await?,
            },
            ClassifyMode::SingleBest => Classification::SingleBest {
                assignment: matcher.single_best(&occurrences, filters).await?,
            },
        };
        debug!(item = %item_id, ?classification, "classified item");
        Ok(ItemClassification {
            item_id,
            classification,
        })
    }

    /// Every stored item whose occurrences match `plan`
    pub async fn search(&self, plan: &FilterPlan) -> Result<SearchReport> {
        let items = self.store.items()?;
        let matcher = self.matcher()?;

        let evaluated: Vec<Option<(Item, Vec<Occurrence>)>> = stream::iter(items)
            .map(|item| {
                let matcher = &matcher;
                async move {
                    let occurrences = self.store.occurrences(&item.id)?;
                    let hit = matcher.matches(&occurrences, plan).await?;
                    Ok::<_, Error>(hit.then_some((item, occurrences)))
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let matched: Vec<(Item, Vec<Occurrence>)> = evaluated.into_iter().flatten().collect();
        let stats = SearchStats::collect(matched.len(), matched.iter().flat_map(|(_, occ)| occ.iter()));
        info!(matched = matched.len(), "search finished");

        Ok(SearchReport {
            items: matched.into_iter().map(|(item, _)| item.id).collect(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::filter::Clause;
    use crate::store::MemoryStore;
    use crate::vector::Vector;

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.upsert_item(Item::new("thin", "Кабель 1.5", "")).unwrap();
        store.upsert_item(Item::new("thick", "Кабель 4", "")).unwrap();
        store
            .add_occurrences(vec![
                Occurrence::new("thin", "сечение", "1.5").with_number(1.5, Some("мм2")),
                Occurrence::new("thick", "сечение", "4").with_number(4.0, Some("мм2")),
                Occurrence::new("thick", "материал", "медь"),
            ])
            .unwrap();
        store
    }

    fn classifier(store: Arc<MemoryStore>, config: Config) -> Classifier {
        Classifier::new(&Context::builder(config, store).build())
    }

    fn save(store: &MemoryStore, id: &str, plan: FilterPlan) {
        store.save_filter(SavedFilter::new(id, id, plan)).unwrap();
    }

    #[tokio::test]
    async fn test_all_matching() {
        let store = seeded_store();
        save(&store, "big", FilterPlan::new().must(Clause::gte("сечение", 2.0)));
        save(&store, "any", FilterPlan::new().must(Clause::gte("сечение", 1.0)));
        save(&store, "alu", FilterPlan::new().must(Clause::eq("материал", "алюминий")));

        let result = classifier(store, Config::default())
            .classify(ClassifyMode::AllMatching)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].item_id, "thin");
        assert_eq!(
            result[0].classification,
            Classification::AllMatching {
                filters: vec!["any".to_string()]
            }
        );
        assert_eq!(
            result[1].classification,
            Classification::AllMatching {
                filters: vec!["big".to_string(), "any".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_single_best_first_filter_wins_ties() {
        let store = seeded_store();
        save(&store, "alu", FilterPlan::new().must(Clause::eq("материал", "алюминий")));
        save(&store, "big", FilterPlan::new().must(Clause::gte("сечение", 2.0)));
        save(&store, "any", FilterPlan::new().must(Clause::gte("сечение", 1.0)));

        let c = classifier(store, Config::default());
        let thick = c.classify_item("thick", ClassifyMode::SingleBest).await.unwrap();
        assert_eq!(
            thick.classification,
            Classification::SingleBest {
                assignment: Some(Assignment {
                    filter_id: "big".to_string(),
                    score: 1.0
                })
            }
        );

        let thin = c.classify_item("thin", ClassifyMode::SingleBest).await.unwrap();
        let Classification::SingleBest { assignment: Some(a) } = thin.classification else {
            panic!("expected an assignment");
        };
        assert_eq!(a.filter_id, "any");
    }

    #[tokio::test]
    async fn test_single_best_without_match_reports_zero_score() {
        let store = seeded_store();
        save(&store, "alu", FilterPlan::new().must(Clause::eq("материал", "алюминий")));
        save(&store, "steel", FilterPlan::new().must(Clause::eq("материал", "сталь")));

        let c = classifier(store, Config::default());
        let r = c.classify_item("thin", ClassifyMode::SingleBest).await.unwrap();
        let Classification::SingleBest { assignment: Some(a) } = r.classification else {
            panic!("expected an assignment");
        };
        assert_eq!(a.filter_id, "alu");
        assert!(!a.is_match());
    }

    #[tokio::test]
    async fn test_single_best_without_filters() {
        let c = classifier(seeded_store(), Config::default());
        let r = c.classify_item("thin", ClassifyMode::SingleBest).await.unwrap();
        assert_eq!(r.classification, Classification::SingleBest { assignment: None });
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let c = classifier(seeded_store(), Config::default());
        let err = c.classify_item("missing", ClassifyMode::AllMatching).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_reports_stats() {
        let c = classifier(seeded_store(), Config::default());
        let report = c
            .search(&FilterPlan::new().must(Clause::gte("сечение", 1.0)))
            .await
            .unwrap();

        assert_eq!(report.items, vec!["thin".to_string(), "thick".to_string()]);
        assert_eq!(report.stats.count, 2);
        let s = report.stats.numeric["сечение"];
        assert_eq!((s.min, s.max, s.avg), (1.5, 4.0, 2.75));
    }

    #[tokio::test]
    async fn test_ontology_mode_uses_node_examples() {
        let store = seeded_store();
        let id = store.create_attr_node("площадь сечения", Vector::new(vec![1.0])).unwrap();
        store.update_attr_node(id, Vector::new(vec![1.0]), "сечение").unwrap();
        let plan = FilterPlan::new().must(Clause::gte("площадь сечения", 2.0));

        let lexical = classifier(store.clone(), Config::default());
        assert!(lexical.search(&plan).await.unwrap().items.is_empty());

        let mut config = Config::default();
        config.matching.attribute_match = AttributeMatch::Ontology;
        let ontology = classifier(store, config);
        assert_eq!(ontology.search(&plan).await.unwrap().items, vec!["thick".to_string()]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("all".parse::<ClassifyMode>().unwrap(), ClassifyMode::AllMatching);
        assert_eq!("single-best".parse::<ClassifyMode>().unwrap(), ClassifyMode::SingleBest);
        assert!("weighted".parse::<ClassifyMode>().is_err());
    }
}
