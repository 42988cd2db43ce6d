//! Clause evaluation over one item's occurrences, and plan matching.

use crate::capability::UnitConverter;
use crate::context::Context;
use crate::filter::{Clause, ClauseValue, FilterPlan, Operator};
use crate::item::Occurrence;
use crate::ontology::{self, AttributeIndex};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Absolute tolerance for numeric `eq`
pub const NUMERIC_TOLERANCE: f64 = 1e-6;

/// Decides a single clause against one item's occurrences.
///
/// Matching is existential over the occurrences whose label matches the
/// clause attribute, except `neq`, which must hold for all of them.
#[derive(Clone)]
pub struct PredicateEvaluator {
    converter: Arc<dyn UnitConverter>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    index: Option<Arc<AttributeIndex>>,
}

impl PredicateEvaluator {
    /// Lexical evaluator: labels match when equal after trimming and lower-casing
    pub fn new(ctx: &Context) -> Self {
        Self {
            converter: Arc::clone(&ctx.converter),
            retry: ctx.retry_policy(),
            cancel: ctx.cancel.clone(),
            index: None,
        }
    }

    /// Also match labels that belong to the same attribute node
    #[must_use]
    pub fn with_ontology(mut self, index: Arc<AttributeIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub async fn evaluate(&self, occurrences: &[Occurrence], clause: &Clause) -> Result<bool> {
        let attr = ontology::normalize(&clause.attr);
        let candidates: Vec<&Occurrence> = occurrences
            .iter()
            .filter(|o| self.label_matches(&attr, &o.name))
            .collect();

        if candidates.is_empty() {
            return Ok(clause.op.absent_result());
        }

        let outcome = match (clause.op, &clause.value) {
            (Operator::Gte, ClauseValue::Scalar(s)) => match s.as_number() {
                Some(target) => self.any_number(&candidates, clause, |n| n >= target).await?,
                None => false,
            },
            (Operator::Lte, ClauseValue::Scalar(s)) => match s.as_number() {
                Some(target) => self.any_number(&candidates, clause, |n| n <= target).await?,
                None => false,
            },
            (Operator::Range, &ClauseValue::Range { low, high }) => {
                self.any_number(&candidates, clause, |n| low <= n && n <= high).await?
            }
            (Operator::Eq, ClauseValue::Scalar(s)) => {
                let numeric = candidates.iter().any(|o| o.number.is_some());
                match s.as_number() {
                    Some(target) if numeric => {
                        self.any_number(&candidates, clause, |n| (n - target).abs() < NUMERIC_TOLERANCE)
                            .await?
                    }
                    _ => {
                        let target = s.as_text().to_lowercase();
                        candidates.iter().any(|o| o.value.to_lowercase() == target)
                    }
                }
            }
            (Operator::Neq, ClauseValue::Scalar(s)) => {
                let target = s.as_text().to_lowercase();
                !candidates.iter().any(|o| o.value.to_lowercase() == target)
            }
            (Operator::Contains, ClauseValue::Scalar(s)) => {
                let needle = s.as_text().to_lowercase();
                candidates.iter().any(|o| o.value.to_lowercase().contains(&needle))
            }
            (Operator::In, ClauseValue::List(list)) => {
                let accepted: Vec<String> = list.iter().map(|s| s.as_text().to_lowercase()).collect();
                candidates
                    .iter()
                    .any(|o| accepted.contains(&o.value.to_lowercase()))
            }
            // Constructed clauses bypass validation; a mismatched operand never matches
            _ => false,
        };

        debug!(attr = %clause.attr, op = %clause.op, candidates = candidates.len(), outcome, "evaluated clause");
        Ok(outcome)
    }

    fn label_matches(&self, attr_key: &str, label: &str) -> bool {
        if ontology::normalize(label) == attr_key {
            return true;
        }
        match &self.index {
            Some(index) => index.same_attribute(attr_key, label),
            None => false,
        }
    }

    async fn any_number<P>(&self, candidates: &[&Occurrence], clause: &Clause, predicate: P) -> Result<bool>
    where
        P: Fn(f64) -> bool,
    {
        for occurrence in candidates {
            let Some(number) = occurrence.number else {
                continue;
            };
            let value = self
                .convert(number, occurrence.unit.as_deref(), clause.unit.as_deref())
                .await?;
            if predicate(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Convert `number` into `to`, or return it unchanged when no conversion
    /// applies or the converter fails. Only cancellation is an error.
    async fn convert(&self, number: f64, from: Option<&str>, to: Option<&str>) -> Result<f64> {
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(number);
        };
        if from.trim().to_lowercase() == to.trim().to_lowercase() {
            return Ok(number);
        }

        let converted = self
            .retry
            .call("convert_unit", &self.cancel, || {
                self.converter.convert(number, Some(from), Some(to))
            })
            .await;

        match converted {
            Ok(value) if value.is_finite() => Ok(value),
            Ok(value) => {
                warn!(number, from, to, value, "non-finite conversion result, comparing unconverted value");
                Ok(number)
            }
            Err(e @ Error::Cancelled { .. }) => Err(e),
            Err(e) => {
                warn!(number, from, to, error = %e, "unit conversion failed, comparing unconverted value");
                Ok(number)
            }
        }
    }
}

/// Boolean decision of a whole plan: every `must` clause holds and no
/// `must_not` clause does. `should` clauses do not participate.
#[derive(Clone)]
pub struct PlanMatcher {
    evaluator: PredicateEvaluator,
}

impl PlanMatcher {
    pub fn new(evaluator: PredicateEvaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &PredicateEvaluator {
        &self.evaluator
    }

    pub async fn matches(&self, occurrences: &[Occurrence], plan: &FilterPlan) -> Result<bool> {
        for clause in &plan.must {
            if !self.evaluator.evaluate(occurrences, clause).await? {
                return Ok(false);
            }
        }
        for clause in &plan.must_not {
            if self.evaluator.evaluate(occurrences, clause).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
