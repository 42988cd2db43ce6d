//! Deterministic capability fakes for tests and benches.

use crate::capability::{
    Arbiter, ArbitrationCandidate, Arbitration, CapabilityError, CapabilityResult, Embedder,
    ExtractedCharacteristic, Extractor, PlanCompiler, UnitConverter,
};
use crate::filter::FilterPlan;
use crate::units::StaticUnitConverter;
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Embeds labels by table lookup; unknown labels are an invalid response
#[derive(Default)]
pub struct TableEmbedder {
    table: AHashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
    latency: Option<Duration>,
}

impl TableEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, vector: Vec<f32>) -> Self {
        self.table.insert(label.to_string(), vector);
        self
    }

    /// Fail the next `n` calls with a retryable transport error
    pub fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every call, like a network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `embed` invocations so far, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(CapabilityError::Transport("connection reset".to_string()));
        }
        texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .ok_or_else(|| CapabilityError::InvalidResponse(format!("no embedding for {:?}", t)))
            })
            .collect()
    }
}

/// Returns queued verdicts in order (then "new node") and records what it
/// was shown
#[derive(Default)]
pub struct ScriptedArbiter {
    verdicts: Mutex<VecDeque<Arbitration>>,
    seen: Mutex<Vec<(String, Vec<ArbitrationCandidate>)>>,
}

impl ScriptedArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, verdict: Arbitration) -> Self {
        self.verdicts.lock().push_back(verdict);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<ArbitrationCandidate>)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Arbiter for ScriptedArbiter {
    async fn arbitrate(&self, candidate: &str, top_k: &[ArbitrationCandidate]) -> CapabilityResult<Arbitration> {
        self.seen.lock().push((candidate.to_string(), top_k.to_vec()));
        Ok(self.verdicts.lock().pop_front().unwrap_or_else(Arbitration::new_node))
    }
}

/// [`StaticUnitConverter`] that counts calls, or always fails
#[derive(Default)]
pub struct CountingConverter {
    inner: StaticUnitConverter,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitConverter for CountingConverter {
    async fn convert(&self, value: f64, from_unit: Option<&str>, to_unit: Option<&str>) -> CapabilityResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CapabilityError::InvalidResponse("ambiguous units".to_string()));
        }
        self.inner.convert(value, from_unit, to_unit).await
    }
}

/// Extraction keyed by item title
#[derive(Default)]
pub struct StaticExtractor {
    by_title: AHashMap<String, Vec<ExtractedCharacteristic>>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, title: &str, pairs: Vec<ExtractedCharacteristic>) -> Self {
        self.by_title.insert(title.to_string(), pairs);
        self
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    async fn extract(&self, title: &str, _description: &str) -> CapabilityResult<Vec<ExtractedCharacteristic>> {
        Ok(self.by_title.get(title).cloned().unwrap_or_default())
    }
}

/// Plan compilation keyed by query text; unknown queries give an empty plan
#[derive(Default)]
pub struct StaticCompiler {
    by_query: AHashMap<String, FilterPlan>,
}

impl StaticCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, plan: FilterPlan) -> Self {
        self.by_query.insert(query.to_string(), plan);
        self
    }
}

#[async_trait]
impl PlanCompiler for StaticCompiler {
    async fn compile(&self, query: &str) -> CapabilityResult<FilterPlan> {
        Ok(self.by_query.get(query).cloned().unwrap_or_default())
    }
}

/// Shorthand for an extracted tuple
pub fn pair(name: &str, value: serde_json::Value, unit: Option<&str>, number: Option<f64>) -> ExtractedCharacteristic {
    ExtractedCharacteristic {
        name: Some(name.to_string()),
        value: Some(value),
        unit: unit.map(str::to_string),
        number,
    }
}
