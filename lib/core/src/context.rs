//! The explicit context every component is built from: configuration, the
//! store, the capability implementations and a root cancellation token.
//! Constructed once and passed by reference; there is no global state.

use crate::capability::{
    Arbiter, ArbitrationCandidate, Arbitration, CapabilityError, CapabilityResult, Embedder,
    ExtractedCharacteristic, Extractor, PlanCompiler, UnitConverter,
};
use crate::config::Config;
use crate::filter::FilterPlan;
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::units::StaticUnitConverter;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub embedder: Arc<dyn Embedder>,
    pub arbiter: Arc<dyn Arbiter>,
    pub converter: Arc<dyn UnitConverter>,
    pub extractor: Arc<dyn Extractor>,
    pub compiler: Arc<dyn PlanCompiler>,
    /// Cancelling this token fails every in-flight capability call
    pub cancel: CancellationToken,
    /// Held across the resolver's read-decide-write sequence. Shared by
    /// every clone of this context, so all resolvers over its store
    /// serialize on it.
    pub resolve_lock: Arc<Mutex<()>>,
}

impl Context {
    pub fn builder(config: Config, store: Arc<dyn Store>) -> ContextBuilder {
        ContextBuilder::new(config, store)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.capabilities.retry_policy()
    }
}

/// Builder for [`Context`]. Capabilities that are not supplied fail every
/// call, except unit conversion which defaults to [`StaticUnitConverter`].
pub struct ContextBuilder {
    config: Config,
    store: Arc<dyn Store>,
    embedder: Option<Arc<dyn Embedder>>,
    arbiter: Option<Arc<dyn Arbiter>>,
    converter: Option<Arc<dyn UnitConverter>>,
    extractor: Option<Arc<dyn Extractor>>,
    compiler: Option<Arc<dyn PlanCompiler>>,
    cancel: Option<CancellationToken>,
}

impl ContextBuilder {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            embedder: None,
            arbiter: None,
            converter: None,
            extractor: None,
            compiler: None,
            cancel: None,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn arbiter(mut self, arbiter: Arc<dyn Arbiter>) -> Self {
        self.arbiter = Some(arbiter);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn UnitConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn PlanCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Context {
        Context {
            config: self.config,
            store: self.store,
            embedder: self.embedder.unwrap_or_else(|| Arc::new(Unconfigured("embedder"))),
            arbiter: self.arbiter.unwrap_or_else(|| Arc::new(Unconfigured("arbiter"))),
            converter: self.converter.unwrap_or_else(|| Arc::new(StaticUnitConverter::new())),
            extractor: self.extractor.unwrap_or_else(|| Arc::new(Unconfigured("extractor"))),
            compiler: self.compiler.unwrap_or_else(|| Arc::new(Unconfigured("plan compiler"))),
            cancel: self.cancel.unwrap_or_default(),
            resolve_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Placeholder for a capability nobody supplied
struct Unconfigured(&'static str);

impl Unconfigured {
    fn fail<T>(&self) -> CapabilityResult<T> {
        Err(CapabilityError::InvalidResponse(format!("no {} configured", self.0)))
    }
}

#[async_trait]
impl Embedder for Unconfigured {
    async fn embed(&self, _texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>> {
        self.fail()
    }
}

#[async_trait]
impl Arbiter for Unconfigured {
    async fn arbitrate(&self, _candidate: &str, _top_k: &[ArbitrationCandidate]) -> CapabilityResult<Arbitration> {
        self.fail()
    }
}

#[async_trait]
impl Extractor for Unconfigured {
    async fn extract(&self, _title: &str, _description: &str) -> CapabilityResult<Vec<ExtractedCharacteristic>> {
        self.fail()
    }
}

#[async_trait]
impl PlanCompiler for Unconfigured {
    async fn compile(&self, _query: &str) -> CapabilityResult<FilterPlan> {
        self.fail()
    }
}
