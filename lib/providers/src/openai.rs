//! OpenAI-compatible client implementing every capability trait.
//!
//! Transport problems, timeouts and non-success statuses surface as
//! [`CapabilityError`]s so the core can retry them. A well-formed reply
//! whose content cannot be interpreted degrades to the empty result:
//! a new-node verdict, no extracted pairs, an empty plan, or the
//! unconverted value.

use crate::prompts;
use async_trait::async_trait;
use ontomatch_core::config::ProviderConfig;
use ontomatch_core::{
    Arbiter, Arbitration, ArbitrationCandidate, CapabilityError, CapabilityResult, Embedder,
    ExtractedCharacteristic, Extractor, FilterPlan, PlanCompiler, Relation, UnitConverter,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API key not provided and {0} env var not set")]
    MissingApiKey(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    embed_model: String,
    chat_model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: Value,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExtractReply {
    #[serde(default)]
    pairs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ConvertReply {
    #[serde(default)]
    ok: bool,
    value: Option<f64>,
}

impl OpenAiClient {
    /// Build from configuration, reading the key from `config.api_key_env`
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(&config.base_url, &api_key, &config.embed_model, &config.chat_model, timeout)
    }

    pub fn new(
        base_url: &str,
        api_key: &str,
        embed_model: &str,
        chat_model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            embed_model: embed_model.to_string(),
            chat_model: chat_model.to_string(),
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> CapabilityResult<R> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| CapabilityError::InvalidResponse(format!("Failed to parse response: {}", e)));
        }
        if status.as_u16() == 429 {
            return Err(CapabilityError::RateLimited);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        Err(CapabilityError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn request_embeddings(&self, texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.embed_model,
            input: texts,
            encoding_format: "float",
        };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(CapabilityError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    /// Chat completion constrained to JSON. `None` when the reply content is
    /// missing or not a JSON document.
    async fn chat_json(&self, system: &str, user: &str, schema: Option<Value>) -> CapabilityResult<Option<Value>> {
        let response_format = match schema {
            Some(schema) => json!({"type": "json_schema", "json_schema": schema}),
            None => json!({"type": "json_object"}),
        };
        let request = ChatRequest {
            model: &self.chat_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format,
            temperature: 0.0,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(content = %content, "chat completion content");

        match serde_json::from_str::<Value>(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(error = %e, "chat content is not JSON");
                Ok(None)
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
        CapabilityError::Timeout
    } else {
        CapabilityError::Transport(e.to_string())
    }
}

fn parse_arbitration(reply: &Value) -> Arbitration {
    let best_index = reply.get("best_index").and_then(Value::as_i64).unwrap_or(-1);
    let relation = reply
        .get("relation")
        .and_then(Value::as_str)
        .map(Relation::parse)
        .unwrap_or_default();
    Arbitration { best_index, relation }
}

fn parse_as<T: DeserializeOwned>(what: &str, reply: Option<Value>) -> Option<T> {
    let value = reply?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(what, error = %e, "could not interpret reply");
            None
        }
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }
}

#[async_trait]
impl Arbiter for OpenAiClient {
    async fn arbitrate(&self, candidate: &str, top_k: &[ArbitrationCandidate]) -> CapabilityResult<Arbitration> {
        let user = json!({"candidate": candidate, "existing": top_k}).to_string();
        let reply = self.chat_json(prompts::ARBITER_SYSTEM, &user, None).await?;
        Ok(reply.as_ref().map(parse_arbitration).unwrap_or_else(Arbitration::new_node))
    }
}

#[async_trait]
impl UnitConverter for OpenAiClient {
    async fn convert(&self, value: f64, from_unit: Option<&str>, to_unit: Option<&str>) -> CapabilityResult<f64> {
        let (Some(from), Some(to)) = (from_unit, to_unit) else {
            return Ok(value);
        };
        if from.to_lowercase() == to.to_lowercase() {
            return Ok(value);
        }

        let user = format!("value={}, from={}, to={}", value, from, to);
        let reply = self
            .chat_json(prompts::CONVERT_SYSTEM, &user, Some(prompts::convert_schema()))
            .await?;
        match parse_as::<ConvertReply>("unit conversion", reply) {
            Some(ConvertReply { ok: true, value: Some(converted) }) if converted.is_finite() => Ok(converted),
            _ => Ok(value),
        }
    }
}

#[async_trait]
impl Extractor for OpenAiClient {
    async fn extract(&self, title: &str, description: &str) -> CapabilityResult<Vec<ExtractedCharacteristic>> {
        let user = format!("TITLE: {}\nDESC: {}", title, description);
        let reply = self
            .chat_json(prompts::EXTRACT_SYSTEM, &user, Some(prompts::extract_schema()))
            .await?;
        let pairs = parse_as::<ExtractReply>("extraction", reply)
            .map(|r| r.pairs)
            .unwrap_or_default();

        Ok(pairs
            .into_iter()
            .enumerate()
            .filter_map(|(i, pair)| match serde_json::from_value::<ExtractedCharacteristic>(pair) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(index = i, error = %e, "skipping malformed characteristic");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl PlanCompiler for OpenAiClient {
    async fn compile(&self, query: &str) -> CapabilityResult<FilterPlan> {
        let reply = self
            .chat_json(prompts::PLAN_SYSTEM, query, Some(prompts::plan_schema()))
            .await?;
        let Some(value) = reply else {
            return Ok(FilterPlan::default());
        };
        match FilterPlan::from_value(value) {
            Ok(plan) => Ok(plan),
            Err(e) => {
                warn!(query, error = %e, "compiled plan is invalid, using empty plan");
                Ok(FilterPlan::default())
            }
        }
    }
}
