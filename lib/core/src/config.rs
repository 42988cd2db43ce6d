//! Configuration, loaded from TOML with environment overrides.

use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cosine similarity at or above which a label merges directly
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.78;

/// Default number of nodes shown to the arbiter
pub const DEFAULT_TOP_K: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub matching: MatchingConfig,
    pub capabilities: CapabilityConfig,
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given (defaults otherwise), then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                tracing::info!("Loading config from: {}", p.display());
                Self::from_file(p)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `SIM_THRESHOLD_NEW_ATTR`, `TOPK_ATTR`,
    /// `EMBED_MODEL`, `CHAT_MODEL` and `DATABASE_PATH`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SIM_THRESHOLD_NEW_ATTR") {
            self.resolver.similarity_threshold = v.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("SIM_THRESHOLD_NEW_ATTR is not a number: {}", v))
            })?;
        }
        if let Some(v) = lookup("TOPK_ATTR") {
            self.resolver.top_k = v
                .trim()
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("TOPK_ATTR is not a count: {}", v)))?;
        }
        if let Some(v) = lookup("EMBED_MODEL") {
            self.provider.embed_model = v;
        }
        if let Some(v) = lookup("CHAT_MODEL") {
            self.provider.chat_model = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.storage.path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.resolver.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidConfig(format!(
                "resolver.similarity_threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.resolver.top_k == 0 {
            return Err(Error::InvalidConfig("resolver.top_k must be > 0".to_string()));
        }
        if self.capabilities.max_attempts == 0 {
            return Err(Error::InvalidConfig("capabilities.max_attempts must be > 0".to_string()));
        }
        if self.capabilities.timeout_ms == 0 {
            return Err(Error::InvalidConfig("capabilities.timeout_ms must be > 0".to_string()));
        }
        if self.classifier.concurrency == 0 {
            return Err(Error::InvalidConfig("classifier.concurrency must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    pub similarity_threshold: f32,
    pub top_k: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// How a clause attribute is matched against occurrence labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeMatch {
    /// Case-insensitive equality of the raw labels
    #[default]
    Lexical,
    /// Lexical, or both labels belong to the same attribute node
    Ontology,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    pub attribute_match: AttributeMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapabilityConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl CapabilityConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Items evaluated concurrently
    pub concurrency: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/ontomatch"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub embed_model: String,
    pub chat_model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Convert units through the chat model instead of the built-in table
    pub llm_unit_conversion: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            embed_model: "text-embedding-3-large".to_string(),
            chat_model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            llm_unit_conversion: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.resolver.similarity_threshold, 0.78);
        assert_eq!(config.resolver.top_k, 8);
        assert_eq!(config.matching.attribute_match, AttributeMatch::Lexical);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            [resolver]
            similarity_threshold = 0.85

            [matching]
            attribute_match = "ontology"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolver.similarity_threshold, 0.85);
        assert_eq!(config.resolver.top_k, 8);
        assert_eq!(config.matching.attribute_match, AttributeMatch::Ontology);
        assert_eq!(config.capabilities.max_attempts, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SIM_THRESHOLD_NEW_ATTR", "0.9"),
            ("TOPK_ATTR", "4"),
            ("DATABASE_PATH", "/tmp/graph"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.resolver.similarity_threshold, 0.9);
        assert_eq!(config.resolver.top_k, 4);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/graph"));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::default();
        assert!(config.apply_env(|k| (k == "TOPK_ATTR").then(|| "many".to_string())).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(Config::from_toml("[resolver]\nsimilarity_threshold = 1.5").is_err());
        assert!(Config::from_toml("[resolver]\ntop_k = 0").is_err());
        assert!(Config::from_toml("[classifier]\nconcurrency = 0").is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = CapabilityConfig::default().retry_policy();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 3);
    }
}
