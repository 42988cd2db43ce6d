//! OpenAI-compatible HTTP implementations of the ontomatch capability
//! traits: embeddings, arbitration, unit conversion, characteristic
//! extraction and plan compilation.

pub mod openai;
mod prompts;

pub use openai::{OpenAiClient, ProviderError};
