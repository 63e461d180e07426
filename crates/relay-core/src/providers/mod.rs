//! Multi-provider structured-answer layer
//!
//! Supports Anthropic (direct messages endpoint), OpenAI-style chat
//! completions, and Google Gemini (generative text). Providers implement the
//! [`ProviderClient`] trait and are composed via [`ProviderRouter`] for
//! automatic failover.

pub mod anthropic;
pub mod google;
pub mod http;
pub mod openai;
pub mod router;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAiClient;
pub use router::ProviderRouter;
pub use types::{ProviderClient, ProviderDescriptor, ProviderKind, ProviderStatus};
