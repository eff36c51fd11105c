//! Uniform provider interface (§6): each backend exposes
//! `invoke(prompt, sampling, streaming) -> chunks`, selected by a
//! `provider:model` identifier, and a chain orders fail-over candidates.

use crate::config::{Config, LlmSamplingConfig};
use crate::error::{BookGeneratorError, Result};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One LLM backend. `invoke` calls `on_chunk` for every piece of text as it
/// becomes available — exactly once, with the whole answer, for providers
/// that only return a complete response; repeatedly for providers with a
/// native streaming transport. Either way C5 always passes the sequence
/// through the streaming sanitizer (C2), so reasoning-tag stripping and
/// cancellation behave identically regardless of provider transport.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        prompt: &str,
        sampling: &LlmSamplingConfig,
        streaming: bool,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<TokenUsage>;
}

/// Splits a complete response into fixed-size chunks so non-streaming
/// providers still exercise the chunk-at-a-time sanitizer contract the same
/// way a real streaming transport would.
pub(crate) fn emit_in_chunks(text: &str, on_chunk: &mut (dyn FnMut(&str) + Send)) {
    const CHUNK_CHARS: usize = 48;
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return;
    }
    for piece in chars.chunks(CHUNK_CHARS) {
        let s: String = piece.iter().collect();
        on_chunk(&s);
    }
}

/// Parses a `provider:model` identifier into its parts.
pub fn parse_provider_model(entry: &str) -> (String, String) {
    match entry.split_once(':') {
        Some((provider, model)) => (provider.to_string(), model.to_string()),
        None => (entry.to_string(), String::new()),
    }
}

/// Builds the concrete provider for a `provider` name and `model`.
pub fn build_provider(provider: &str, model: &str, config: &Config) -> Result<Box<dyn LlmProvider>> {
    match provider {
        "anthropic" => Ok(Box::new(crate::llm::providers::anthropic::AnthropicProvider::new(
            config.anthropic_api_key.clone(),
            model.to_string(),
        ))),
        "openai" => Ok(Box::new(crate::llm::providers::openai_compatible::OpenAiCompatibleProvider::openai(
            config.openai_api_key.clone(),
            model.to_string(),
        ))),
        "groq" => Ok(Box::new(crate::llm::providers::openai_compatible::OpenAiCompatibleProvider::groq(
            config.groq_api_key.clone(),
            model.to_string(),
        ))),
        "deepseek" => Ok(Box::new(crate::llm::providers::openai_compatible::OpenAiCompatibleProvider::deepseek(
            config.deepseek_api_key.clone(),
            model.to_string(),
        ))),
        "ollama" => Ok(Box::new(crate::llm::providers::ollama::OllamaProvider::new(
            config.ollama_api_base.clone(),
            model.to_string(),
        ))),
        other => Err(BookGeneratorError::UnsupportedLLMProvider(other.to_string())),
    }
}

/// The ordered list of `provider:model` fail-over candidates, each resolved
/// to a concrete provider lazily so a misconfigured entry further down the
/// chain does not prevent using the ones before it.
pub struct ProviderChain {
    entries: Vec<(String, String)>,
}

impl ProviderChain {
    pub fn from_config(config: &Config) -> Self {
        Self {
            entries: config.provider_chain.iter().map(|e| parse_provider_model(e)).collect(),
        }
    }

    pub fn providers(&self) -> &[(String, String)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_model_pair() {
        assert_eq!(parse_provider_model("groq:llama3-8b-8192"), ("groq".to_string(), "llama3-8b-8192".to_string()));
    }

    #[test]
    fn missing_model_yields_empty_string() {
        assert_eq!(parse_provider_model("ollama"), ("ollama".to_string(), "".to_string()));
    }

    #[test]
    fn chunking_never_drops_characters() {
        let mut out = String::new();
        emit_in_chunks("the quick brown fox jumps over the lazy dog ".repeat(5).as_str(), &mut |c| out.push_str(c));
        assert_eq!(out, "the quick brown fox jumps over the lazy dog ".repeat(5));
    }
}
