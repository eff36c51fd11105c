//! Local Ollama backend. No API key; reachability depends entirely on
//! `ollama_api_base` pointing at a running daemon, so connection failures
//! here are always transient rather than fatal.

use crate::config::LlmSamplingConfig;
use crate::error::{BookGeneratorError, Result};
use crate::llm::provider::{emit_in_chunks, LlmProvider, TokenUsage};
use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;

pub struct OllamaProvider {
    api_base: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(api_base: String, model: String) -> Self {
        Self { api_base, model }
    }

    /// Splits `http://host:port` style base URLs without pulling in a URL
    /// parsing crate the rest of the workspace has no other use for.
    fn client(&self) -> Result<Ollama> {
        let without_scheme = self
            .api_base
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.api_base);
        let scheme = if self.api_base.starts_with("https://") { "https" } else { "http" };
        let (host, port) = match without_scheme.split_once(':') {
            Some((h, p)) => (h, p.trim_end_matches('/').parse::<u16>().unwrap_or(11434)),
            None => (without_scheme.trim_end_matches('/'), 11434),
        };
        if host.is_empty() {
            return Err(BookGeneratorError::ProviderUnavailable(
                "OLLAMA_API_BASE is not set".to_string(),
            ));
        }
        Ok(Ollama::new(format!("{scheme}://{host}"), port))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(
        &self,
        prompt: &str,
        sampling: &LlmSamplingConfig,
        _streaming: bool,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<TokenUsage> {
        let client = self.client()?;
        // No `.format(...)` override: this call generates free-text prose
        // (titles, frameworks, sections), not structured/JSON output, and
        // no `.keep_alive(...)` override either — the book pipeline issues
        // dozens of calls per run, so forcing an unload after each one
        // would reload the model from disk on every single section.
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string())
            .options(
                ollama_rs::generation::parameters::GenerationOptions::default()
                    .temperature(sampling.temperature)
                    .top_p(sampling.top_p)
                    .top_k(sampling.top_k)
                    .repeat_penalty(sampling.repeat_penalty),
            );

        let response = client.generate(request).await.map_err(|e| classify(&e.to_string()))?;

        emit_in_chunks(&response.response, on_chunk);

        Ok(TokenUsage {
            prompt_tokens: response.prompt_eval_count.unwrap_or(0) as u32,
            completion_tokens: response.eval_count.unwrap_or(0) as u32,
        })
    }
}

fn classify(message: &str) -> BookGeneratorError {
    let lower = message.to_lowercase();
    if lower.contains("connection") || lower.contains("refused") || lower.contains("timeout") {
        BookGeneratorError::TransientProviderError(message.to_string())
    } else if lower.contains("not found") || lower.contains("model") {
        BookGeneratorError::ProviderUnavailable(message.to_string())
    } else {
        BookGeneratorError::LLMError(message.to_string())
    }
}
