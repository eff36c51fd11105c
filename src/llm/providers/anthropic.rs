//! Anthropic backend, grounded on the teacher's `llm/anthropic.rs`. The
//! teacher inlined its own exponential-backoff retry loop around this
//! client; that responsibility now belongs to `resilience::retry` (C4), so
//! this provider only ever makes one call per `invoke`.

use crate::config::LlmSamplingConfig;
use crate::error::{BookGeneratorError, Result};
use crate::llm::provider::{emit_in_chunks, LlmProvider, TokenUsage};
use anthropic::client::Client as AnthropicClient;
use anthropic::config::AnthropicConfig;
use anthropic::types::{ContentBlock, Message as AnthropicMessage, MessagesRequestBuilder, Role};
use async_trait::async_trait;

pub struct AnthropicProvider {
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self { api_key, model }
    }

    fn client(&self) -> Result<AnthropicClient> {
        let cfg = AnthropicConfig::new().map_err(|e| BookGeneratorError::ProviderUnavailable(e.to_string()))?;
        AnthropicClient::try_from(cfg).map_err(|e| BookGeneratorError::ProviderUnavailable(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(
        &self,
        prompt: &str,
        _sampling: &LlmSamplingConfig,
        _streaming: bool,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<TokenUsage> {
        if self.api_key.is_empty() {
            return Err(BookGeneratorError::ProviderUnavailable(
                "ANTHROPIC_API_KEY is not set".to_string(),
            ));
        }

        let client = self.client()?;
        let request = MessagesRequestBuilder::default()
            .messages(vec![AnthropicMessage {
                role: Role::User,
                content: vec![ContentBlock::Text { text: prompt.to_string() }],
            }])
            .model(&self.model)
            .max_tokens(8192usize)
            .build()
            .map_err(|e| BookGeneratorError::TemplateError(e.to_string()))?;

        let response = client.messages(request).await.map_err(|e| classify(&e.to_string()))?;

        let completion: String = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect();

        emit_in_chunks(&completion, on_chunk);

        Ok(TokenUsage {
            prompt_tokens: response.usage.input_tokens as u32,
            completion_tokens: response.usage.output_tokens as u32,
        })
    }
}

/// Maps a raw client error string onto the error-policy table: overload /
/// timeout wording is transient and retryable, auth/quota wording is fatal.
fn classify(message: &str) -> BookGeneratorError {
    let lower = message.to_lowercase();
    if lower.contains("overloaded") || lower.contains("timeout") || lower.contains("connection") {
        BookGeneratorError::TransientProviderError(message.to_string())
    } else if lower.contains("rate limit") || lower.contains("429") {
        BookGeneratorError::RateLimited(message.to_string())
    } else if lower.contains("auth") || lower.contains("quota") || lower.contains("401") || lower.contains("403") {
        BookGeneratorError::ProviderUnavailable(message.to_string())
    } else {
        BookGeneratorError::LLMError(message.to_string())
    }
}
