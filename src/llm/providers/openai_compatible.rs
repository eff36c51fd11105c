//! OpenAI, Groq, and DeepSeek all speak the same OpenAI-compatible chat
//! completions wire format, so one `async-openai`-backed client (with a
//! per-provider base URL override) serves all three — the teacher's
//! `Cargo.toml` already depends on `async-openai`; Groq/DeepSeek need no
//! additional HTTP dependency beyond that.

use crate::config::LlmSamplingConfig;
use crate::error::{BookGeneratorError, Result};
use crate::llm::provider::{emit_in_chunks, LlmProvider, TokenUsage};
use async_openai::config::OpenAIConfig;
use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;

pub struct OpenAiCompatibleProvider {
    display_name: &'static str,
    api_key: String,
    api_base: Option<String>,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn openai(api_key: String, model: String) -> Self {
        Self { display_name: "openai", api_key, api_base: None, model }
    }

    pub fn groq(api_key: String, model: String) -> Self {
        Self {
            display_name: "groq",
            api_key,
            api_base: Some("https://api.groq.com/openai/v1".to_string()),
            model,
        }
    }

    pub fn deepseek(api_key: String, model: String) -> Self {
        Self {
            display_name: "deepseek",
            api_key,
            api_base: Some("https://api.deepseek.com/v1".to_string()),
            model,
        }
    }

    fn client(&self) -> Client<OpenAIConfig> {
        let mut cfg = OpenAIConfig::new().with_api_key(&self.api_key);
        if let Some(base) = &self.api_base {
            cfg = cfg.with_api_base(base);
        }
        Client::with_config(cfg)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.display_name
    }

    async fn invoke(
        &self,
        prompt: &str,
        sampling: &LlmSamplingConfig,
        _streaming: bool,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<TokenUsage> {
        if self.api_key.is_empty() {
            return Err(BookGeneratorError::ProviderUnavailable(format!(
                "{} API key is not set",
                self.display_name
            )));
        }

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| BookGeneratorError::TemplateError(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(sampling.temperature)
            .top_p(sampling.top_p)
            .messages(vec![message.into()])
            .build()
            .map_err(|e| BookGeneratorError::TemplateError(e.to_string()))?;

        let response = self
            .client()
            .chat()
            .create(request)
            .await
            .map_err(|e| classify(&e.to_string()))?;

        let completion = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| BookGeneratorError::MalformedResponse("empty choices array".to_string()))?;

        emit_in_chunks(&completion, on_chunk);

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(usage.unwrap_or_default())
    }
}

fn classify(message: &str) -> BookGeneratorError {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("connection") || lower.contains("overloaded") {
        BookGeneratorError::TransientProviderError(message.to_string())
    } else if lower.contains("429") || lower.contains("rate limit") {
        BookGeneratorError::RateLimited(message.to_string())
    } else if lower.contains("401") || lower.contains("403") || lower.contains("quota") {
        BookGeneratorError::ProviderUnavailable(message.to_string())
    } else {
        BookGeneratorError::LLMError(message.to_string())
    }
}
