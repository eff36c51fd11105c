//! C5: the universal LLM gateway. Every templated call in C8/C9/C10 goes
//! through `Invoker::invoke`, which builds the prompt, consults the breaker
//! and rate limiter for the active provider, calls the provider client
//! through the retry policy, runs the streaming sanitizer over whatever
//! chunks come back, and cleans the accumulated answer before returning it.

use crate::config::Config;
use crate::error::{BookGeneratorError, Result};
use crate::llm::provider::{build_provider, parse_provider_model, LlmProvider, TokenUsage};
use crate::prompts::PromptTemplate;
use crate::resilience::{retry, CircuitBreaker, RateLimiter};
use crate::text::clean;
use crate::text::sanitizer::StreamingSanitizer;
use crate::utils::logging::TokenTracker;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Result of one `invoke` call: the cleaned answer plus whatever reasoning
/// text the provider emitted on the thought channel, forwarded to
/// observers by the caller (C10's writer loop streams it to the UI socket;
/// C9's plan chains discard it).
#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    pub answer: String,
    pub thought: String,
    pub provider: String,
}

/// Owns the resilience state (breakers, rate limiter) for the configured
/// provider chain and exposes the single `invoke` operation every chain
/// calls through.
pub struct Invoker {
    config: Config,
    rate_limiter: RateLimiter,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    token_tracker: TokenTracker,
}

const BREAKER_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

impl Invoker {
    pub fn new(config: Config) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.clone()),
            config,
            breakers: Mutex::new(HashMap::new()),
            token_tracker: TokenTracker::new(),
        }
    }

    pub fn token_tracker(&self) -> &TokenTracker {
        &self.token_tracker
    }

    fn breaker_allows(&self, provider: &str) -> bool {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(provider.to_string())
            .or_insert_with(|| CircuitBreaker::new(BREAKER_FAILURE_THRESHOLD, BREAKER_COOLDOWN))
            .allow()
    }

    fn record_success(&self, provider: &str) {
        let breakers = self.breakers.lock().unwrap();
        if let Some(breaker) = breakers.get(provider) {
            breaker.record_success();
        }
    }

    fn record_failure(&self, provider: &str) {
        let breakers = self.breakers.lock().unwrap();
        if let Some(breaker) = breakers.get(provider) {
            breaker.record_failure();
        }
    }

    /// Step 1 of §4.5: substitute `vars` into `template`; missing variables
    /// are a `TemplateError` raised by `PromptTemplate::format` itself.
    pub async fn invoke(
        &self,
        site: &str,
        template: &PromptTemplate,
        vars: &HashMap<&str, &str>,
    ) -> Result<InvocationOutcome> {
        let prompt = template.format(vars)?;
        self.invoke_prompt(site, &prompt).await
    }

    /// Steps 2-7 of §4.5, given an already-substituted prompt string.
    pub async fn invoke_prompt(&self, site: &str, prompt: &str) -> Result<InvocationOutcome> {
        let chain = self.config.provider_chain.clone();
        if chain.is_empty() {
            return Err(BookGeneratorError::AllProvidersExhausted);
        }

        let mut last_err = None;
        for entry in &chain {
            let (provider_name, model) = parse_provider_model(entry);
            let model = if model.is_empty() { self.config.model.clone() } else { model };

            if !self.breaker_allows(&provider_name) {
                warn!(provider = %provider_name, "circuit open, skipping to next provider in chain");
                last_err = Some(BookGeneratorError::ProviderUnavailable(format!(
                    "{provider_name} circuit is open"
                )));
                continue;
            }

            let provider = match build_provider(&provider_name, &model, &self.config) {
                Ok(p) => p,
                Err(err) => {
                    last_err = Some(err);
                    continue;
                }
            };

            self.rate_limiter.wait(&provider_name).await;

            match self.call_with_retry(site, provider.as_ref(), prompt).await {
                Ok(outcome) => {
                    self.record_success(&provider_name);
                    return Ok(outcome);
                }
                Err(err) => {
                    self.record_failure(&provider_name);
                    warn!(provider = %provider_name, error = %err, "provider failed after retries, trying next in chain");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(BookGeneratorError::AllProvidersExhausted))
    }

    async fn call_with_retry(
        &self,
        site: &str,
        provider: &dyn LlmProvider,
        prompt: &str,
    ) -> Result<InvocationOutcome> {
        let sampling = self.config.llm_sampling.clone();
        let streaming = sampling.streaming;
        let name = provider.name().to_string();

        let outcome = retry(&self.config.retry, || async {
            let mut sanitizer = StreamingSanitizer::new();
            let mut usage = TokenUsage::default();
            let result: Result<TokenUsage> = {
                let mut on_chunk = |chunk: &str| sanitizer.push_chunk(chunk);
                match provider.invoke(prompt, &sampling, streaming, &mut on_chunk).await {
                    Ok(u) => {
                        usage = u;
                        Ok(u)
                    }
                    Err(e) => Err(e),
                }
            };
            result?;
            sanitizer.flush();

            let answer = clean(sanitizer.answer(), &crate::text::cleaner::INVOCATION_STAGES);
            if answer.trim().is_empty() && !sanitizer.thought().is_empty() {
                // A response containing only a think-tag is treated as
                // transient per §4.10's recoverable-conditions list.
                return Err(BookGeneratorError::TransientProviderError(
                    "response contained only reasoning text".to_string(),
                ));
            }

            self.token_tracker.record(site, usage.prompt_tokens, usage.completion_tokens);
            Ok(InvocationOutcome {
                answer,
                thought: sanitizer.thought().to_string(),
                provider: name.clone(),
            })
        })
        .await?;

        info!(site, provider = %outcome.provider, answer_len = outcome.answer.len(), "llm invocation complete");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_chain(chain: Vec<&str>) -> Config {
        let mut config = Config::default();
        config.provider_chain = chain.into_iter().map(String::from).collect();
        config
    }

    #[tokio::test]
    async fn empty_provider_chain_is_all_providers_exhausted() {
        let invoker = Invoker::new(config_with_chain(vec![]));
        let result = invoker.invoke_prompt("test", "hello").await;
        assert!(matches!(result, Err(BookGeneratorError::AllProvidersExhausted)));
    }

    #[tokio::test]
    async fn unconfigured_provider_without_api_key_fails_over_through_chain() {
        // Neither anthropic nor openai has a key configured by default, so
        // both fail fast and the chain is exhausted without panicking.
        let invoker = Invoker::new(config_with_chain(vec!["anthropic:claude", "openai:gpt-4o"]));
        let result = invoker.invoke_prompt("test", "hello").await;
        assert!(result.is_err());
    }
}
