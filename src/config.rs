use crate::error::Result;
use crate::resilience::retry::BackoffStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Validated, explicitly-constructed configuration record.
///
/// Every tunable named in the external-interfaces table is read once at
/// startup and threaded through constructors from here — no module reaches
/// back into `std::env` on its own, so tests can build a `Config` by hand
/// instead of racing real environment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm_provider: String,
    pub model: String,
    pub provider_chain: Vec<String>,

    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub groq_api_key: String,
    pub deepseek_api_key: String,
    pub ollama_api_base: String,

    pub genre: String,
    pub writing_style: String,
    pub target_audience: String,
    pub max_chapters: usize,
    pub max_sections_per_chapter: usize,
    pub auto_generate: bool,

    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub context: ContextConfig,
    pub segment: SegmentConfig,
    pub llm_sampling: LlmSamplingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub timeout_secs: u64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_strategy: BackoffStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub default_delay_ms: u64,
    pub per_provider_delay_ms: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub limited_size: usize,
    pub standard_size: usize,
    pub max_accumulation: usize,
    pub enable_micro_summaries: bool,
    pub micro_summary_interval: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub strategy: String,
    pub max_count: usize,
    pub base_length: usize,
    pub adaptive_scaling: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self { strategy: "adaptive".to_string(), max_count: 3, base_length: 800, adaptive_scaling: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSamplingConfig {
    pub temperature: f32,
    pub streaming: bool,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let get = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let get_usize = |key: &str, default: usize| -> usize {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let get_u64 = |key: &str, default: u64| -> u64 {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let get_f32 = |key: &str, default: f32| -> f32 {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let get_bool = |key: &str, default: bool| -> bool {
            std::env::var(key)
                .ok()
                .and_then(|v| v.to_lowercase().parse::<bool>().ok())
                .unwrap_or(default)
        };

        let llm_provider = get("LLM_PROVIDER", "ollama");
        let default_model = match llm_provider.as_str() {
            "openai" => "gpt-4o",
            "anthropic" => "claude-sonnet-4-20250514",
            "groq" => "llama3-8b-8192",
            "deepseek" => "deepseek-chat",
            _ => "llama3",
        };
        let model = std::env::var("SELECTED_MODEL").unwrap_or_else(|_| get("MODEL_TYPE", default_model));

        let provider_chain = std::env::var("PROVIDER_CHAIN")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_else(|| vec![format!("{}:{}", llm_provider, model)]);

        let backoff_strategy = match get("RETRY_BACKOFF_STRATEGY", "exponential").to_lowercase().as_str() {
            "linear" => BackoffStrategy::Linear,
            "fixed" => BackoffStrategy::Fixed,
            _ => BackoffStrategy::Exponential,
        };

        let mut per_provider_delay_ms = HashMap::new();
        for (key, value) in std::env::vars() {
            if let Some(provider) = key
                .strip_prefix("RATE_LIMIT_")
                .and_then(|rest| rest.strip_suffix("_DELAY"))
            {
                if provider == "DEFAULT" {
                    continue;
                }
                if let Ok(delay) = value.parse::<u64>() {
                    per_provider_delay_ms.insert(provider.to_lowercase(), delay);
                }
            }
        }

        Ok(Self {
            llm_provider,
            model,
            provider_chain,
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            groq_api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").unwrap_or_default(),
            ollama_api_base: get("OLLAMA_API_BASE", "http://localhost:11434"),
            genre: get("GENRE", "Science Fiction"),
            writing_style: get("WRITING_STYLE", "Third-person limited, present tense"),
            target_audience: get("TARGET_AUDIENCE", "Young Adult"),
            max_chapters: get_usize("MAX_CHAPTERS", 20),
            max_sections_per_chapter: get_usize("MAX_SECTIONS_PER_CHAPTER", 4),
            auto_generate: get_bool("AUTO_GENERATE", true),
            retry: RetryConfig {
                max_attempts: get_usize("RETRY_MAX_ATTEMPTS", 3),
                timeout_secs: get_u64("RETRY_TIMEOUT", 30),
                base_delay_ms: get_u64("RETRY_BASE_DELAY", 500),
                max_delay_ms: get_u64("RETRY_MAX_DELAY", 30_000),
                backoff_strategy,
            },
            rate_limit: RateLimitConfig {
                default_delay_ms: get_u64("RATE_LIMIT_DEFAULT_DELAY", 1_000),
                per_provider_delay_ms,
            },
            context: ContextConfig {
                limited_size: get_usize("CONTEXT_LIMITED_SIZE", 4_000),
                standard_size: get_usize("CONTEXT_STANDARD_SIZE", 16_000),
                max_accumulation: get_usize("CONTEXT_MAX_ACCUMULATION", 60_000),
                enable_micro_summaries: get_bool("CONTEXT_ENABLE_MICRO_SUMMARIES", true),
                micro_summary_interval: get_usize("CONTEXT_MICRO_SUMMARY_INTERVAL", 5),
            },
            segment: SegmentConfig {
                strategy: get("SEGMENT_EXTRACTION_STRATEGY", "adaptive"),
                max_count: get_usize("SEGMENT_MAX_COUNT", 3),
                base_length: get_usize("SEGMENT_BASE_LENGTH", 800),
                adaptive_scaling: get_bool("SEGMENT_ADAPTIVE_SCALING", true),
            },
            llm_sampling: LlmSamplingConfig {
                temperature: get_f32("LLM_TEMPERATURE", 0.8),
                streaming: get_bool("LLM_STREAMING", true),
                top_k: get_usize("LLM_TOP_K", 40) as u32,
                top_p: get_f32("LLM_TOP_P", 0.95),
                repeat_penalty: get_f32("LLM_REPEAT_PENALTY", 1.1),
            },
        })
    }

    /// The delay configured for `provider`, falling back to the rate
    /// limiter's default per §4.3 ("unknown providers fall back to a
    /// default delay").
    pub fn rate_limit_delay_ms(&self, provider: &str) -> u64 {
        self.rate_limit
            .per_provider_delay_ms
            .get(provider)
            .copied()
            .unwrap_or(self.rate_limit.default_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            provider_chain: vec!["anthropic:claude-sonnet-4-20250514".to_string()],
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            groq_api_key: String::new(),
            deepseek_api_key: String::new(),
            ollama_api_base: "http://localhost:11434".to_string(),
            genre: "Science Fiction".to_string(),
            writing_style: "Third-person limited, present tense".to_string(),
            target_audience: "Young Adult".to_string(),
            max_chapters: 20,
            max_sections_per_chapter: 4,
            auto_generate: true,
            retry: RetryConfig {
                max_attempts: 3,
                timeout_secs: 30,
                base_delay_ms: 500,
                max_delay_ms: 30_000,
                backoff_strategy: BackoffStrategy::Exponential,
            },
            rate_limit: RateLimitConfig {
                default_delay_ms: 1_000,
                per_provider_delay_ms: HashMap::new(),
            },
            context: ContextConfig {
                limited_size: 4_000,
                standard_size: 16_000,
                max_accumulation: 60_000,
                enable_micro_summaries: true,
                micro_summary_interval: 5,
            },
            segment: SegmentConfig {
                strategy: "adaptive".to_string(),
                max_count: 3,
                base_length: 800,
                adaptive_scaling: true,
            },
            llm_sampling: LlmSamplingConfig {
                temperature: 0.8,
                streaming: true,
                top_k: 40,
                top_p: 0.95,
                repeat_penalty: 1.1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_falls_back_to_default_delay() {
        let config = Config::default();
        assert_eq!(config.rate_limit_delay_ms("mystery-provider"), 1_000);
    }

    #[test]
    fn known_provider_delay_overrides_default() {
        let mut config = Config::default();
        config.rate_limit.per_provider_delay_ms.insert("groq".to_string(), 2_500);
        assert_eq!(config.rate_limit_delay_ms("groq"), 2_500);
        assert_eq!(config.rate_limit_delay_ms("anthropic"), 1_000);
    }
}
