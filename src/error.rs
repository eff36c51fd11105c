use thiserror::Error;

/// Error kinds per the error-handling policy table: each variant carries
/// its own recovery policy (retried locally, failed over, or terminal).
#[derive(Error, Debug)]
pub enum BookGeneratorError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    LLMError(String),

    #[error("transient provider error: {0}")]
    TransientProviderError(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("all providers exhausted")]
    AllProvidersExhausted,

    #[error("template error: {0}")]
    TemplateError(String),

    #[error("context budget violated: response of {actual} chars exceeds budget of {budget}")]
    ContextBudgetViolation { actual: usize, budget: usize },

    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("generation error: {0}")]
    Generation(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("unsupported LLM provider: {0}")]
    UnsupportedLLMProvider(String),

    #[error("other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BookGeneratorError>;

impl From<serde_json::Error> for BookGeneratorError {
    fn from(err: serde_json::Error) -> Self {
        BookGeneratorError::SerializationError(format!("JSON error: {}", err))
    }
}

impl BookGeneratorError {
    /// Errors C4 is allowed to retry: transient network/timeout conditions,
    /// rate limiting, and malformed streaming output. Everything else
    /// (auth, quota, config, illegal transitions) escalates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookGeneratorError::TransientProviderError(_)
                | BookGeneratorError::RateLimited(_)
                | BookGeneratorError::MalformedResponse(_)
        )
    }

    /// Fatal errors bypass retry and escalate straight to provider fail-over
    /// or a terminal state, per §4.4 ("Fatal errors... bypass retry").
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BookGeneratorError::ProviderUnavailable(_)
                | BookGeneratorError::AllProvidersExhausted
                | BookGeneratorError::TemplateError(_)
                | BookGeneratorError::ContextBudgetViolation { .. }
        )
    }
}
