pub mod invoke;
pub mod provider;
pub mod providers;

pub use invoke::{InvocationOutcome, Invoker};
pub use provider::{LlmProvider, TokenUsage};
