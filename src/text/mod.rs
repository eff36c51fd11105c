pub mod cleaner;
pub mod sanitizer;

pub use cleaner::{clean, Stage as CleanStage};
pub use sanitizer::{StreamState, StreamingSanitizer};
