pub mod manager;

pub use manager::{ChapterRecord, ContextManager, ContextMode, ContextResponse, SectionPosition};
