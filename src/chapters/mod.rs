pub mod ordering;
pub mod segments;

pub use ordering::{parse_chapter_key, sort_chapters, ChapterMetadata, ChapterType, OrderingResult};
pub use segments::{extract_segments, SegmentStrategy};
