//! C6: parses chapter keys of mixed, LLM-authored format and produces a
//! total, stable order over them plus warnings for anything suspicious.
//!
//! Grounded on the general split-and-match parsing style of the teacher's
//! `book/genre.rs` (`from_string`/`parse_from_llm`) — plain `&str` matching,
//! no external parser crate, because the input alphabet is small and fixed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChapterType {
    Prologue,
    Numbered,
    Epilogue,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterMetadata {
    pub chapter_type: ChapterType,
    pub number: i64,
    pub original_label: String,
}

impl ChapterMetadata {
    /// Total order: Prologue < Numbered (by number asc) < Epilogue <
    /// Unknown; ties broken by original_label, lexicographically.
    fn sort_key(&self) -> (u8, i64, &str) {
        let type_rank = match self.chapter_type {
            ChapterType::Prologue => 0,
            ChapterType::Numbered => 1,
            ChapterType::Epilogue => 2,
            ChapterType::Unknown => 3,
        };
        let number = if self.chapter_type == ChapterType::Numbered { self.number } else { 0 };
        (type_rank, number, self.original_label.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OrderingResult {
    pub ordered: Vec<String>,
    pub warnings: Vec<String>,
}

/// Strips accents (best-effort, Latin-1 supplement range) and trims
/// surrounding punctuation/whitespace so "Capítulo 1." and "capitulo 1"
/// normalize the same way.
fn normalize(label: &str) -> String {
    let lowered = label.to_lowercase();
    let folded: String = lowered
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect();
    folded
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ':' | '-' | '_'))
        .to_string()
}

const ROMAN_VALUES: &[(char, i64)] =
    &[('i', 1), ('v', 5), ('x', 10), ('l', 50), ('c', 100), ('d', 500), ('m', 1000)];

fn roman_to_int(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    let values: Vec<i64> = s
        .chars()
        .map(|c| ROMAN_VALUES.iter().find(|(r, _)| *r == c).map(|(_, v)| *v))
        .collect::<Option<Vec<_>>>()?;
    let mut total = 0;
    for i in 0..values.len() {
        if i + 1 < values.len() && values[i] < values[i + 1] {
            total -= values[i];
        } else {
            total += values[i];
        }
    }
    Some(total)
}

fn parse_number(token: &str) -> Option<i64> {
    token.parse::<i64>().ok().or_else(|| roman_to_int(token))
}

/// Parses a single chapter key. Case-insensitive, accent/punctuation
/// tolerant; anything it cannot confidently classify becomes `Unknown`
/// rather than silently reordered.
pub fn parse_chapter_key(label: &str) -> ChapterMetadata {
    let normalized = normalize(label);

    if normalized.starts_with("prologo") || normalized.starts_with("prologue") {
        return ChapterMetadata {
            chapter_type: ChapterType::Prologue,
            number: 0,
            original_label: label.to_string(),
        };
    }
    if normalized.starts_with("epilogo") || normalized.starts_with("epilogue") {
        return ChapterMetadata {
            chapter_type: ChapterType::Epilogue,
            number: 0,
            original_label: label.to_string(),
        };
    }

    for prefix in ["capitulo", "chapter"] {
        if let Some(rest) = normalized.strip_prefix(prefix) {
            let token = rest.trim();
            if let Some(number) = parse_number(token) {
                return ChapterMetadata {
                    chapter_type: ChapterType::Numbered,
                    number,
                    original_label: label.to_string(),
                };
            }
        }
    }

    ChapterMetadata {
        chapter_type: ChapterType::Unknown,
        number: 0,
        original_label: label.to_string(),
    }
}

/// Sorts an iterable of chapter keys into canonical order and reports
/// duplicate numbers, gaps in the arabic sequence, and `Unknown` entries.
/// O(n log n); stable against ties (see `sort_key`'s `original_label`
/// tiebreaker).
pub fn sort_chapters<I, S>(keys: I) -> OrderingResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<ChapterMetadata> = keys.into_iter().map(|k| parse_chapter_key(k.as_ref())).collect();
    parsed.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut warnings = Vec::new();
    let mut seen_numbers: Vec<i64> = Vec::new();
    for meta in &parsed {
        match meta.chapter_type {
            ChapterType::Numbered => seen_numbers.push(meta.number),
            ChapterType::Unknown => {
                warnings.push(format!("unrecognized chapter key: \"{}\"", meta.original_label));
            }
            _ => {}
        }
    }

    let mut counts = std::collections::HashMap::new();
    for n in &seen_numbers {
        *counts.entry(*n).or_insert(0) += 1;
    }
    let mut duplicate_numbers: Vec<i64> = counts.iter().filter(|(_, c)| **c > 1).map(|(n, _)| *n).collect();
    duplicate_numbers.sort_unstable();
    for n in duplicate_numbers {
        warnings.push(format!("duplicate chapter number: {}", n));
    }

    let mut sorted_numbers = seen_numbers.clone();
    sorted_numbers.sort_unstable();
    sorted_numbers.dedup();
    for window in sorted_numbers.windows(2) {
        if window[1] - window[0] > 1 {
            for missing in (window[0] + 1)..window[1] {
                warnings.push(format!("gap at {}", missing));
            }
        }
    }

    OrderingResult {
        ordered: parsed.into_iter().map(|m| m.original_label).collect(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_labels_sort_prologue_numbered_epilogue() {
        let result = sort_chapters(["Capítulo 3", "Prólogo", "Capítulo 1", "Epílogo", "Capítulo 2"]);
        assert_eq!(
            result.ordered,
            vec!["Prólogo", "Capítulo 1", "Capítulo 2", "Capítulo 3", "Epílogo"]
        );
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn gap_in_arabic_sequence_is_flagged() {
        let result = sort_chapters(["Capítulo 1", "Capítulo 3"]);
        assert_eq!(result.ordered, vec!["Capítulo 1", "Capítulo 3"]);
        assert!(result.warnings.contains(&"gap at 2".to_string()));
    }

    #[test]
    fn duplicate_numbers_are_flagged() {
        let result = sort_chapters(["Chapter 1", "Chapter 1", "Chapter 2"]);
        assert!(result.warnings.iter().any(|w| w.contains("duplicate chapter number: 1")));
    }

    #[test]
    fn unrecognized_keys_become_unknown_and_sort_last() {
        let result = sort_chapters(["Chapter 1", "Interlude", "Chapter 2"]);
        assert_eq!(result.ordered.last().unwrap(), "Interlude");
        assert!(result.warnings.iter().any(|w| w.contains("unrecognized")));
    }

    #[test]
    fn roman_numerals_and_english_labels_parse() {
        let meta = parse_chapter_key("Chapter IV");
        assert_eq!(meta.chapter_type, ChapterType::Numbered);
        assert_eq!(meta.number, 4);
    }

    #[test]
    fn sort_is_total_and_a_permutation_of_input() {
        let input = vec!["Capítulo 2", "Prólogo", "Epílogo", "???", "Capítulo 1"];
        let result = sort_chapters(input.clone());
        let mut got = result.ordered.clone();
        let mut want: Vec<String> = input.into_iter().map(String::from).collect();
        got.sort();
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn case_and_accent_insensitive() {
        let meta = parse_chapter_key("CAPITULO 5");
        assert_eq!(meta.chapter_type, ChapterType::Numbered);
        assert_eq!(meta.number, 5);
        let meta2 = parse_chapter_key("prologue");
        assert_eq!(meta2.chapter_type, ChapterType::Prologue);
    }
}
