//! C9: four templated C5 invocations producing the book's permanent
//! structure — title, framework, chapter list, per-chapter ideas — each
//! parsed deterministically out of the model's free text.
//!
//! Generalizes the `ai_generate`/`parse_from_llm` pattern in the teacher's
//! `book/genre.rs` and `book/characters.rs`: an LLM call through C5
//! followed by a small deterministic parser. The teacher's
//! `generate_or_input` CLI-prompt branch (`get_user_input`,
//! `get_multiline_input`) is not carried over — the core pipeline is
//! non-interactive (§1); manual override belongs to the CLI binary, not
//! this chain.

use crate::error::{BookGeneratorError, Result};
use crate::llm::Invoker;
use crate::prompt_vars;
use crate::prompts::Prompts;
use once_cell::sync::Lazy;
use regex::Regex;

static LIST_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-•*]|\d+[.)])\s*").unwrap());

fn strip_list_prefix(line: &str) -> &str {
    LIST_PREFIX_RE.find(line).map(|m| &line[m.end()..]).unwrap_or(line)
}

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// §4.9 Title chain: subject/genre/profile/style -> a single line.
pub async fn generate_title(invoker: &Invoker, subject: &str, genre: &str, profile: &str, style: &str) -> Result<String> {
    let vars = prompt_vars! {"subject" => subject, "genre" => genre, "profile" => profile, "style" => style};
    let outcome = invoker.invoke("title", &Prompts::title(), &vars).await?;
    let title = outcome.answer.lines().next().unwrap_or("").trim().trim_matches('"').to_string();
    if title.is_empty() {
        return Err(BookGeneratorError::MalformedResponse("title generation returned an empty response".to_string()));
    }
    Ok(title)
}

/// §4.9 Framework chain: title + subject/genre/profile/style -> the
/// multi-paragraph narrative bible.
pub async fn generate_framework(invoker: &Invoker, title: &str, subject: &str, genre: &str, profile: &str, style: &str) -> Result<String> {
    let vars = prompt_vars! {"title" => title, "subject" => subject, "genre" => genre, "profile" => profile, "style" => style};
    let outcome = invoker.invoke("framework", &Prompts::framework(), &vars).await?;
    if outcome.answer.trim().is_empty() {
        return Err(BookGeneratorError::MalformedResponse("framework generation returned an empty response".to_string()));
    }
    Ok(outcome.answer)
}

/// §4.9 Chapters chain: framework -> an ordered `(key, description)`
/// mapping, parsed line-by-line. One retry with a stricter prompt on
/// parse failure; `MalformedResponse` on the second failure (§4.9).
pub async fn generate_chapters(invoker: &Invoker, title: &str, framework: &str) -> Result<Vec<(String, String)>> {
    let vars = prompt_vars! {"title" => title, "framework" => framework};
    let outcome = invoker.invoke("chapters", &Prompts::chapters(), &vars).await?;
    if let Some(parsed) = parse_chapter_lines(&outcome.answer) {
        return Ok(parsed);
    }

    let retry_vars = prompt_vars! {"framework" => framework};
    let retried = invoker.invoke("chapters_retry", &Prompts::chapters_strict(), &retry_vars).await?;
    parse_chapter_lines(&retried.answer)
        .ok_or_else(|| BookGeneratorError::MalformedResponse("chapter list could not be parsed after retry".to_string()))
}

fn parse_chapter_lines(text: &str) -> Option<Vec<(String, String)>> {
    let mut chapters = Vec::new();
    for line in non_empty_lines(text) {
        let line = strip_list_prefix(line);
        let Some((key, description)) = line.split_once(':') else { continue };
        let key = key.trim();
        let description = description.trim();
        if key.is_empty() {
            continue;
        }
        chapters.push((key.to_string(), description.to_string()));
    }
    if chapters.is_empty() {
        None
    } else {
        Some(chapters)
    }
}

/// §4.9 Ideas chain: framework + chapter metadata + prior ideas -> 3-5
/// idea lines. Same retry-once-then-escalate policy as chapters.
pub async fn generate_ideas(
    invoker: &Invoker,
    framework: &str,
    chapter_label: &str,
    chapter_description: &str,
    prior_ideas: &str,
) -> Result<Vec<String>> {
    let vars = prompt_vars! {
        "framework" => framework,
        "chapter_label" => chapter_label,
        "chapter_description" => chapter_description,
        "prior_ideas" => prior_ideas,
    };
    let outcome = invoker.invoke("ideas", &Prompts::ideas(), &vars).await?;
    if let Some(parsed) = parse_idea_lines(&outcome.answer) {
        return Ok(parsed);
    }

    let retry_vars = prompt_vars! {"chapter_label" => chapter_label, "chapter_description" => chapter_description};
    let retried = invoker.invoke("ideas_retry", &Prompts::ideas_strict(), &retry_vars).await?;
    parse_idea_lines(&retried.answer)
        .ok_or_else(|| BookGeneratorError::MalformedResponse("idea list could not be parsed after retry".to_string()))
}

fn parse_idea_lines(text: &str) -> Option<Vec<String>> {
    let ideas: Vec<String> = non_empty_lines(text).into_iter().map(|l| strip_list_prefix(l).trim().to_string()).filter(|l| !l.is_empty()).collect();
    if ideas.is_empty() {
        None
    } else {
        Some(ideas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bullet_and_numeric_prefixes() {
        assert_eq!(strip_list_prefix("- first idea"), "first idea");
        assert_eq!(strip_list_prefix("3. third idea"), "third idea");
        assert_eq!(strip_list_prefix("* starred idea"), "starred idea");
        assert_eq!(strip_list_prefix("plain idea"), "plain idea");
    }

    #[test]
    fn parses_chapter_lines_with_key_description() {
        let text = "Prólogo: The beginning\nCapítulo 1: Arrival\nCapítulo 2: Conflict\n";
        let parsed = parse_chapter_lines(text).unwrap();
        assert_eq!(parsed, vec![
            ("Prólogo".to_string(), "The beginning".to_string()),
            ("Capítulo 1".to_string(), "Arrival".to_string()),
            ("Capítulo 2".to_string(), "Conflict".to_string()),
        ]);
    }

    #[test]
    fn chapter_lines_without_colon_are_skipped_not_fatal() {
        let text = "Capítulo 1: Arrival\njust some stray prose\nCapítulo 2: Conflict\n";
        let parsed = parse_chapter_lines(text).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn empty_response_fails_to_parse_chapters() {
        assert!(parse_chapter_lines("   \n\n  ").is_none());
    }

    #[test]
    fn parses_idea_lines_stripping_bullets() {
        let text = "- The crew wakes\n2. They find the ship damaged\n* A stowaway is discovered\n";
        let parsed = parse_idea_lines(text).unwrap();
        assert_eq!(parsed, vec!["The crew wakes", "They find the ship damaged", "A stowaway is discovered"]);
    }
}
