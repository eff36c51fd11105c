//! Template library for every templated LLM call the pipeline makes.
//!
//! Generalized from the teacher's `utils/prompts.rs`, which built each
//! template as a `langchain_rust::prompt::PromptTemplate` with an explicit
//! variable list. This crate owns a much smaller substitution surface
//! (`PromptTemplate` below) instead of routing every call through
//! `langchain_rust::chain::Chain`, so the templates keep the teacher's
//! wording but drop the `langchain-rust` dependency.

use crate::error::{BookGeneratorError, Result};
use std::collections::HashMap;

/// A fixed prompt string with `{var}` placeholders, substituted by
/// `PromptTemplate::format`. Missing variables are a `TemplateError`, per
/// §4.5 step 1 ("missing variables are an error").
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes every `{key}` occurrence with its value from `vars`. A
    /// placeholder with no matching key is a `TemplateError`; an unused
    /// key in `vars` is not an error (callers pass a superset freely).
    pub fn format(&self, vars: &HashMap<&str, &str>) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let Some(close) = after_open.find('}') else {
                return Err(BookGeneratorError::TemplateError(format!(
                    "unterminated placeholder in template: {}",
                    self.template
                )));
            };
            let key = &after_open[..close];
            let value = vars.get(key).ok_or_else(|| {
                BookGeneratorError::TemplateError(format!("missing template variable: {key}"))
            })?;
            out.push_str(value);
            rest = &after_open[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Builds a `{"key" => "value", ...}` map for `PromptTemplate::format`.
#[macro_export]
macro_rules! prompt_vars {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(map.insert($key, $value);)*
        map
    }};
}

pub struct Prompts;

impl Prompts {
    pub fn title() -> PromptTemplate {
        PromptTemplate::new(
            "Generate a single, evocative title for a {genre} novel aimed at {profile}, written in the following style: {style}.\n\nSubject: {subject}\n\nRespond with only the title, one line, no quotation marks.\n\nTitle:",
        )
    }

    pub fn framework() -> PromptTemplate {
        PromptTemplate::new(
            "Write a narrative framework (tone, world, principal characters) for a book titled '{title}'.\n\nSubject: {subject}\nGenre: {genre}\nProfile: {profile}\nStyle: {style}\n\nThe framework is the permanent bible every later chapter will be written against; be concrete and specific rather than generic.\n\nFramework:",
        )
    }

    pub fn chapters() -> PromptTemplate {
        PromptTemplate::new(
            "Based on the following framework, produce a chapter list for the book '{title}'.\n\nFramework: {framework}\n\nIMPORTANT: respond with one chapter per line, in the exact form 'Capítulo N: Description' (or 'Prólogo: Description' / 'Epílogo: Description' where applicable). Do not number scenes, do not add headers, do not add blank lines between chapters.\n\nChapters:",
        )
    }

    pub fn chapters_strict() -> PromptTemplate {
        PromptTemplate::new(
            "Your previous chapter list could not be parsed. Respond again, one chapter per line, no bullet points, no numbering other than the chapter label itself, in the exact form 'Capítulo N: Description'.\n\nFramework: {framework}\n\nChapters:",
        )
    }

    pub fn ideas() -> PromptTemplate {
        PromptTemplate::new(
            "List 3 to 5 section ideas, one per line, for the chapter '{chapter_label}: {chapter_description}' of the book described below.\n\nFramework: {framework}\nPrior chapter ideas (for continuity, do not repeat): {prior_ideas}\n\nRespond with one idea per line, no numbering, no bullet points.\n\nIdeas:",
        )
    }

    pub fn ideas_strict() -> PromptTemplate {
        PromptTemplate::new(
            "Your previous idea list could not be parsed. Respond again with 3 to 5 ideas, exactly one per line, no prefixes of any kind.\n\nChapter: {chapter_label}: {chapter_description}\n\nIdeas:",
        )
    }

    pub fn section() -> PromptTemplate {
        PromptTemplate::new(
            "Write the next section of the novel, continuing directly from the prior narrative with no repetition or summary of what came before.\n\nFramework: {framework}\nPrevious chapters (summarized): {previous_chapters_summary}\nThis chapter so far (summarized): {current_chapter_summary}\nSection position: {position} of chapter {chapter_number}\nSection idea: {idea}\n\nWrite polished prose, not an outline. Section:",
        )
    }

    pub fn section_simplified() -> PromptTemplate {
        PromptTemplate::new(
            "Write one section of narrative prose covering this idea: {idea}. Chapter context: {framework}\n\nSection:",
        )
    }

    pub fn micro_summary() -> PromptTemplate {
        PromptTemplate::new(
            "Condense the following sections of a chapter into one short paragraph that preserves every plot-relevant detail, so the story can continue without re-reading them.\n\nSections:\n{sections}\n\nCondensed summary:",
        )
    }

    pub fn chapter_summary() -> PromptTemplate {
        PromptTemplate::new(
            "Summarize the following chapter in at most 120 words, preserving plot-critical detail for future chapters to reference.\n\nChapter title: {title}\nChapter sections:\n{sections}\n\nSummary:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_all_placeholders() {
        let template = PromptTemplate::new("Hello {name}, welcome to {place}.");
        let vars = prompt_vars! {"name" => "Ada", "place" => "the lab"};
        assert_eq!(template.format(&vars).unwrap(), "Hello Ada, welcome to the lab.");
    }

    #[test]
    fn missing_variable_is_a_template_error() {
        let template = PromptTemplate::new("Hello {name}.");
        let vars = prompt_vars! {"other" => "value"};
        assert!(matches!(template.format(&vars), Err(BookGeneratorError::TemplateError(_))));
    }

    #[test]
    fn unterminated_placeholder_is_a_template_error() {
        let template = PromptTemplate::new("Hello {name");
        let vars = prompt_vars! {"name" => "Ada"};
        assert!(matches!(template.format(&vars), Err(BookGeneratorError::TemplateError(_))));
    }

    #[test]
    fn every_declared_chain_template_formats_with_its_documented_vars() {
        let vars = prompt_vars! {
            "genre" => "Science Fiction", "profile" => "Young Adult", "style" => "terse",
            "subject" => "a colony ship", "title" => "Voyage", "framework" => "...",
            "chapter_label" => "Capítulo 1", "chapter_description" => "arrival", "prior_ideas" => "",
            "previous_chapters_summary" => "", "current_chapter_summary" => "", "position" => "start",
            "chapter_number" => "1", "idea" => "the crew wakes", "sections" => "...",
        };
        for template in [
            Prompts::title(), Prompts::framework(), Prompts::chapters(), Prompts::chapters_strict(),
            Prompts::ideas(), Prompts::ideas_strict(), Prompts::section(), Prompts::section_simplified(),
            Prompts::micro_summary(), Prompts::chapter_summary(),
        ] {
            template.format(&vars).unwrap();
        }
    }
}
