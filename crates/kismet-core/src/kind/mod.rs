//! The content a screen produces: how a prompt is composed, how a response is
//! read back, and how a result maps to its saved record.

mod image;
mod problem;
mod recipe;
mod refine;
mod story;

pub use image::{color_prompt, ImageKind};
pub use problem::ProblemKind;
pub use recipe::{recipe_markdown, RecipeKind, RECIPE_UNAVAILABLE};
pub use refine::{strip_refined_marker, RefineKind, NO_REFINED_PROMPT};
pub use story::StoryKind;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Result, UNABLE_TO_PROCESS};
use crate::model::{FilterParams, GenerationResult, SegmentId};
use crate::parse::IdSource;
use crate::storage::Record;

pub trait ContentKind: Send + Sync + 'static {
    type Filters: FilterParams;
    type Record: Record + Serialize + std::fmt::Debug;

    /// Short lowercase name used in logs and on the command line.
    const NAME: &'static str;

    /// Input used by `refresh` when the user has not typed anything yet.
    fn default_input(&self) -> &'static str;

    /// Full prompt for the text service. `history` holds the natural keys of
    /// results already produced by this screen, oldest first.
    fn compose(&self, input: &str, filters: &Self::Filters, history: &[String]) -> String;

    /// Build a result without calling the text service, when the filters
    /// determine it completely.
    fn direct(
        &self,
        _input: &str,
        _filters: &Self::Filters,
        _ids: &mut dyn IdSource,
    ) -> Option<GenerationResult> {
        None
    }

    /// Turn a non-blank response into a result.
    fn interpret(&self, response: &str, ids: &mut dyn IdSource) -> Result<GenerationResult>;

    /// Resolve every image segment as soon as a result arrives.
    fn auto_resolve(&self) -> bool {
        false
    }

    /// Message shown when a response cannot be interpreted.
    fn parse_failure_message(&self) -> &'static str {
        UNABLE_TO_PROCESS
    }

    /// Key a result would be saved under. `None` means it cannot be saved.
    fn natural_key(&self, result: &GenerationResult) -> Option<String> {
        result
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    /// Record for `result`. `assets` maps image segments to their permanent files.
    fn to_record(
        &self,
        result: &GenerationResult,
        filters: &Self::Filters,
        assets: &HashMap<SegmentId, PathBuf>,
    ) -> Result<Self::Record>;

    fn from_record(&self, record: &Self::Record) -> (GenerationResult, Self::Filters);

    /// Subdirectory of the file root that holds saved images.
    fn asset_dir(&self) -> &'static str;
}

/// Append a labeled line when `value` is set and non-blank.
fn push_input(prompt: &mut String, label: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        prompt.push('\n');
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(v);
    }
}

/// Append the free-text request unless it is the screen's own default.
fn push_request(prompt: &mut String, input: &str, default_input: &str) {
    let input = input.trim();
    if !input.is_empty() && input != default_input {
        push_input(prompt, "Request", Some(input));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_input_skips_blank() {
        let mut prompt = String::from("P");
        push_input(&mut prompt, "Genre", Some("  "));
        push_input(&mut prompt, "Genre", None);
        push_input(&mut prompt, "Genre", Some(" Noir "));
        assert_eq!(prompt, "P\nGenre: Noir");
    }

    #[test]
    fn test_push_request_skips_default() {
        let mut prompt = String::from("P");
        push_request(&mut prompt, "Tell me a story.", "Tell me a story.");
        assert_eq!(prompt, "P");
        push_request(&mut prompt, "about otters", "Tell me a story.");
        assert_eq!(prompt, "P\nRequest: about otters");
    }
}
