use std::collections::HashMap;
use std::path::PathBuf;

use super::ContentKind;
use crate::error::{KismetError, Result};
use crate::model::{GenerationResult, NoFilters, Segment, SegmentId, Unsaved};
use crate::parse::IdSource;

const REFINE_PROMPT: &str = "\
You are PromptRefiner, an expert in prompt engineering for large language models.
Improve the raw prompt below, which may be vague or unclear:
1. Rewrite it in a clear, structured form.
2. Make the intent explicit.
3. Add missing context where it helps.
4. Optionally include an input/output example.
5. Follow prompt engineering best practices.
6. Reply with the refined prompt only.";

/// Marker the model is asked to put before its answer.
pub const REFINED_MARKER: &str = "Refined Prompt:";

pub const NO_REFINED_PROMPT: &str = "No refined prompt was returned. Please try again!";

/// Rewrites a rough prompt into a clearer one. Results are not saved.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefineKind;

impl RefineKind {
    pub fn new() -> Self {
        Self
    }
}

/// Remove every occurrence of the marker and surrounding whitespace.
/// `None` when nothing is left.
pub fn strip_refined_marker(response: &str) -> Option<String> {
    let refined = response.replace(REFINED_MARKER, "");
    let refined = refined.trim();
    (!refined.is_empty()).then(|| refined.to_string())
}

impl ContentKind for RefineKind {
    type Filters = NoFilters;
    type Record = Unsaved;

    const NAME: &'static str = "refine";

    fn default_input(&self) -> &'static str {
        "Explain how rainbows form."
    }

    fn compose(&self, input: &str, _filters: &NoFilters, _history: &[String]) -> String {
        format!(
            "{REFINE_PROMPT}\n\nrawText: {}\n\nYour output must follow this format:\n\n{REFINED_MARKER}\n\n<your improved version>\n",
            input.trim()
        )
    }

    fn interpret(&self, response: &str, ids: &mut dyn IdSource) -> Result<GenerationResult> {
        let refined = strip_refined_marker(response)
            .ok_or_else(|| KismetError::EmptyResult(NO_REFINED_PROMPT.into()))?;
        Ok(GenerationResult::new(
            None,
            vec![Segment::text(ids.next_id(), refined, 0)],
        ))
    }

    fn natural_key(&self, _result: &GenerationResult) -> Option<String> {
        None
    }

    fn to_record(
        &self,
        _result: &GenerationResult,
        _filters: &NoFilters,
        _assets: &HashMap<SegmentId, PathBuf>,
    ) -> Result<Unsaved> {
        Err(KismetError::InvalidInput(
            "Refined prompts cannot be saved".into(),
        ))
    }

    fn from_record(&self, record: &Unsaved) -> (GenerationResult, NoFilters) {
        match *record {}
    }

    fn asset_dir(&self) -> &'static str {
        "refined"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::SequentialIds;

    #[test]
    fn test_strip_marker() {
        assert_eq!(
            strip_refined_marker("Refined Prompt:\n\nWrite a haiku about autumn.\n").as_deref(),
            Some("Write a haiku about autumn.")
        );
        assert_eq!(
            strip_refined_marker("Just the prompt").as_deref(),
            Some("Just the prompt")
        );
        assert_eq!(strip_refined_marker("  Refined Prompt:  \n"), None);
    }

    #[test]
    fn test_compose_wraps_raw_text() {
        let prompt = RefineKind.compose("  make a poem ", &NoFilters, &[]);
        assert!(prompt.starts_with("You are PromptRefiner"));
        assert!(prompt.contains("\nrawText: make a poem\n"));
        assert!(prompt.contains(REFINED_MARKER));
    }

    #[test]
    fn test_interpret_blank_is_empty_result() {
        let err = RefineKind
            .interpret("Refined Prompt:", &mut SequentialIds::new("r"))
            .unwrap_err();
        assert!(matches!(err, KismetError::EmptyResult(_)));

        let result = RefineKind
            .interpret("Refined Prompt: Describe a sunset.", &mut SequentialIds::new("r"))
            .unwrap();
        assert!(result.title.is_none());
        assert!(RefineKind.natural_key(&result).is_none());
        assert!(matches!(
            &result.segments[0],
            Segment::Text { text, .. } if text == "Describe a sunset."
        ));
    }
}
