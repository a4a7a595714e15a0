use std::collections::HashMap;
use std::path::PathBuf;

use super::{push_input, push_request, ContentKind};
use crate::error::{KismetError, Result};
use crate::model::{
    AssetRef, GenerationResult, SavedStory, Segment, SegmentId, StoredSegment, StoredSegmentKind,
    StoryInput,
};
use crate::parse::{parse_segments, IdSource, LabelSet, LeadingContent};

const STORY_PROMPT: &str = "\
You are an expert story writer and narrative architect with a strong sense of structure across genres. \
Write an original, vivid story that will be rendered block by block.

Guidelines:
1. Use any of the user inputs listed below. Where one is missing, make a creative, coherent choice that fits the rest.
2. Break the story into logical narrative segments of two or three paragraphs each.
3. After every few key narrative points, insert a visually descriptive image prompt for an image model, \
covering subject, environment, mood and art style.
4. Label every block, each label at the start of its own line:
   STORY_TITLE: [story title]
   TEXT_CONTENT: [narrative text]
   IMAGE_PROMPT: [image description]
5. The response must contain only labeled blocks.

Example:
STORY_TITLE: The Quiet Outpost
TEXT_CONTENT: In a remote Martian outpost, biologist Elara scans the rust-colored horizon for signs of life.
IMAGE_PROMPT: A lone astronaut on a windswept Martian ridge, red dust swirling, dusky alien sky, gritty digital painting.
TEXT_CONTENT: Her discovery could rewrite what humanity knows about life in the universe.";

/// Stories: labeled text blocks with image prompts resolved on demand.
#[derive(Debug, Clone, Default)]
pub struct StoryKind {
    leading: LeadingContent,
}

impl StoryKind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep text that precedes the first label instead of dropping it.
    pub fn with_leading(mut self, leading: LeadingContent) -> Self {
        self.leading = leading;
        self
    }
}

impl ContentKind for StoryKind {
    type Filters = StoryInput;
    type Record = SavedStory;

    const NAME: &'static str = "story";

    fn default_input(&self) -> &'static str {
        "Tell me a story."
    }

    fn compose(&self, input: &str, filters: &StoryInput, _history: &[String]) -> String {
        let mut prompt = STORY_PROMPT.to_string();
        if filters.is_empty() {
            prompt.push_str("\n\n--- No Specific User Inputs Provided ---");
            prompt.push_str("\nUsing default length: 500 words.");
        } else {
            prompt.push_str("\n\n--- User Provided Inputs ---");
            push_input(&mut prompt, "Genre", filters.genre.as_deref());
            push_input(&mut prompt, "Target Audience", filters.target_audience.as_deref());
            push_input(&mut prompt, "Core Premise", filters.core_premise.as_deref());
            let elements = &filters.key_elements;
            if !elements.is_empty() {
                prompt.push_str("\nKey Elements:");
                push_input(&mut prompt, "  Protagonist", elements.protagonist.as_deref());
                push_input(&mut prompt, "  Antagonist", elements.antagonist.as_deref());
                push_input(&mut prompt, "  Setting", elements.setting.as_deref());
                push_input(&mut prompt, "  Conflict", elements.conflict.as_deref());
                if !elements.themes.is_empty() {
                    push_input(&mut prompt, "  Themes", Some(elements.themes.join(", ").as_str()));
                }
                push_input(&mut prompt, "  Mood/Tone", elements.mood_tone.as_deref());
            }
            push_input(&mut prompt, "Length", filters.length.as_deref());
            push_input(&mut prompt, "Output Format", filters.output_format.as_deref());
            push_input(&mut prompt, "Language", filters.language.as_deref());
        }
        push_request(&mut prompt, input, self.default_input());
        prompt
    }

    fn interpret(&self, response: &str, ids: &mut dyn IdSource) -> Result<GenerationResult> {
        let labels = LabelSet::story().with_leading(self.leading);
        let result = parse_segments(response, &labels, ids);
        if result.segments.is_empty() {
            return Err(KismetError::Parse("story response has no labeled blocks".into()));
        }
        Ok(result)
    }

    fn to_record(
        &self,
        result: &GenerationResult,
        _filters: &StoryInput,
        assets: &HashMap<SegmentId, PathBuf>,
    ) -> Result<SavedStory> {
        let title = self
            .natural_key(result)
            .ok_or_else(|| KismetError::InvalidInput("Story has no title to save under".into()))?;

        let segments = result
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Text { id, text, order } => StoredSegment {
                    item_id: id.to_string(),
                    kind: StoredSegmentKind::Text,
                    position: *order,
                    text: Some(text.clone()),
                    image_path: None,
                    image_prompt: None,
                },
                Segment::Field {
                    id,
                    label,
                    value,
                    order,
                } => StoredSegment {
                    item_id: id.to_string(),
                    kind: StoredSegmentKind::Text,
                    position: *order,
                    text: Some(format!("{label}: {value}")),
                    image_path: None,
                    image_prompt: None,
                },
                Segment::ImagePrompt {
                    id,
                    prompt,
                    order,
                    resolved,
                    ..
                } => StoredSegment {
                    item_id: id.to_string(),
                    kind: StoredSegmentKind::Image,
                    position: *order,
                    text: None,
                    image_path: assets
                        .get(id)
                        .cloned()
                        .or_else(|| resolved.as_ref().map(|a| a.path().to_path_buf())),
                    image_prompt: Some(prompt.clone()),
                },
            })
            .collect();

        Ok(SavedStory::new(title, segments))
    }

    fn from_record(&self, record: &SavedStory) -> (GenerationResult, StoryInput) {
        let mut stored: Vec<&StoredSegment> = record.segments.iter().collect();
        stored.sort_by_key(|s| s.position);

        let segments = stored
            .into_iter()
            .map(|s| {
                let id = SegmentId::new(s.item_id.clone());
                match s.kind {
                    StoredSegmentKind::Text => {
                        Segment::text(id, s.text.clone().unwrap_or_default(), s.position)
                    }
                    StoredSegmentKind::Image => Segment::ImagePrompt {
                        id,
                        prompt: s.image_prompt.clone().unwrap_or_default(),
                        order: s.position,
                        resolved: s.image_path.as_ref().map(AssetRef::new),
                        resolving: false,
                    },
                }
            })
            .collect();

        let mut result = GenerationResult::new(Some(record.title.clone()), segments);
        result.created_at = record.created_at;
        (result, StoryInput::default())
    }

    fn asset_dir(&self) -> &'static str {
        "stories"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyElements;
    use crate::parse::SequentialIds;

    const RESPONSE: &str =
        "STORY_TITLE: Foo\nTEXT_CONTENT: Hello\nIMAGE_PROMPT: A cat\nTEXT_CONTENT: World\n";

    #[test]
    fn test_compose_without_inputs_uses_default_length() {
        let prompt = StoryKind::new().compose("Tell me a story.", &StoryInput::default(), &[]);
        assert!(prompt.contains("Using default length: 500 words."));
        assert!(!prompt.contains("Request:"));
    }

    #[test]
    fn test_compose_lists_inputs() {
        let input = StoryInput {
            genre: Some("Mystery".into()),
            key_elements: KeyElements {
                themes: vec!["trust".into(), "loss".into()],
                ..Default::default()
            },
            language: Some("French".into()),
            ..Default::default()
        };
        let prompt = StoryKind::new().compose("a lighthouse keeper", &input, &[]);
        assert!(prompt.contains("\nGenre: Mystery"));
        assert!(prompt.contains("\nKey Elements:\n  Themes: trust, loss"));
        assert!(prompt.contains("\nLanguage: French"));
        assert!(prompt.ends_with("\nRequest: a lighthouse keeper"));
        assert!(!prompt.contains("default length"));
    }

    #[test]
    fn test_interpret_story() {
        let result = StoryKind::new()
            .interpret(RESPONSE, &mut SequentialIds::new("s"))
            .unwrap();
        assert_eq!(result.title.as_deref(), Some("Foo"));
        assert_eq!(result.segments.len(), 3);
    }

    #[test]
    fn test_interpret_without_labels_is_parse_failure() {
        let err = StoryKind::new()
            .interpret("Once upon a time.", &mut SequentialIds::new("s"))
            .unwrap_err();
        assert!(matches!(err, KismetError::Parse(_)));
    }

    #[test]
    fn test_record_roundtrip_drops_resolution_state() {
        let kind = StoryKind::new();
        let mut result = kind.interpret(RESPONSE, &mut SequentialIds::new("s")).unwrap();
        if let Segment::ImagePrompt { resolving, .. } = &mut result.segments[1] {
            *resolving = true;
        }
        let assets = HashMap::from([(SegmentId::from("s-1"), PathBuf::from("/saved/cat.png"))]);

        let record = kind.to_record(&result, &StoryInput::default(), &assets).unwrap();
        assert_eq!(record.title, "Foo");
        assert_eq!(record.segments[1].image_path, Some(PathBuf::from("/saved/cat.png")));

        let (restored, _) = kind.from_record(&record);
        assert_eq!(restored.title, result.title);
        assert_eq!(restored.segments[0], result.segments[0]);
        assert_eq!(restored.segments[2], result.segments[2]);
        assert_eq!(
            restored.segments[1],
            Segment::ImagePrompt {
                id: "s-1".into(),
                prompt: "A cat".into(),
                order: 1,
                resolved: Some(AssetRef::new("/saved/cat.png")),
                resolving: false,
            }
        );
    }

    #[test]
    fn test_untitled_story_cannot_be_saved() {
        let kind = StoryKind::new();
        let result = kind
            .interpret("TEXT_CONTENT: Hello", &mut SequentialIds::new("s"))
            .unwrap();
        let err = kind
            .to_record(&result, &StoryInput::default(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, KismetError::InvalidInput(_)));
    }
}
