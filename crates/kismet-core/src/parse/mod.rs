//! Line-oriented segmentation of generated text.
//!
//! A response is scanned line by line. A line that starts with a known label
//! followed by `:` closes the open block and starts a new one; any other line
//! is appended to the open block. The title label sets the result title and
//! never becomes a segment.

mod problem;
mod recipe;

pub use problem::{extract_problem_title, PROBLEM_TITLE_PATTERN};
pub use recipe::{extract_json_object, parse_recipe_response, RecipeResponse};

use crate::model::{GenerationResult, Segment, SegmentId};

/// Source of segment ids. Injectable so tests get predictable ids.
pub trait IdSource: Send {
    fn next_id(&mut self) -> SegmentId;
}

/// Random ids (UUID v7).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&mut self) -> SegmentId {
        SegmentId::new(uuid::Uuid::now_v7().to_string())
    }
}

/// `"{prefix}-0"`, `"{prefix}-1"`, ...
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self) -> SegmentId {
        let id = SegmentId::new(format!("{}-{}", self.prefix, self.next));
        self.next += 1;
        id
    }
}

/// What to do with lines that appear before any label has opened a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeadingContent {
    /// Drop them. Matches what the app has always done.
    #[default]
    Discard,
    /// Emit them as a text segment ahead of the first labeled block.
    Keep,
}

/// Labels recognised by [`parse_segments`]. Names are matched without the colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    pub title: String,
    pub text: String,
    pub image: String,
    pub leading: LeadingContent,
}

pub const STORY_TITLE_LABEL: &str = "STORY_TITLE";
pub const TEXT_CONTENT_LABEL: &str = "TEXT_CONTENT";
pub const IMAGE_PROMPT_LABEL: &str = "IMAGE_PROMPT";

impl LabelSet {
    pub fn new(title: &str, text: &str, image: &str) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            image: image.to_string(),
            leading: LeadingContent::Discard,
        }
    }

    /// `STORY_TITLE` / `TEXT_CONTENT` / `IMAGE_PROMPT`.
    pub fn story() -> Self {
        Self::new(STORY_TITLE_LABEL, TEXT_CONTENT_LABEL, IMAGE_PROMPT_LABEL)
    }

    pub fn with_leading(mut self, leading: LeadingContent) -> Self {
        self.leading = leading;
        self
    }

    fn classify<'a>(&self, line: &'a str) -> Option<(BlockKind, &'a str)> {
        [
            (BlockKind::Title, self.title.as_str()),
            (BlockKind::Text, self.text.as_str()),
            (BlockKind::Image, self.image.as_str()),
        ]
        .into_iter()
        .find_map(|(kind, label)| {
            line.strip_prefix(label)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|rest| (kind, rest))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Title,
    Text,
    Image,
}

struct Builder<'a> {
    ids: &'a mut dyn IdSource,
    segments: Vec<Segment>,
}

impl Builder<'_> {
    fn flush(&mut self, kind: BlockKind, buffer: &mut String) {
        let body = buffer.trim();
        if !body.is_empty() {
            let order = self.segments.len() as u32;
            let id = self.ids.next_id();
            let segment = match kind {
                BlockKind::Image => Segment::image_prompt(id, body, order),
                BlockKind::Text | BlockKind::Title => Segment::text(id, body, order),
            };
            self.segments.push(segment);
        }
        buffer.clear();
    }
}

/// Split `input` into an ordered list of segments.
///
/// Blocks whose body is blank are skipped. Lines outside any block follow
/// `labels.leading`. The returned result's `created_at` is the parse time.
pub fn parse_segments(input: &str, labels: &LabelSet, ids: &mut dyn IdSource) -> GenerationResult {
    let mut builder = Builder {
        ids,
        segments: Vec::new(),
    };
    let mut title = None;
    let mut open: Option<BlockKind> = None;
    let mut buffer = String::new();
    let mut leading = String::new();

    for line in input.trim().lines() {
        match labels.classify(line) {
            Some((BlockKind::Title, rest)) => {
                let rest = rest.trim();
                if !rest.is_empty() {
                    title = Some(rest.to_string());
                }
            }
            Some((kind, rest)) => {
                if let Some(prev) = open.take() {
                    builder.flush(prev, &mut buffer);
                } else if labels.leading == LeadingContent::Keep {
                    builder.flush(BlockKind::Text, &mut leading);
                }
                buffer.push_str(rest.trim());
                buffer.push('\n');
                open = Some(kind);
            }
            None => {
                let target = if open.is_some() { &mut buffer } else { &mut leading };
                target.push_str(line);
                target.push('\n');
            }
        }
    }

    match open {
        Some(kind) => builder.flush(kind, &mut buffer),
        None if labels.leading == LeadingContent::Keep => {
            builder.flush(BlockKind::Text, &mut leading)
        }
        None => {}
    }

    if !leading.trim().is_empty() && labels.leading == LeadingContent::Discard {
        tracing::debug!(
            bytes = leading.trim().len(),
            "discarded content before first label"
        );
    }

    GenerationResult::new(title, builder.segments)
}
