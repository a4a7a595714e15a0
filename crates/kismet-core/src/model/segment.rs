use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a segment within one result.
///
/// Used for list diffing and for routing an async image resolution back to
/// the segment that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to binary image data held by the file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(PathBuf);

impl AssetRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// One structured unit extracted from a generated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text {
        id: SegmentId,
        text: String,
        order: u32,
    },
    /// A labeled value such as "Prep Time: 15 minutes".
    Field {
        id: SegmentId,
        label: String,
        value: String,
        order: u32,
    },
    ImagePrompt {
        id: SegmentId,
        prompt: String,
        order: u32,
        #[serde(default)]
        resolved: Option<AssetRef>,
        #[serde(default)]
        resolving: bool,
    },
}

impl Segment {
    pub fn text(id: SegmentId, text: impl Into<String>, order: u32) -> Self {
        Self::Text {
            id,
            text: text.into(),
            order,
        }
    }

    pub fn field(id: SegmentId, label: impl Into<String>, value: impl Into<String>, order: u32) -> Self {
        Self::Field {
            id,
            label: label.into(),
            value: value.into(),
            order,
        }
    }

    pub fn image_prompt(id: SegmentId, prompt: impl Into<String>, order: u32) -> Self {
        Self::ImagePrompt {
            id,
            prompt: prompt.into(),
            order,
            resolved: None,
            resolving: false,
        }
    }

    pub fn id(&self) -> &SegmentId {
        match self {
            Self::Text { id, .. } | Self::Field { id, .. } | Self::ImagePrompt { id, .. } => id,
        }
    }

    pub fn order(&self) -> u32 {
        match self {
            Self::Text { order, .. }
            | Self::Field { order, .. }
            | Self::ImagePrompt { order, .. } => *order,
        }
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self, Self::ImagePrompt { resolving: true, .. })
    }

    /// The prompt of an image segment, `None` for other variants.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::ImagePrompt { prompt, .. } => Some(prompt),
            _ => None,
        }
    }
}

/// Structured outcome of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub title: Option<String>,
    pub segments: Vec<Segment>,
    pub created_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn new(title: Option<String>, segments: Vec<Segment>) -> Self {
        Self {
            title,
            segments,
            created_at: Utc::now(),
        }
    }

    pub fn segment(&self, id: &SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    /// Value of the first field segment with the given label.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Field {
                label: l, value, ..
            } if l == label => Some(value.as_str()),
            _ => None,
        })
    }

    /// Image segments that have no asset yet and are not being resolved.
    pub fn unresolved_prompts(&self) -> Vec<(SegmentId, String)> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::ImagePrompt {
                    id,
                    prompt,
                    resolved: None,
                    resolving: false,
                    ..
                } => Some((id.clone(), prompt.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn any_resolving(&self) -> bool {
        self.segments.iter().any(Segment::is_resolving)
    }
}
