use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved recipe. Natural key: `recipe_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecipe {
    pub id: Option<i64>,
    pub recipe_name: String,
    pub image_path: Option<PathBuf>,
    pub image_prompt: Option<String>,
    pub yield_amount: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub region_filter: Option<String>,
    pub ingredients_filter: Option<String>,
    pub other_considerations_filter: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SavedRecipe {
    pub fn new(recipe_name: impl Into<String>) -> Self {
        Self {
            id: None,
            recipe_name: recipe_name.into(),
            image_path: None,
            image_prompt: None,
            yield_amount: None,
            prep_time: None,
            cook_time: None,
            description: None,
            ingredients: Vec::new(),
            instructions: Vec::new(),
            region_filter: None,
            ingredients_filter: None,
            other_considerations_filter: None,
            created_at: Utc::now(),
        }
    }
}

/// How a saved image came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageTag {
    /// Prompt written by the text service, optionally from keywords.
    Keyword,
    /// Prompt composed locally from a color palette.
    Color,
}

impl ImageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Color => "color",
        }
    }
}

impl std::str::FromStr for ImageTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "color" => Ok(Self::Color),
            other => Err(format!("unknown image tag: {other}")),
        }
    }
}

/// A saved image. Natural key: `image_prompt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedImage {
    pub id: Option<i64>,
    pub image_prompt: String,
    pub image_path: PathBuf,
    pub model: Option<String>,
    pub tag: ImageTag,
    pub created_at: DateTime<Utc>,
}

impl SavedImage {
    pub fn new(image_prompt: impl Into<String>, image_path: impl Into<PathBuf>, tag: ImageTag) -> Self {
        Self {
            id: None,
            image_prompt: image_prompt.into(),
            image_path: image_path.into(),
            model: None,
            tag,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredSegmentKind {
    Text,
    Image,
}

/// Persisted form of one story segment. Resolution state is not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSegment {
    pub item_id: String,
    pub kind: StoredSegmentKind,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

/// A saved story. Natural key: `title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedStory {
    pub id: Option<i64>,
    pub title: String,
    pub segments: Vec<StoredSegment>,
    pub created_at: DateTime<Utc>,
}

impl SavedStory {
    pub fn new(title: impl Into<String>, segments: Vec<StoredSegment>) -> Self {
        Self {
            id: None,
            title: title.into(),
            segments,
            created_at: Utc::now(),
        }
    }
}

/// A saved programming problem. Natural key: `title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProblem {
    pub id: Option<i64>,
    pub title: String,
    pub statement: String,
    pub data_structure: Option<String>,
    pub algorithm: Option<String>,
    pub language: Option<String>,
    pub complexity: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SavedProblem {
    pub fn new(title: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            statement: statement.into(),
            data_structure: None,
            algorithm: None,
            language: None,
            complexity: None,
            created_at: Utc::now(),
        }
    }
}

/// Record type of content that is never kept. It has no values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Unsaved {}
