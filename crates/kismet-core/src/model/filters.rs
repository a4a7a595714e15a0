use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Parameters a screen feeds into prompt composition.
pub trait FilterParams:
    Clone + Default + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// One-line description of the active filters, `None` when nothing is set.
    fn summary(&self) -> Option<String>;
}

/// Join the non-blank `(label, value)` pairs into `"label: value, ..."`.
fn summarize(pairs: &[(&str, Option<&str>)]) -> Option<String> {
    let parts: Vec<String> = pairs
        .iter()
        .filter_map(|(label, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| format!("{label}: {v}"))
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeFilters {
    pub region: Option<String>,
    /// Comma-separated key ingredients.
    pub ingredients: Option<String>,
    pub other_considerations: Option<String>,
}

impl FilterParams for RecipeFilters {
    fn summary(&self) -> Option<String> {
        summarize(&[
            ("Region", self.region.as_deref()),
            ("Ingredients", self.ingredients.as_deref()),
            ("Other", self.other_considerations.as_deref()),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyElements {
    pub protagonist: Option<String>,
    pub antagonist: Option<String>,
    pub setting: Option<String>,
    pub conflict: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    pub mood_tone: Option<String>,
}

impl KeyElements {
    pub fn is_empty(&self) -> bool {
        self.protagonist.is_none()
            && self.antagonist.is_none()
            && self.setting.is_none()
            && self.conflict.is_none()
            && self.themes.is_empty()
            && self.mood_tone.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryInput {
    pub genre: Option<String>,
    pub target_audience: Option<String>,
    pub core_premise: Option<String>,
    #[serde(default)]
    pub key_elements: KeyElements,
    pub length: Option<String>,
    pub output_format: Option<String>,
    pub language: Option<String>,
}

impl StoryInput {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl FilterParams for StoryInput {
    fn summary(&self) -> Option<String> {
        summarize(&[
            ("Genre", self.genre.as_deref()),
            ("Audience", self.target_audience.as_deref()),
            ("Length", self.length.as_deref()),
            ("Language", self.language.as_deref()),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFilters {
    pub keywords: Option<String>,
    /// Hex colors such as `#1A2B3C`. A non-empty palette switches to color mode.
    #[serde(default)]
    pub palette: Vec<String>,
}

impl FilterParams for ImageFilters {
    fn summary(&self) -> Option<String> {
        let palette = (!self.palette.is_empty()).then(|| self.palette.join(" "));
        summarize(&[
            ("Keywords", self.keywords.as_deref()),
            ("Palette", palette.as_deref()),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemFilters {
    pub data_structure: Option<String>,
    pub algorithm: Option<String>,
    pub language: Option<String>,
    pub complexity: Option<String>,
    pub other_considerations: Option<String>,
}

impl FilterParams for ProblemFilters {
    fn summary(&self) -> Option<String> {
        summarize(&[
            ("Data structure", self.data_structure.as_deref()),
            ("Algorithm", self.algorithm.as_deref()),
            ("Language", self.language.as_deref()),
            ("Complexity", self.complexity.as_deref()),
            ("Other", self.other_considerations.as_deref()),
        ])
    }
}

/// Filters of a screen that takes nothing but its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoFilters;

impl FilterParams for NoFilters {
    fn summary(&self) -> Option<String> {
        None
    }
}
