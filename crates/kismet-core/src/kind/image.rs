use std::collections::HashMap;
use std::path::PathBuf;

use super::{push_input, push_request, ContentKind};
use crate::error::{KismetError, Result};
use crate::model::{
    AssetRef, GenerationResult, ImageFilters, ImageTag, SavedImage, Segment, SegmentId,
};
use crate::parse::{IdSource, SequentialIds};

const KEYWORD_PROMPT: &str = "\
As an expert AI image prompt writer, create a single, highly descriptive and imaginative text prompt \
for an image generation model.

Requirements:
1. Describe a unique, vivid scene: main subject, action, setting, lighting, mood and an identifiable art style.
2. If keywords are given, make them central to the scene. Without keywords, explore any subject or style.
3. Output only the prompt as one continuous line of text, with no quotes, labels or commentary.";

/// Prompt that asks for an artwork built only from `palette`.
pub fn color_prompt(palette: &[String]) -> String {
    format!(
        "Create a high-resolution, imaginative digital artwork using only the following color palette: {}.\n\
         The image must rely on these colors as its primary visual language.\n\
         The subject and composition should be creative and unpredictable: stylized characters, whimsical animals, \
         abstract shapes, dreamlike landscapes, retro-futuristic tech or anything that evokes emotion, charm, mystery or fun.\n\
         Avoid standard natural landscapes unless creatively reinterpreted.\n\
         Use textures such as soft gradients, painterly brushwork or grain to add depth, in a distinctive style \
         (concept art, cel-shading, 2D flat, surreal digital painting).",
        palette.join(", ")
    )
}

/// Standalone images, from keywords (via the text service) or a color palette.
#[derive(Debug, Clone, Default)]
pub struct ImageKind {
    model: Option<String>,
}

impl ImageKind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image model name recorded with saved images.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn single(prompt: String, ids: &mut dyn IdSource) -> GenerationResult {
        GenerationResult::new(None, vec![Segment::image_prompt(ids.next_id(), prompt, 0)])
    }
}

impl ContentKind for ImageKind {
    type Filters = ImageFilters;
    type Record = SavedImage;

    const NAME: &'static str = "image";

    fn default_input(&self) -> &'static str {
        "Surprise me."
    }

    fn compose(&self, input: &str, filters: &ImageFilters, _history: &[String]) -> String {
        let mut prompt = KEYWORD_PROMPT.to_string();
        push_input(&mut prompt, "Keywords", filters.keywords.as_deref());
        push_request(&mut prompt, input, self.default_input());
        prompt
    }

    fn direct(
        &self,
        _input: &str,
        filters: &ImageFilters,
        ids: &mut dyn IdSource,
    ) -> Option<GenerationResult> {
        (!filters.palette.is_empty()).then(|| Self::single(color_prompt(&filters.palette), ids))
    }

    fn interpret(&self, response: &str, ids: &mut dyn IdSource) -> Result<GenerationResult> {
        let prompt = response
            .trim()
            .trim_matches(|c: char| c == '"' || c == '`')
            .trim();
        if prompt.is_empty() {
            return Err(KismetError::Parse("image prompt response is empty".into()));
        }
        Ok(Self::single(prompt.to_string(), ids))
    }

    fn auto_resolve(&self) -> bool {
        true
    }

    fn natural_key(&self, result: &GenerationResult) -> Option<String> {
        result
            .segments
            .iter()
            .find_map(Segment::prompt)
            .map(str::to_string)
    }

    fn to_record(
        &self,
        result: &GenerationResult,
        filters: &ImageFilters,
        assets: &HashMap<SegmentId, PathBuf>,
    ) -> Result<SavedImage> {
        let (path, prompt) = result
            .segments
            .iter()
            .find_map(|segment| match segment {
                Segment::ImagePrompt {
                    id,
                    prompt,
                    resolved,
                    ..
                } => assets
                    .get(id)
                    .cloned()
                    .or_else(|| resolved.as_ref().map(|a| a.path().to_path_buf()))
                    .map(|path| (path, prompt.clone())),
                _ => None,
            })
            .ok_or_else(|| KismetError::InvalidInput("The image is not ready yet".into()))?;

        let tag = if filters.palette.is_empty() {
            ImageTag::Keyword
        } else {
            ImageTag::Color
        };
        let mut record = SavedImage::new(prompt, path, tag);
        record.model = self.model.clone();
        Ok(record)
    }

    fn from_record(&self, record: &SavedImage) -> (GenerationResult, ImageFilters) {
        let id = SequentialIds::new("saved").next_id();
        let segment = Segment::ImagePrompt {
            id,
            prompt: record.image_prompt.clone(),
            order: 0,
            resolved: Some(AssetRef::new(record.image_path.clone())),
            resolving: false,
        };
        let mut result = GenerationResult::new(None, vec![segment]);
        result.created_at = record.created_at;
        (result, ImageFilters::default())
    }

    fn asset_dir(&self) -> &'static str {
        "images"
    }
}
