//! Saved stories as standalone HTML documents.

use std::path::{Path, PathBuf};

use askama::Template;

use crate::error::Result;
use crate::files::{slug, FileStore};
use crate::model::{SavedStory, StoredSegmentKind};

/// Subdirectory of the file root used when no output path is given.
pub const EXPORT_DIR: &str = "exports";

#[derive(Template)]
#[template(path = "story.html")]
struct StoryTemplate<'a> {
    title: &'a str,
    blocks: Vec<Block>,
}

struct Block {
    is_image: bool,
    text: String,
    src: String,
    caption: String,
}

/// Title followed by the segments in position order. Image segments
/// reference their saved file; one without a file keeps only its caption.
pub fn render_story_html(story: &SavedStory) -> Result<String> {
    let mut segments: Vec<_> = story.segments.iter().collect();
    segments.sort_by_key(|s| s.position);

    let blocks = segments
        .into_iter()
        .map(|s| match s.kind {
            StoredSegmentKind::Text => Block {
                is_image: false,
                text: s.text.clone().unwrap_or_default(),
                src: String::new(),
                caption: String::new(),
            },
            StoredSegmentKind::Image => Block {
                is_image: true,
                text: String::new(),
                src: s
                    .image_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                caption: s.image_prompt.clone().unwrap_or_default(),
            },
        })
        .collect();

    let template = StoryTemplate {
        title: &story.title,
        blocks,
    };
    Ok(template.render()?)
}

/// Write `story` as HTML to `out`, or to `<root>/exports/<title>.html`.
/// Images whose files are gone are left out. Returns the written path.
pub async fn export_story(files: &FileStore, story: &SavedStory, out: Option<&Path>) -> Result<PathBuf> {
    let mut story = story.clone();
    for segment in &mut story.segments {
        if let Some(path) = &segment.image_path {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                tracing::warn!(path = %path.display(), "story image missing, exporting caption only");
                segment.image_path = None;
            }
        }
    }

    let html = render_story_html(&story)?;
    let target = match out {
        Some(path) => path.to_path_buf(),
        None => files
            .root()
            .join(EXPORT_DIR)
            .join(format!("{}.html", slug(&story.title))),
    };
    let path = files.save(html.as_bytes(), &target).await?;
    tracing::info!(path = %path.display(), "story exported");
    Ok(path)
}
