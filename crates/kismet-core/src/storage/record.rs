//! Row mapping for the saved-record tables.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::model::{
    ImageTag, SavedImage, SavedProblem, SavedRecipe, SavedStory, StoredSegmentKind, Unsaved,
};

/// A record type with a table of its own and a unique natural key.
///
/// `COLUMNS` excludes `id`; rows are always selected as `id, COLUMNS...` and
/// [`to_params`](Record::to_params) yields values in `COLUMNS` order.
pub trait Record: Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;
    const COLUMNS: &'static [&'static str];
    /// `false` for records that have no table: reads come back empty and
    /// saves are refused.
    const STORED: bool = true;

    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
    fn natural_key(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    /// Files owned by this record.
    fn asset_paths(&self) -> Vec<PathBuf>;
    fn to_params(&self) -> Result<Vec<Value>>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub(crate) fn select_columns<R: Record>() -> String {
    std::iter::once("id")
        .chain(R::COLUMNS.iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
}

// -- Value helpers --

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(text).unwrap_or(Value::Null)
}

fn opt_path(p: Option<&PathBuf>) -> Value {
    p.map(|p| Value::Text(p.to_string_lossy().into_owned()))
        .unwrap_or(Value::Null)
}

fn json<T: Serialize>(v: &T) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(v)?))
}

pub(crate) fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_path(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<PathBuf>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(PathBuf::from))
}

// -- Impls --

impl Record for SavedRecipe {
    const TABLE: &'static str = "recipes";
    const KEY_COLUMN: &'static str = "recipe_name";
    const COLUMNS: &'static [&'static str] = &[
        "recipe_name",
        "image_path",
        "image_prompt",
        "yield_amount",
        "prep_time",
        "cook_time",
        "description",
        "ingredients",
        "instructions",
        "region_filter",
        "ingredients_filter",
        "other_considerations_filter",
        "created_at",
    ];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn natural_key(&self) -> &str {
        &self.recipe_name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn asset_paths(&self) -> Vec<PathBuf> {
        self.image_path.iter().cloned().collect()
    }

    fn to_params(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.recipe_name),
            opt_path(self.image_path.as_ref()),
            opt_text(self.image_prompt.as_deref()),
            opt_text(self.yield_amount.as_deref()),
            opt_text(self.prep_time.as_deref()),
            opt_text(self.cook_time.as_deref()),
            opt_text(self.description.as_deref()),
            json(&self.ingredients)?,
            json(&self.instructions)?,
            opt_text(self.region_filter.as_deref()),
            opt_text(self.ingredients_filter.as_deref()),
            opt_text(self.other_considerations_filter.as_deref()),
            Value::Text(timestamp(&self.created_at)),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            recipe_name: row.get(1)?,
            image_path: get_opt_path(row, 2)?,
            image_prompt: row.get(3)?,
            yield_amount: row.get(4)?,
            prep_time: row.get(5)?,
            cook_time: row.get(6)?,
            description: row.get(7)?,
            ingredients: get_json(row, 8)?,
            instructions: get_json(row, 9)?,
            region_filter: row.get(10)?,
            ingredients_filter: row.get(11)?,
            other_considerations_filter: row.get(12)?,
            created_at: get_timestamp(row, 13)?,
        })
    }
}

impl Record for SavedImage {
    const TABLE: &'static str = "images";
    const KEY_COLUMN: &'static str = "image_prompt";
    const COLUMNS: &'static [&'static str] =
        &["image_prompt", "image_path", "model", "tag", "created_at"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn natural_key(&self) -> &str {
        &self.image_prompt
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn asset_paths(&self) -> Vec<PathBuf> {
        vec![self.image_path.clone()]
    }

    fn to_params(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.image_prompt),
            opt_path(Some(&self.image_path)),
            opt_text(self.model.as_deref()),
            text(self.tag.as_str()),
            Value::Text(timestamp(&self.created_at)),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tag: String = row.get(4)?;
        Ok(Self {
            id: Some(row.get(0)?),
            image_prompt: row.get(1)?,
            image_path: PathBuf::from(row.get::<_, String>(2)?),
            model: row.get(3)?,
            tag: tag.parse().unwrap_or(ImageTag::Keyword),
            created_at: get_timestamp(row, 5)?,
        })
    }
}

impl Record for SavedStory {
    const TABLE: &'static str = "stories";
    const KEY_COLUMN: &'static str = "title";
    const COLUMNS: &'static [&'static str] = &["title", "segments", "created_at"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn natural_key(&self) -> &str {
        &self.title
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn asset_paths(&self) -> Vec<PathBuf> {
        self.segments
            .iter()
            .filter(|s| s.kind == StoredSegmentKind::Image)
            .filter_map(|s| s.image_path.clone())
            .collect()
    }

    fn to_params(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.title),
            json(&self.segments)?,
            Value::Text(timestamp(&self.created_at)),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            segments: get_json(row, 2)?,
            created_at: get_timestamp(row, 3)?,
        })
    }
}

impl Record for SavedProblem {
    const TABLE: &'static str = "problems";
    const KEY_COLUMN: &'static str = "title";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "statement",
        "data_structure",
        "algorithm",
        "language",
        "complexity",
        "created_at",
    ];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn natural_key(&self) -> &str {
        &self.title
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn asset_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn to_params(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.title),
            text(&self.statement),
            opt_text(self.data_structure.as_deref()),
            opt_text(self.algorithm.as_deref()),
            opt_text(self.language.as_deref()),
            opt_text(self.complexity.as_deref()),
            Value::Text(timestamp(&self.created_at)),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            statement: row.get(2)?,
            data_structure: row.get(3)?,
            algorithm: row.get(4)?,
            language: row.get(5)?,
            complexity: row.get(6)?,
            created_at: get_timestamp(row, 7)?,
        })
    }
}

impl Record for Unsaved {
    const TABLE: &'static str = "unsaved";
    const KEY_COLUMN: &'static str = "key";
    const COLUMNS: &'static [&'static str] = &[];
    const STORED: bool = false;

    fn id(&self) -> Option<i64> {
        match *self {}
    }

    fn set_id(&mut self, _id: i64) {
        match *self {}
    }

    fn natural_key(&self) -> &str {
        match *self {}
    }

    fn created_at(&self) -> DateTime<Utc> {
        match *self {}
    }

    fn asset_paths(&self) -> Vec<PathBuf> {
        match *self {}
    }

    fn to_params(&self) -> Result<Vec<Value>> {
        match *self {}
    }

    fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
        Err(rusqlite::Error::QueryReturnedNoRows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredSegment;

    #[test]
    fn test_params_match_columns() {
        let recipe = SavedRecipe::new("Soup");
        assert_eq!(recipe.to_params().unwrap().len(), SavedRecipe::COLUMNS.len());
        let image = SavedImage::new("cat", "/tmp/cat.png", ImageTag::Color);
        assert_eq!(image.to_params().unwrap().len(), SavedImage::COLUMNS.len());
        let story = SavedStory::new("T", vec![]);
        assert_eq!(story.to_params().unwrap().len(), SavedStory::COLUMNS.len());
        let problem = SavedProblem::new("Two Sum", "...");
        assert_eq!(problem.to_params().unwrap().len(), SavedProblem::COLUMNS.len());
    }

    #[test]
    fn test_select_columns_starts_with_id() {
        assert_eq!(
            select_columns::<SavedStory>(),
            "id, title, segments, created_at"
        );
    }

    #[test]
    fn test_story_assets_are_image_segments_only() {
        let story = SavedStory::new(
            "T",
            vec![
                StoredSegment {
                    item_id: "a".into(),
                    kind: StoredSegmentKind::Text,
                    position: 0,
                    text: Some("hello".into()),
                    image_path: None,
                    image_prompt: None,
                },
                StoredSegment {
                    item_id: "b".into(),
                    kind: StoredSegmentKind::Image,
                    position: 1,
                    text: None,
                    image_path: Some(PathBuf::from("/tmp/b.png")),
                    image_prompt: Some("a cat".into()),
                },
                StoredSegment {
                    item_id: "c".into(),
                    kind: StoredSegmentKind::Image,
                    position: 2,
                    text: None,
                    image_path: None,
                    image_prompt: Some("a dog".into()),
                },
            ],
        );
        assert_eq!(story.asset_paths(), vec![PathBuf::from("/tmp/b.png")]);
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let a = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2024-01-01T00:00:01Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(timestamp(&a) < timestamp(&b));
        assert_eq!(timestamp(&a), "2024-01-01T00:00:00.500000Z");
    }
}
