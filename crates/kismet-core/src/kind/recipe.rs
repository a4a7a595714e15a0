use std::collections::HashMap;
use std::path::PathBuf;

use super::{push_input, push_request, ContentKind};
use crate::error::{KismetError, Result};
use crate::model::{
    AssetRef, GenerationResult, RecipeFilters, SavedRecipe, Segment, SegmentId,
};
use crate::parse::{parse_recipe_response, IdSource, SequentialIds};

/// Message shown when the recipe JSON cannot be read.
pub const RECIPE_UNAVAILABLE: &str = "Unable to get the recipe. Please try again!";

const YIELD: &str = "Yield";
const PREP_TIME: &str = "Prep Time";
const COOK_TIME: &str = "Cook Time";
const INGREDIENTS: &str = "Ingredients";
const INSTRUCTIONS: &str = "Instructions";

const RECIPE_PROMPT: &str = r#"You are a highly creative culinary expert and recipe generator. Provide a complete, practical and edible recipe based on the user's specifications.

Input parameters (all optional):
* region: a regional cuisine such as "Italian", "Mexican", "Thai" or "Mediterranean".
* ingredients: a comma-separated list of key ingredients to feature.
* other considerations: anything else the user asked for.

Recipe selection:
* With a region, pick a random recipe characteristic of that cuisine.
* With ingredients, pick a random recipe that features them prominently. Common pantry staples may be added.
* With both, integrate the ingredients within the regional cuisine.
* With neither, pick a truly random recipe from any cuisine, varying dish type and origin between requests.

Respond with a single JSON object and nothing else:
{
  "recipeTitle": "RECIPE NAME",
  "description": "A short overview of the dish.",
  "yield": "Serves X",
  "prepTime": "XX minutes",
  "cookTime": "XX minutes",
  "ingredients": ["1 tbsp olive oil", "2 garlic cloves, minced"],
  "instructions": ["Heat the olive oil in a large pan over medium heat.", "Add the garlic."],
  "imagePrompt": "An image prompt for a photo of the finished dish."
}

Constraint: the recipe must be feasible for a home cook with commonly available ingredients and equipment unless the user asks otherwise."#;

/// Recipes: a JSON response turned into labeled fields plus one dish image.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeKind;

impl RecipeKind {
    pub fn new() -> Self {
        Self
    }
}

impl ContentKind for RecipeKind {
    type Filters = RecipeFilters;
    type Record = SavedRecipe;

    const NAME: &'static str = "recipe";

    fn default_input(&self) -> &'static str {
        "Suggest a recipe."
    }

    fn compose(&self, input: &str, filters: &RecipeFilters, _history: &[String]) -> String {
        let mut prompt = RECIPE_PROMPT.to_string();
        prompt.push('\n');
        push_input(&mut prompt, "Region", filters.region.as_deref());
        push_input(&mut prompt, "Ingredients", filters.ingredients.as_deref());
        push_input(
            &mut prompt,
            "Other considerations",
            filters.other_considerations.as_deref(),
        );
        push_request(&mut prompt, input, self.default_input());
        prompt
    }

    fn interpret(&self, response: &str, ids: &mut dyn IdSource) -> Result<GenerationResult> {
        let recipe = parse_recipe_response(response)?;
        let mut segments = Vec::new();
        let mut next = |segments: &Vec<Segment>| (ids.next_id(), segments.len() as u32);

        if let Some(description) = non_blank(recipe.description.as_deref()) {
            let (id, order) = next(&segments);
            segments.push(Segment::text(id, description, order));
        }
        for (label, value) in [
            (YIELD, recipe.yield_amount.as_deref()),
            (PREP_TIME, recipe.prep_time.as_deref()),
            (COOK_TIME, recipe.cook_time.as_deref()),
        ] {
            if let Some(value) = non_blank(value) {
                let (id, order) = next(&segments);
                segments.push(Segment::field(id, label, value, order));
            }
        }
        if let Some(prompt) = non_blank(recipe.image_prompt.as_deref()) {
            let (id, order) = next(&segments);
            segments.push(Segment::image_prompt(id, prompt, order));
        }
        if !recipe.ingredients.is_empty() {
            let (id, order) = next(&segments);
            segments.push(Segment::field(id, INGREDIENTS, bullets(&recipe.ingredients), order));
        }
        if !recipe.instructions.is_empty() {
            let (id, order) = next(&segments);
            segments.push(Segment::field(id, INSTRUCTIONS, numbered(&recipe.instructions), order));
        }

        Ok(GenerationResult::new(
            Some(recipe.recipe_title.trim().to_string()),
            segments,
        ))
    }

    fn auto_resolve(&self) -> bool {
        true
    }

    fn parse_failure_message(&self) -> &'static str {
        RECIPE_UNAVAILABLE
    }

    fn to_record(
        &self,
        result: &GenerationResult,
        filters: &RecipeFilters,
        assets: &HashMap<SegmentId, PathBuf>,
    ) -> Result<SavedRecipe> {
        let name = self
            .natural_key(result)
            .ok_or_else(|| KismetError::InvalidInput("Recipe has no name to save under".into()))?;

        let mut record = SavedRecipe::new(name);
        for segment in &result.segments {
            match segment {
                Segment::Text { text, .. } if record.description.is_none() => {
                    record.description = Some(text.clone());
                }
                Segment::ImagePrompt {
                    id,
                    prompt,
                    resolved,
                    ..
                } => {
                    record.image_prompt = Some(prompt.clone());
                    record.image_path = assets
                        .get(id)
                        .cloned()
                        .or_else(|| resolved.as_ref().map(|a| a.path().to_path_buf()));
                }
                _ => {}
            }
        }
        record.yield_amount = result.field(YIELD).map(str::to_string);
        record.prep_time = result.field(PREP_TIME).map(str::to_string);
        record.cook_time = result.field(COOK_TIME).map(str::to_string);
        record.ingredients = result.field(INGREDIENTS).map(unlist).unwrap_or_default();
        record.instructions = result.field(INSTRUCTIONS).map(unlist).unwrap_or_default();
        record.region_filter = filters.region.clone();
        record.ingredients_filter = filters.ingredients.clone();
        record.other_considerations_filter = filters.other_considerations.clone();
        Ok(record)
    }

    fn from_record(&self, record: &SavedRecipe) -> (GenerationResult, RecipeFilters) {
        let mut ids = SequentialIds::new("saved");
        let mut segments = Vec::new();
        let mut next = |segments: &Vec<Segment>| (ids.next_id(), segments.len() as u32);

        if let Some(description) = non_blank(record.description.as_deref()) {
            let (id, order) = next(&segments);
            segments.push(Segment::text(id, description, order));
        }
        for (label, value) in [
            (YIELD, record.yield_amount.as_deref()),
            (PREP_TIME, record.prep_time.as_deref()),
            (COOK_TIME, record.cook_time.as_deref()),
        ] {
            if let Some(value) = non_blank(value) {
                let (id, order) = next(&segments);
                segments.push(Segment::field(id, label, value, order));
            }
        }
        if let Some(prompt) = non_blank(record.image_prompt.as_deref()) {
            let (id, order) = next(&segments);
            segments.push(Segment::ImagePrompt {
                id,
                prompt: prompt.to_string(),
                order,
                resolved: record.image_path.as_ref().map(AssetRef::new),
                resolving: false,
            });
        }
        if !record.ingredients.is_empty() {
            let (id, order) = next(&segments);
            segments.push(Segment::field(id, INGREDIENTS, bullets(&record.ingredients), order));
        }
        if !record.instructions.is_empty() {
            let (id, order) = next(&segments);
            segments.push(Segment::field(id, INSTRUCTIONS, numbered(&record.instructions), order));
        }

        let mut result = GenerationResult::new(Some(record.recipe_name.clone()), segments);
        result.created_at = record.created_at;
        let filters = RecipeFilters {
            region: record.region_filter.clone(),
            ingredients: record.ingredients_filter.clone(),
            other_considerations: record.other_considerations_filter.clone(),
        };
        (result, filters)
    }

    fn asset_dir(&self) -> &'static str {
        "recipes"
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`bullets`] and [`numbered`].
fn unlist(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if let Some(rest) = line.strip_prefix("- ") {
                return rest.to_string();
            }
            match line.split_once(". ") {
                Some((n, rest)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
                    rest.to_string()
                }
                _ => line.to_string(),
            }
        })
        .collect()
}

/// Markdown with an "Ingredients" bullet list and numbered "Instructions".
pub fn recipe_markdown(ingredients: &[String], instructions: &[String]) -> String {
    let mut out = String::new();
    if !ingredients.is_empty() {
        out.push_str("## Ingredients\n\n");
        out.push_str(&bullets(ingredients));
        out.push('\n');
    }
    if !instructions.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("## Instructions\n\n");
        out.push_str(&numbered(instructions));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"Here you go!
```json
{
  "recipeTitle": "Green Curry",
  "description": "Fragrant and mild.",
  "yield": "Serves 4",
  "prepTime": "15 minutes",
  "cookTime": "",
  "ingredients": ["1 tbsp oil", "2 tbsp curry paste"],
  "instructions": ["Heat the oil.", "Fry the paste."],
  "imagePrompt": "A bowl of green curry"
}
```"#;

    fn interpret() -> GenerationResult {
        RecipeKind
            .interpret(RESPONSE, &mut SequentialIds::new("r"))
            .unwrap()
    }

    #[test]
    fn test_interpret_builds_fields_in_order() {
        let result = interpret();
        assert_eq!(result.title.as_deref(), Some("Green Curry"));
        assert_eq!(result.field(YIELD), Some("Serves 4"));
        assert_eq!(result.field(COOK_TIME), None);
        assert_eq!(
            result.field(INGREDIENTS),
            Some("- 1 tbsp oil\n- 2 tbsp curry paste")
        );
        assert_eq!(
            result.field(INSTRUCTIONS),
            Some("1. Heat the oil.\n2. Fry the paste.")
        );
        assert_eq!(result.unresolved_prompts().len(), 1);
        let orders: Vec<u32> = result.segments.iter().map(Segment::order).collect();
        assert_eq!(orders, (0..result.segments.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_bad_json_uses_recipe_message() {
        let err = RecipeKind
            .interpret("Sorry, I can't.", &mut SequentialIds::new("r"))
            .unwrap_err();
        assert!(matches!(err, KismetError::Parse(_)));
        assert_eq!(RecipeKind.parse_failure_message(), RECIPE_UNAVAILABLE);
    }

    #[test]
    fn test_compose_includes_filters() {
        let filters = RecipeFilters {
            region: Some("Thai".into()),
            ingredients: Some("tofu, basil".into()),
            other_considerations: None,
        };
        let prompt = RecipeKind.compose("Suggest a recipe.", &filters, &[]);
        assert!(prompt.contains("\nRegion: Thai"));
        assert!(prompt.contains("\nIngredients: tofu, basil"));
        assert!(!prompt.contains("Other considerations:"));
    }

    #[test]
    fn test_record_roundtrip() {
        let result = interpret();
        let image_id = result.unresolved_prompts()[0].0.clone();
        let assets = HashMap::from([(image_id, PathBuf::from("/saved/curry.png"))]);
        let filters = RecipeFilters {
            region: Some("Thai".into()),
            ..Default::default()
        };

        let record = RecipeKind.to_record(&result, &filters, &assets).unwrap();
        assert_eq!(record.recipe_name, "Green Curry");
        assert_eq!(record.description.as_deref(), Some("Fragrant and mild."));
        assert_eq!(record.ingredients, vec!["1 tbsp oil", "2 tbsp curry paste"]);
        assert_eq!(record.instructions, vec!["Heat the oil.", "Fry the paste."]);
        assert_eq!(record.image_path, Some(PathBuf::from("/saved/curry.png")));

        let (restored, restored_filters) = RecipeKind.from_record(&record);
        assert_eq!(restored_filters, filters);
        assert_eq!(restored.title, result.title);
        assert_eq!(restored.field(INGREDIENTS), result.field(INGREDIENTS));
        assert_eq!(restored.field(PREP_TIME), Some("15 minutes"));
        assert!(restored.unresolved_prompts().is_empty());
    }

    #[test]
    fn test_unlist_keeps_inner_periods() {
        assert_eq!(
            unlist("1. Mix 2. 5 cups flour.\n10. Bake."),
            vec!["Mix 2. 5 cups flour.", "Bake."]
        );
    }

    #[test]
    fn test_recipe_markdown() {
        let md = recipe_markdown(&["egg".into()], &["Boil.".into(), "Peel.".into()]);
        assert_eq!(
            md,
            "## Ingredients\n\n- egg\n\n## Instructions\n\n1. Boil.\n2. Peel.\n"
        );
    }
}
