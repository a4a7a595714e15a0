use serde::{Deserialize, Serialize};

use crate::error::{KismetError, Result};

/// JSON shape the recipe prompt asks the model to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeResponse {
    pub recipe_title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "yield")]
    pub yield_amount: Option<String>,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub image_prompt: Option<String>,
}

/// Slice out the outermost `{ ... }` of a response, dropping code fences and
/// any chatter around it.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

pub fn parse_recipe_response(response: &str) -> Result<RecipeResponse> {
    let json = extract_json_object(response)
        .ok_or_else(|| KismetError::Parse("no JSON object in recipe response".into()))?;
    let recipe: RecipeResponse =
        serde_json::from_str(json).map_err(|e| KismetError::Parse(e.to_string()))?;
    if recipe.recipe_title.trim().is_empty() {
        return Err(KismetError::Parse("recipe has no title".into()));
    }
    Ok(recipe)
}
