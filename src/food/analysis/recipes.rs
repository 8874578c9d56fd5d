use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::food::analysis::normalize::IngredientList;
use crate::food::analysis::parse::extract_json_array;
use crate::food::recipe::{fallback_recipes, Recipe};
use crate::providers::traits::CompletionProvider;

pub const CHEF_SYSTEM_PROMPT: &str = "You are an expert Indian chef who creates authentic recipes. \
Always respond with valid JSON only, no additional text.";

pub fn recipe_prompt(ingredients: &IngredientList) -> String {
    format!(
        "Generate 3-5 authentic Indian recipes using these ingredients: {}.\n\n\
        For each recipe, provide:\n\
        1. A creative and authentic Indian recipe name\n\
        2. A brief description (2-3 sentences)\n\
        3. Difficulty level (Easy, Medium, or Hard)\n\
        4. Cooking time in minutes\n\
        5. Number of servings\n\
        6. Complete ingredient list with measurements\n\
        7. Step-by-step cooking instructions\n\
        8. Nutritional information (calories, protein, carbs, fat)\n\n\
        Format the response as a JSON array of recipe objects with these exact fields:\n\
        - id (unique string)\n\
        - title (string)\n\
        - description (string)\n\
        - difficulty (string: \"Easy\", \"Medium\", or \"Hard\")\n\
        - cookTime (number in minutes)\n\
        - servings (number)\n\
        - ingredients (array of strings with measurements)\n\
        - instructions (array of strings, each step)\n\
        - nutrition (object with calories, protein, carbs, fat as numbers)\n\
        - image (use this placeholder: \"{}\")\n\n\
        Make sure the recipes are authentic Indian dishes that can realistically be made with \
        the provided ingredients. Include popular dishes like curries, dal, rice dishes, etc.",
        ingredients.as_slice().join(", "),
        crate::food::recipe::PLACEHOLDER_IMAGE
    )
}

/// Parses a model reply into recipes; tolerates prose around the array.
pub fn parse_recipes(content: &str) -> Result<Vec<Recipe>, serde_json::Error> {
    match serde_json::from_str::<Vec<Recipe>>(content.trim()) {
        Ok(recipes) => Ok(recipes),
        Err(err) => match extract_json_array(content) {
            Some(slice) => serde_json::from_str(slice),
            None => Err(err),
        },
    }
}

/// Recipe generation with a single-tier canned fallback.
#[derive(Clone)]
pub struct RecipeService {
    provider: Option<Arc<dyn CompletionProvider>>,
}

impl RecipeService {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Never fails; any problem yields the canned recipe list.
    pub async fn generate(&self, ingredients: &IngredientList) -> Vec<Recipe> {
        let Some(provider) = &self.provider else {
            info!("no recipe provider configured, serving fallback recipes");
            return fallback_recipes();
        };

        debug!(
            model = provider.get_model_info(),
            ingredients = ingredients.len(),
            "requesting recipes"
        );
        let content = match provider.complete(&recipe_prompt(ingredients)).await {
            Ok(content) => content,
            Err(err) => {
                warn!(model = provider.get_model_info(), error = %err, "recipe generation failed");
                return fallback_recipes();
            }
        };

        match parse_recipes(&content) {
            Ok(recipes) if !recipes.is_empty() => {
                info!(count = recipes.len(), "recipes generated");
                recipes
            }
            Ok(_) => {
                warn!("model returned an empty recipe array");
                fallback_recipes()
            }
            Err(err) => {
                warn!(error = %err, "could not parse recipe reply");
                fallback_recipes()
            }
        }
    }
}
