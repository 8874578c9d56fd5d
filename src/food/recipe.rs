use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_IMAGE: &str =
    "https://images.pexels.com/photos/1640777/pexels-photo-1640777.jpeg?auto=compress&cs=tinysrgb&w=800";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default = "placeholder_image")]
    pub image: String,
    pub cook_time: u32,
    pub servings: u32,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub nutrition: NutritionInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u32>,
}

fn placeholder_image() -> String {
    PLACEHOLDER_IMAGE.to_string()
}

/// Served whenever generation is unavailable or returns garbage.
pub fn fallback_recipes() -> Vec<Recipe> {
    vec![Recipe {
        id: "1".to_string(),
        title: "Simple Vegetable Curry".to_string(),
        description: "A quick and easy curry made with available vegetables and basic spices."
            .to_string(),
        image: placeholder_image(),
        cook_time: 25,
        servings: 4,
        difficulty: Difficulty::Easy,
        category: None,
        ingredients: [
            "2 cups mixed vegetables",
            "1 onion, chopped",
            "2 cloves garlic",
            "1 tsp turmeric",
            "1 tsp cumin powder",
            "Salt to taste",
            "2 tbsp oil",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        instructions: [
            "Heat oil in a pan",
            "Add onions and garlic, sauté until golden",
            "Add spices and cook for 1 minute",
            "Add vegetables and cook until tender",
            "Season with salt and serve hot",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        nutrition: NutritionInfo {
            calories: 180.0,
            protein: 6.0,
            carbs: 25.0,
            fat: 8.0,
        },
        tags: None,
        rating: None,
        reviews: None,
    }]
}
