pub mod detection;
pub mod normalize;
pub mod parse;
pub mod recipes;

pub use detection::{DetectionOutcome, IngredientDetector};
pub use normalize::{IngredientList, NormalizePolicy};
pub use recipes::RecipeService;
