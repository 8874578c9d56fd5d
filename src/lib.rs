pub mod api;
pub mod config;
pub mod food;
pub mod providers;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use config::AppConfig;
pub use food::analysis::{DetectionOutcome, IngredientDetector, IngredientList, NormalizePolicy};
pub use providers::traits::{DetectionProvider, ImageBlob, ProviderError, VisionProvider};
