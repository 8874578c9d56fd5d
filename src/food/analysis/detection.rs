use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::food::analysis::normalize::{IngredientList, NormalizePolicy};
use crate::providers::traits::{DetectionProvider, ImageBlob, ProviderError, VisionProvider};

/// Returned when no provider is configured at all.
pub const SAMPLE_INGREDIENTS: &[&str] = &["tomatoes", "onions", "garlic", "ginger", "rice", "chicken"];
/// Returned when providers answered but nothing survived normalization.
pub const COMMON_INGREDIENTS: &[&str] = &["tomatoes", "onions", "garlic", "ginger"];
/// Returned when the providers that ran all failed.
pub const FALLBACK_INGREDIENTS: &[&str] = &["tomatoes", "onions", "garlic", "ginger", "rice"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Secondary,
    StaticFallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Primary => write!(f, "primary"),
            Stage::Secondary => write!(f, "secondary"),
            Stage::StaticFallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceProvider {
    Primary,
    Secondary,
    Fallback,
}

impl SourceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceProvider::Primary => "primary",
            SourceProvider::Secondary => "secondary",
            SourceProvider::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoProviderConfigured,
    NothingDetected,
    ProvidersFailed,
}

impl FallbackReason {
    pub fn message(&self) -> &'static str {
        match self {
            FallbackReason::NoProviderConfigured => {
                "No detection provider configured. Using sample ingredients."
            }
            FallbackReason::NothingDetected => {
                "No specific ingredients detected. Here are some common ones to get started."
            }
            FallbackReason::ProvidersFailed => "Using fallback ingredients due to detection error.",
        }
    }

    /// The canned list for this reason, cut to `max_items` but never empty.
    fn ingredients(&self, max_items: usize) -> IngredientList {
        let names = match self {
            FallbackReason::NoProviderConfigured => SAMPLE_INGREDIENTS,
            FallbackReason::NothingDetected => COMMON_INGREDIENTS,
            FallbackReason::ProvidersFailed => FALLBACK_INGREDIENTS,
        };
        IngredientList::from_static(&names[..names.len().min(max_items.max(1))])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    Success {
        ingredients: IngredientList,
        source: SourceProvider,
    },
    Degraded {
        ingredients: IngredientList,
        reason: FallbackReason,
    },
}

impl DetectionOutcome {
    pub fn ingredients(&self) -> &IngredientList {
        match self {
            DetectionOutcome::Success { ingredients, .. }
            | DetectionOutcome::Degraded { ingredients, .. } => ingredients,
        }
    }

    pub fn source(&self) -> SourceProvider {
        match self {
            DetectionOutcome::Success { source, .. } => *source,
            DetectionOutcome::Degraded { .. } => SourceProvider::Fallback,
        }
    }

    /// Short status line for the caller; only degraded results carry one.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            DetectionOutcome::Success { .. } => None,
            DetectionOutcome::Degraded { reason, .. } => Some(reason.message()),
        }
    }

    pub fn into_parts(self) -> (IngredientList, Option<&'static str>) {
        let message = self.message();
        match self {
            DetectionOutcome::Success { ingredients, .. }
            | DetectionOutcome::Degraded { ingredients, .. } => (ingredients, message),
        }
    }
}

/// What the last stage that actually ran reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastResult {
    NotRun,
    Empty,
    Failed,
}

/// Sequences primary -> secondary -> canned list; always yields ingredients.
///
/// A provider that is `None` had no credential at startup and its stage is
/// skipped. This is the only place that decides whether a provider's answer
/// is good enough to return.
#[derive(Clone)]
pub struct IngredientDetector {
    primary: Option<Arc<dyn VisionProvider>>,
    secondary: Option<Arc<dyn DetectionProvider>>,
    normalizer: NormalizePolicy,
}

impl IngredientDetector {
    pub fn new(
        primary: Option<Arc<dyn VisionProvider>>,
        secondary: Option<Arc<dyn DetectionProvider>>,
        normalizer: NormalizePolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            normalizer,
        }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn normalizer(&self) -> &NormalizePolicy {
        &self.normalizer
    }

    pub async fn detect(&self, image: &ImageBlob) -> DetectionOutcome {
        let mut stage = Stage::Primary;
        let mut last = LastResult::NotRun;

        loop {
            stage = match stage {
                Stage::Primary => match &self.primary {
                    None => {
                        info!(stage = %stage, "no credential configured, skipping");
                        Stage::Secondary
                    }
                    Some(provider) => {
                        let result = provider.detect(image).await;
                        match self.accept(stage, provider.provider_name(), result) {
                            Ok(ingredients) => {
                                return DetectionOutcome::Success {
                                    ingredients,
                                    source: SourceProvider::Primary,
                                }
                            }
                            Err(outcome) => {
                                last = outcome;
                                Stage::Secondary
                            }
                        }
                    }
                },
                Stage::Secondary => match &self.secondary {
                    None => {
                        info!(stage = %stage, "no credential configured, skipping");
                        Stage::StaticFallback
                    }
                    Some(provider) => {
                        let result = provider.detect(image).await;
                        match self.accept(stage, provider.provider_name(), result) {
                            Ok(ingredients) => {
                                return DetectionOutcome::Success {
                                    ingredients,
                                    source: SourceProvider::Secondary,
                                }
                            }
                            Err(outcome) => {
                                last = outcome;
                                Stage::StaticFallback
                            }
                        }
                    }
                },
                Stage::StaticFallback => {
                    let reason = match last {
                        LastResult::NotRun => FallbackReason::NoProviderConfigured,
                        LastResult::Empty => FallbackReason::NothingDetected,
                        LastResult::Failed => FallbackReason::ProvidersFailed,
                    };
                    warn!(stage = %stage, reason = ?reason, "returning canned ingredients");
                    return DetectionOutcome::Degraded {
                        ingredients: reason.ingredients(self.normalizer.max_items),
                        reason,
                    };
                }
            };
        }
    }

    /// Normalizes a provider result; `Err` says why the next stage is needed.
    fn accept(
        &self,
        stage: Stage,
        provider: &'static str,
        result: Result<Vec<String>, ProviderError>,
    ) -> Result<IngredientList, LastResult> {
        match result {
            Ok(raw) => {
                let ingredients = self.normalizer.normalize(&raw);
                if ingredients.is_empty() {
                    info!(stage = %stage, provider, raw = raw.len(), "nothing usable after normalization");
                    Err(LastResult::Empty)
                } else {
                    info!(stage = %stage, provider, count = ingredients.len(), "ingredients detected");
                    Ok(ingredients)
                }
            }
            Err(ProviderError::NoDetections { endpoints, .. }) => {
                info!(stage = %stage, provider, endpoints, "provider detected nothing");
                Err(LastResult::Empty)
            }
            Err(err) => {
                warn!(
                    stage = %stage,
                    provider,
                    status = err.status(),
                    permission_denied = err.is_permission_denied(),
                    error = %err,
                    "provider failed, moving on"
                );
                Err(LastResult::Failed)
            }
        }
    }
}
