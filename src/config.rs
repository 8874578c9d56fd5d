use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::food::analysis::normalize::NormalizePolicy;
use crate::food::config::FoodConfig;
use crate::providers::utils::RetryPolicy;

/// Default Roboflow model endpoints, tried in this order.
pub const DEFAULT_DETECTOR_ENDPOINTS: &[&str] = &[
    "food-ingredients-detection-6ce7j/1",
    "ingredients-detection/1",
    "food-ingredient-recognition/2",
    "fridge-ingredients/1",
    "vegetables-detection-ohbda/1",
    "fruits-and-vegetables-2vcbw/1",
    "grocery-items-detection/3",
];

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub models: Vec<String>,
    pub api_url: String,
    pub temperature: f32,
    pub max_tokens: u16,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn from_source(provider: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let prefix = provider.to_uppercase();
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);

        let models = lookup(&key("MODELS"))
            .map(|m| {
                m.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| match provider {
                "openai" => vec!["gpt-4o".to_string()],
                "openai_recipes" => vec!["gpt-4".to_string()],
                "roboflow" => DEFAULT_DETECTOR_ENDPOINTS
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
                _ => vec![],
            });

        let default_url = match provider {
            "openai" => "https://api.openai.com/v1/chat/completions",
            "openai_recipes" => "https://api.openai.com/v1",
            "roboflow" => "https://detect.roboflow.com",
            _ => "",
        };
        let api_url = match lookup(&key("API_URL")) {
            Some(url) if Url::parse(&url).is_ok() => url.trim_end_matches('/').to_string(),
            Some(url) => {
                warn!(variable = %key("API_URL"), value = %url, "not a valid URL, using default");
                default_url.to_string()
            }
            None => default_url.to_string(),
        };

        let (temperature, max_tokens, attempts, base_ms, timeout_secs) = match provider {
            "openai" => (0.1, 500, 3, 2000, 30),
            "openai_recipes" => (0.7, 3000, 1, 0, 60),
            "roboflow" => (0.0, 0, 3, 4000, 25),
            _ => (0.7, 1000, 3, 2000, 30),
        };

        Self {
            models,
            api_url,
            temperature: parse_var(&lookup, &key("TEMPERATURE")).unwrap_or(temperature),
            max_tokens: parse_var(&lookup, &key("MAX_TOKENS")).unwrap_or(max_tokens),
            retry: RetryPolicy::new(
                parse_var(&lookup, &key("MAX_ATTEMPTS")).unwrap_or(attempts),
                parse_var(&lookup, &key("RETRY_BASE_MS")).unwrap_or(base_ms),
            ),
            timeout: Duration::from_secs(
                parse_var(&lookup, &key("TIMEOUT_SECS")).unwrap_or(timeout_secs),
            ),
        }
    }

    /// First configured model, if any.
    pub fn primary_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

/// Everything the server needs, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub food: FoodConfig,
    pub vision: ProviderConfig,
    pub detector: ProviderConfig,
    pub recipes: ProviderConfig,
    pub normalize: NormalizePolicy,
    pub max_upload_bytes: usize,
    pub max_concurrent_requests: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let normalize = NormalizePolicy {
            max_items: parse_var(&lookup, "INGREDIENT_MAX_ITEMS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(NormalizePolicy::default().max_items),
            ..NormalizePolicy::default()
        };

        Self {
            food: FoodConfig::from_source(&lookup),
            vision: ProviderConfig::from_source("openai", &lookup),
            detector: ProviderConfig::from_source("roboflow", &lookup),
            recipes: ProviderConfig::from_source("openai_recipes", &lookup),
            normalize,
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES").unwrap_or(10 * 1024 * 1024),
            max_concurrent_requests: parse_var(&lookup, "MAX_CONCURRENT_REQUESTS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(64),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "could not parse, using default");
            None
        }
    }
}
