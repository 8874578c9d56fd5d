/// Upstream credentials. A missing key disables that stage; it is never an error.
#[derive(Debug, Clone, Default)]
pub struct FoodConfig {
    pub openai_api_key: Option<String>,
    pub roboflow_api_key: Option<String>,
}

impl FoodConfig {
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let credential = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            openai_api_key: credential("OPENAI_API_KEY"),
            roboflow_api_key: credential("ROBOFLOW_API_KEY"),
        }
    }
}
