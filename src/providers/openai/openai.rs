use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::food::analysis::parse::{parse_ingredient_reply, ParseResult};
use crate::providers::traits::{ImageBlob, ProviderError, VisionProvider};
use crate::providers::utils::{retry_with_backoff, RetryPolicy};

const PROVIDER: &str = "openai";

pub const DETECTION_PROMPT: &str = "Look at this photo and list every food ingredient you can identify. \
Respond with a JSON array of lowercase ingredient names only, for example [\"red onion\", \"basmati rice\"]. \
Be specific about variety and color where it is visible (\"green bell pepper\" rather than \"pepper\"). \
Include items that are only partially visible or in packaging if you can tell what they are. \
Do not include utensils, containers or dishes.";

/// Chat-completions vision model used as the first detection stage.
#[derive(Clone)]
pub struct OpenAIVisionProvider {
    api_key: String,
    client: Client,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u16,
    retry: RetryPolicy,
    timeout: Duration,
}

impl OpenAIVisionProvider {
    pub fn new(api_key: String, config: &ProviderConfig) -> Self {
        Self {
            api_key,
            client: Client::new(),
            api_url: config.api_url.clone(),
            model: config.primary_model().unwrap_or("gpt-4o").to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: config.retry,
            timeout: config.timeout,
        }
    }

    fn request_body(&self, image: &ImageBlob) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": DETECTION_PROMPT },
                        { "type": "image_url", "image_url": { "url": image.to_data_uri() } }
                    ]
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        })
    }

    /// One network round trip, bounded by the per-call deadline.
    async fn send(&self, body: &Value) -> Result<Value, ProviderError> {
        let call = async {
            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, self.timeout))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status {
                    provider: PROVIDER,
                    status: status.as_u16(),
                    body,
                });
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, self.timeout))
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: PROVIDER,
                after: self.timeout,
            })?
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions reply.
fn reply_content(response: &Value) -> Result<String, ProviderError> {
    if let Some(error) = response.get("error") {
        return Err(ProviderError::InvalidFormat {
            provider: PROVIDER,
            message: format!("API returned error: {}", error),
        });
    }

    response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or(ProviderError::EmptyContent { provider: PROVIDER })
}

#[async_trait]
impl VisionProvider for OpenAIVisionProvider {
    async fn detect(&self, image: &ImageBlob) -> Result<Vec<String>, ProviderError> {
        let body = self.request_body(image);
        let response = retry_with_backoff(self.retry, PROVIDER, || self.send(&body)).await?;
        let content = reply_content(&response)?;

        match parse_ingredient_reply(&content) {
            ParseResult::Strict(names) => {
                debug!(count = names.len(), "parsed JSON array from vision reply");
                Ok(names)
            }
            ParseResult::Heuristic(names) => {
                info!(count = names.len(), "vision reply had no JSON array, scraped names from text");
                Ok(names)
            }
            ParseResult::Failed(reason) => Err(ProviderError::InvalidFormat {
                provider: PROVIDER,
                message: reason,
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(url: String, retry: RetryPolicy, timeout: Duration) -> ProviderConfig {
        ProviderConfig {
            models: vec!["vision-test".to_string()],
            api_url: url,
            temperature: 0.1,
            max_tokens: 500,
            retry,
            timeout,
        }
    }

    fn chat_reply(content: &str) -> Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    fn image() -> ImageBlob {
        ImageBlob::new(vec![0xff, 0xd8, 0xff], "image/jpeg")
    }

    #[test]
    fn request_embeds_prompt_and_data_uri() {
        let provider = OpenAIVisionProvider::new(
            "sk-test".to_string(),
            &config("http://unused".to_string(), RetryPolicy::new(1, 0), Duration::from_secs(1)),
        );
        let body = provider.request_body(&image());

        assert_eq!(body["model"], "vision-test");
        assert_eq!(body["max_tokens"], 500);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], DETECTION_PROMPT);
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn missing_content_is_reported() {
        let err = reply_content(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyContent { .. }));

        let err = reply_content(&chat_reply("   ")).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyContent { .. }));
    }

    #[tokio::test]
    async fn parses_array_embedded_in_prose() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(chat_reply(r#"Sure! Here you go: ["Red Onions", "garlic"]"#))
            }),
        );
        let base = spawn_server(app).await;
        let provider = OpenAIVisionProvider::new(
            "sk-test".to_string(),
            &config(
                format!("{}/v1/chat/completions", base),
                RetryPolicy::new(1, 0),
                Duration::from_secs(5),
            ),
        );

        let names = provider.detect(&image()).await.unwrap();
        assert_eq!(names, vec!["Red Onions", "garlic"]);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/chat",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(chat_reply(r#"["paneer"]"#)))
                    }
                }),
            )
            .with_state(hits.clone());
        let base = spawn_server(app).await;
        let provider = OpenAIVisionProvider::new(
            "sk-test".to_string(),
            &config(format!("{}/chat", base), RetryPolicy::new(3, 1), Duration::from_secs(5)),
        );

        let names = provider.detect(&image()).await.unwrap();
        assert_eq!(names, vec!["paneer"]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_status() {
        let app = Router::new().route("/chat", post(|| async { StatusCode::UNAUTHORIZED }));
        let base = spawn_server(app).await;
        let provider = OpenAIVisionProvider::new(
            "sk-bad".to_string(),
            &config(format!("{}/chat", base), RetryPolicy::new(2, 1), Duration::from_secs(5)),
        );

        let err = provider.detect(&image()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(chat_reply(r#"["late"]"#))
            }),
        );
        let base = spawn_server(app).await;
        let provider = OpenAIVisionProvider::new(
            "sk-test".to_string(),
            &config(format!("{}/chat", base), RetryPolicy::new(1, 0), Duration::from_millis(100)),
        );

        let err = provider.detect(&image()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn unusable_reply_is_invalid_format() {
        let app = Router::new().route("/chat", post(|| async { Json(chat_reply("42 ?! 17")) }));
        let base = spawn_server(app).await;
        let provider = OpenAIVisionProvider::new(
            "sk-test".to_string(),
            &config(format!("{}/chat", base), RetryPolicy::new(1, 0), Duration::from_secs(5)),
        );

        let err = provider.detect(&image()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidFormat { .. }));
    }
}
