use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::providers::traits::{DetectionProvider, ImageBlob, ProviderError};
use crate::providers::utils::{retry_with_backoff, RetryPolicy};

const PROVIDER: &str = "roboflow";

/// Field names checked on each prediction, first present string wins.
const LABEL_FIELDS: &[&str] = &["class", "name", "label", "category"];

/// Result of trying one candidate endpoint (after its own retries).
#[derive(Debug)]
pub struct EndpointAttempt {
    pub endpoint: String,
    pub result: Result<Vec<String>, ProviderError>,
}

impl EndpointAttempt {
    fn is_usable(&self) -> bool {
        matches!(&self.result, Ok(labels) if !labels.is_empty())
    }
}

/// Object-detection service tried across an ordered list of model endpoints.
#[derive(Debug, Clone)]
pub struct RoboflowClient {
    api_key: String,
    base_url: String,
    endpoints: Vec<String>,
    retry: RetryPolicy,
    timeout: Duration,
    client: Client,
}

impl RoboflowClient {
    pub fn new(api_key: String, config: &ProviderConfig) -> Self {
        Self {
            api_key,
            base_url: config.api_url.clone(),
            endpoints: config.models.clone(),
            retry: config.retry,
            timeout: config.timeout,
            client: Client::new(),
        }
    }

    /// POSTs the base64 body to one endpoint; 2xx bodies come back as JSON.
    async fn call_endpoint(&self, endpoint: &str, encoded: &str) -> Result<Value, ProviderError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let call = async {
            let response = self
                .client
                .post(&url)
                .query(&[("api_key", self.api_key.as_str())])
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encoded.to_string())
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

        // Dropping the in-flight request on expiry aborts the connection.
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: PROVIDER,
                after: self.timeout,
            })?
    }

    async fn try_endpoint(&self, endpoint: &str, encoded: &str) -> EndpointAttempt {
        let label = format!("{}:{}", PROVIDER, endpoint);
        let result = retry_with_backoff(self.retry, &label, || self.call_endpoint(endpoint, encoded))
            .await
            .map(|body| extract_labels(&body));

        match &result {
            Ok(labels) if labels.is_empty() => {
                info!(endpoint, "no detections, trying next endpoint");
            }
            Ok(labels) => {
                debug!(endpoint, count = labels.len(), "detections received");
            }
            Err(err) if err.is_permission_denied() => {
                warn!(
                    endpoint,
                    status = err.status(),
                    "permission denied; check ROBOFLOW_API_KEY has access to this model"
                );
            }
            Err(err) => {
                warn!(endpoint, status = err.status(), error = %err, "endpoint failed, trying next");
            }
        }

        EndpointAttempt {
            endpoint: endpoint.to_string(),
            result,
        }
    }
}

/// Labels from `predictions[*]`, lowercased and trimmed, single characters dropped.
pub fn extract_labels(body: &Value) -> Vec<String> {
    body.get("predictions")
        .and_then(Value::as_array)
        .map(|predictions| {
            predictions
                .iter()
                .filter_map(|prediction| {
                    LABEL_FIELDS
                        .iter()
                        .find_map(|field| prediction.get(*field).and_then(Value::as_str))
                })
                .map(|label| label.trim().to_lowercase())
                .filter(|label| label.chars().count() > 1)
                .collect()
        })
        .unwrap_or_default()
}

/// Picks the first attempt, in endpoint order, that produced detections.
pub fn select_detections(attempts: Vec<EndpointAttempt>) -> Result<Vec<String>, ProviderError> {
    let tried = attempts.len();
    let mut last_error = None;
    let mut failures = 0;

    for attempt in attempts {
        match attempt.result {
            Ok(labels) if !labels.is_empty() => {
                info!(endpoint = %attempt.endpoint, count = labels.len(), "using detections");
                return Ok(labels);
            }
            Ok(_) => {}
            Err(err) => {
                failures += 1;
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) if failures == tried => Err(ProviderError::Exhausted {
            provider: PROVIDER,
            endpoints: tried,
            last: err.to_string(),
        }),
        _ => Err(ProviderError::NoDetections {
            provider: PROVIDER,
            endpoints: tried,
        }),
    }
}

#[async_trait]
impl DetectionProvider for RoboflowClient {
    async fn detect(&self, image: &ImageBlob) -> Result<Vec<String>, ProviderError> {
        let encoded = image.to_base64();
        let mut attempts = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            let attempt = self.try_endpoint(endpoint, &encoded).await;
            let usable = attempt.is_usable();
            attempts.push(attempt);
            if usable {
                break;
            }
        }

        select_detections(attempts)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Hits = Arc<Mutex<Vec<String>>>;

    fn config(base: String, endpoints: &[&str]) -> ProviderConfig {
        ProviderConfig {
            models: endpoints.iter().map(|e| e.to_string()).collect(),
            api_url: base,
            temperature: 0.0,
            max_tokens: 0,
            retry: RetryPolicy::new(3, 1),
            timeout: Duration::from_secs(5),
        }
    }

    fn image() -> ImageBlob {
        ImageBlob::new(b"jpeg".to_vec(), "image/jpeg")
    }

    /// Fake detector: `empty/*` finds nothing, `forbidden/*` is 403, `broken/*`
    /// is 500, `slow/*` stalls for seconds, anything else finds a tomato.
    async fn detector(
        State(hits): State<Hits>,
        Path((model, version)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
        body: String,
    ) -> impl IntoResponse {
        hits.lock().unwrap().push(format!("{}/{}", model, version));
        assert_eq!(query.get("api_key").map(String::as_str), Some("rf-key"));
        assert_eq!(body, "anBlZw==");

        if model == "slow" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        match model.as_str() {
            "empty" => (StatusCode::OK, Json(json!({ "predictions": [] }))),
            "forbidden" => (StatusCode::FORBIDDEN, Json(json!({ "message": "Forbidden" }))),
            "broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
            _ => (
                StatusCode::OK,
                Json(json!({ "predictions": [ { "class": " Tomato ", "confidence": 0.9 } ] })),
            ),
        }
    }

    async fn fake_roboflow() -> (String, Hits) {
        let hits: Hits = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/:model/:version", post(detector))
            .with_state(hits.clone());
        (spawn_server(app).await, hits)
    }

    #[test]
    fn labels_use_first_present_field() {
        let body = json!({
            "predictions": [
                { "class": "Paneer", "name": "ignored" },
                { "name": "SPINACH" },
                { "label": "  cumin " },
                { "category": "dairy" },
                { "confidence": 0.4 },
                { "class": "x" },
                { "class": 7, "label": "ghee" }
            ]
        });
        assert_eq!(
            extract_labels(&body),
            vec!["paneer", "spinach", "cumin", "dairy", "ghee"]
        );
        assert!(extract_labels(&json!({ "detections": [] })).is_empty());
    }

    #[test]
    fn selection_prefers_endpoint_order() {
        let attempts = vec![
            EndpointAttempt {
                endpoint: "a".into(),
                result: Err(ProviderError::Status {
                    provider: PROVIDER,
                    status: 500,
                    body: String::new(),
                }),
            },
            EndpointAttempt {
                endpoint: "b".into(),
                result: Ok(vec!["rice".into()]),
            },
            EndpointAttempt {
                endpoint: "c".into(),
                result: Ok(vec!["dal".into()]),
            },
        ];
        assert_eq!(select_detections(attempts).unwrap(), vec!["rice"]);
    }

    #[test]
    fn selection_distinguishes_empty_from_failed() {
        let empty = vec![EndpointAttempt {
            endpoint: "a".into(),
            result: Ok(vec![]),
        }];
        assert!(matches!(
            select_detections(empty),
            Err(ProviderError::NoDetections { endpoints: 1, .. })
        ));

        let failed = vec![EndpointAttempt {
            endpoint: "a".into(),
            result: Err(ProviderError::EmptyContent { provider: PROVIDER }),
        }];
        assert!(matches!(
            select_detections(failed),
            Err(ProviderError::Exhausted { endpoints: 1, .. })
        ));
    }

    #[tokio::test]
    async fn first_endpoint_with_detections_wins() {
        let (base, hits) = fake_roboflow().await;
        let client = RoboflowClient::new(
            "rf-key".to_string(),
            &config(base, &["empty/1", "empty/2", "food/3", "food/4"]),
        );

        let labels = client.detect(&image()).await.unwrap();

        assert_eq!(labels, vec!["tomato"]);
        assert_eq!(*hits.lock().unwrap(), vec!["empty/1", "empty/2", "food/3"]);
    }

    #[tokio::test]
    async fn failing_endpoints_are_retried_then_skipped() {
        let (base, hits) = fake_roboflow().await;
        let client = RoboflowClient::new(
            "rf-key".to_string(),
            &config(base, &["forbidden/1", "broken/1", "food/1"]),
        );

        let labels = client.detect(&image()).await.unwrap();

        assert_eq!(labels, vec!["tomato"]);
        let hits = hits.lock().unwrap().clone();
        assert_eq!(hits.iter().filter(|h| *h == "forbidden/1").count(), 3);
        assert_eq!(hits.iter().filter(|h| *h == "broken/1").count(), 3);
        assert_eq!(hits.last().map(String::as_str), Some("food/1"));
    }

    #[tokio::test]
    async fn all_endpoints_failing_is_an_error() {
        let (base, _hits) = fake_roboflow().await;
        let client = RoboflowClient::new(
            "rf-key".to_string(),
            &config(base, &["broken/1", "forbidden/2"]),
        );

        let err = client.detect(&image()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted { endpoints: 2, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn all_endpoints_empty_is_no_detections() {
        let (base, _hits) = fake_roboflow().await;
        let client = RoboflowClient::new("rf-key".to_string(), &config(base, &["empty/1", "empty/2"]));

        let err = client.detect(&image()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoDetections { endpoints: 2, .. }));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_and_next_one_answers() {
        let (base, hits) = fake_roboflow().await;
        let mut config = config(base, &["slow/1", "food/1"]);
        config.timeout = Duration::from_millis(100);
        let client = RoboflowClient::new("rf-key".to_string(), &config);

        let labels = client.detect(&image()).await.unwrap();

        assert_eq!(labels, vec!["tomato"]);
        let hits = hits.lock().unwrap().clone();
        assert_eq!(hits.iter().filter(|h| *h == "slow/1").count(), 3);
        assert_eq!(hits.last().map(String::as_str), Some("food/1"));
    }

    #[tokio::test]
    async fn connection_errors_do_not_leak_the_api_key() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut config = config(base, &["m/1"]);
        config.retry = RetryPolicy::new(1, 0);
        let client = RoboflowClient::new("SECRET-RF-KEY".to_string(), &config);

        let err = client.detect(&image()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted { .. }), "{:?}", err);
        assert!(!err.to_string().contains("SECRET-RF-KEY"), "{}", err);
        assert!(!format!("{:?}", err).contains("SECRET-RF-KEY"));
    }
}
