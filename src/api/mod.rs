use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::food::analysis::recipes::CHEF_SYSTEM_PROMPT;
use crate::food::analysis::{IngredientDetector, IngredientList, NormalizePolicy, RecipeService};
use crate::food::api::RoboflowClient;
use crate::providers::openai::{OpenAIProvider, OpenAIVisionProvider};
use crate::providers::traits::{CompletionProvider, DetectionProvider, ImageBlob, VisionProvider};

const IMAGE_FIELD: &str = "image";
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Clone)]
pub struct AppState {
    detector: Arc<IngredientDetector>,
    recipes: Arc<RecipeService>,
    normalizer: NormalizePolicy,
    max_upload_bytes: usize,
    max_concurrent_requests: usize,
}

impl AppState {
    pub fn new(detector: IngredientDetector, recipes: RecipeService, config: &AppConfig) -> Self {
        Self {
            normalizer: *detector.normalizer(),
            detector: Arc::new(detector),
            recipes: Arc::new(recipes),
            max_upload_bytes: config.max_upload_bytes,
            max_concurrent_requests: config.max_concurrent_requests,
        }
    }

    /// Builds every provider whose credential is present; the rest stay `None`.
    pub fn from_config(config: &AppConfig) -> Self {
        let primary = config.food.openai_api_key.clone().map(|key| {
            Arc::new(OpenAIVisionProvider::new(key, &config.vision)) as Arc<dyn VisionProvider>
        });
        let secondary = config.food.roboflow_api_key.clone().map(|key| {
            Arc::new(RoboflowClient::new(key, &config.detector)) as Arc<dyn DetectionProvider>
        });
        let chat = config.food.openai_api_key.clone().map(|key| {
            Arc::new(OpenAIProvider::new(
                key,
                CHEF_SYSTEM_PROMPT.to_string(),
                &config.recipes,
            )) as Arc<dyn CompletionProvider>
        });

        if primary.is_none() {
            warn!("OPENAI_API_KEY not set, vision detection and recipe generation disabled");
        }
        if secondary.is_none() {
            warn!("ROBOFLOW_API_KEY not set, secondary detection disabled");
        }

        Self::new(
            IngredientDetector::new(primary, secondary, config.normalize),
            RecipeService::new(chat),
            config,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    ingredients: IngredientList,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ParseIngredientsRequest {
    #[validate(length(min = 1, max = 2000))]
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRecipesRequest {
    #[validate(length(min = 1, max = 50))]
    #[serde(default)]
    ingredients: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    primary_configured: bool,
    secondary_configured: bool,
    recipes_configured: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Create and configure the API router
pub fn create_api(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/api/detect-ingredients", post(detect_ingredients))
        .route("/api/parse-ingredients", post(parse_ingredients))
        .route("/api/generate-recipes", post(generate_recipes))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(ConcurrencyLimitLayer::new(state.max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Finds the `image` field. `Ok(None)` means the caller sent no usable image.
async fn read_image(multipart: &mut Multipart) -> Result<Option<ImageBlob>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "multipart read error");
                return Ok(None);
            }
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();

        return match field.bytes().await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(ImageBlob::new(bytes.to_vec(), mime_type))),
            Err(e) => {
                warn!(error = %e, "image field read error");
                Err(error_response(e.status(), format!("Failed to read image: {}", e.body_text())))
            }
        };
    }
}

/// Body rejections still answer with the `{error}` shape.
fn rejected_body(rejection: JsonRejection) -> Response {
    warn!(error = %rejection.body_text(), "rejected request body");
    error_response(
        rejection.status(),
        format!("Invalid request: {}", rejection.body_text()),
    )
}

async fn detect_ingredients(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("detect_ingredients", %request_id);

    // Not a multipart body at all, so there is no image field to read.
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            span.in_scope(|| warn!(error = %rejection.body_text(), "not a multipart request"));
            return error_response(StatusCode::BAD_REQUEST, "No image provided");
        }
    };

    let image = match read_image(&mut multipart).instrument(span.clone()).await {
        Ok(Some(image)) => image,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "No image provided"),
        Err(response) => return response,
    };

    span.in_scope(|| info!(bytes = image.len(), mime = image.mime_type(), "image received"));

    let outcome = state.detector.detect(&image).instrument(span.clone()).await;
    span.in_scope(|| info!(source = outcome.source().as_str(), count = outcome.ingredients().len(), "detection finished"));

    let (ingredients, message) = outcome.into_parts();
    Json(DetectResponse {
        ingredients,
        message: message.map(str::to_string),
    })
    .into_response()
}

async fn parse_ingredients(
    State(state): State<AppState>,
    request: Result<Json<ParseIngredientsRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected_body(rejection),
    };

    if request.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "No ingredients provided");
    }

    let ingredients = state.normalizer.normalize_text(&request.text);
    if ingredients.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No ingredients provided");
    }

    Json(DetectResponse {
        ingredients,
        message: None,
    })
    .into_response()
}

async fn generate_recipes(
    State(state): State<AppState>,
    request: Result<Json<GenerateRecipesRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected_body(rejection),
    };

    if let Err(e) = request.validate() {
        let message = if request.ingredients.is_empty() {
            "No ingredients provided".to_string()
        } else {
            format!("Invalid request: {}", e)
        };
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    let ingredients = state.normalizer.normalize(&request.ingredients);
    if ingredients.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No ingredients provided");
    }

    let request_id = Uuid::new_v4();
    let recipes = state
        .recipes
        .generate(&ingredients)
        .instrument(info_span!("generate_recipes", %request_id))
        .await;

    Json(recipes).into_response()
}

async fn health_check(State(state): State<AppState>) -> Response {
    Json(HealthResponse {
        status: "Server is running and healthy".to_string(),
        primary_configured: state.detector.has_primary(),
        secondary_configured: state.detector.has_secondary(),
        recipes_configured: state.recipes.is_configured(),
    })
    .into_response()
}
