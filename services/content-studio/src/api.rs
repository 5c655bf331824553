//! Generation endpoints
//!
//! Each handler validates its JSON body, runs one or more generations through
//! the shared [`GenerationClient`], and records `studio_requests_total` and
//! `studio_request_duration_seconds` under its route label.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Deserialize;
use tracing::{info, warn};

use gemini::GeminiClient;
use key_pool::GenerationClient;

use crate::content::{self, AssetType, GeneratedContent, Platform};
use crate::error::{ApiError, new_request_id};
use crate::metrics;

pub type Generator = GenerationClient<GeminiClient>;

/// Build the router for `/v1/*` generation endpoints.
pub fn build_api_router(generator: Generator) -> Router {
    Router::new()
        .route("/v1/text", post(generate_text))
        .route("/v1/images", post(generate_images))
        .route("/v1/content", post(generate_content))
        .route("/v1/brand-assets", post(generate_brand_assets))
        .route("/v1/geo", post(analyze_geo))
        .with_state(generator)
}

#[derive(Deserialize)]
struct TextRequest {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ImageRequest {
    prompt: String,
}

#[derive(Deserialize)]
struct ContentRequest {
    topic: String,
    #[serde(default)]
    platform: Platform,
}

#[derive(Deserialize)]
struct BrandAssetRequest {
    description: String,
    #[serde(default)]
    asset_type: AssetType,
}

#[derive(Deserialize)]
struct GeoRequest {
    content: String,
}

/// Unwrap a JSON body, turning axum's rejection into an `invalid_request`.
fn body<T>(payload: Result<axum::Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|axum::Json(b)| b)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Render the handler outcome and record request metrics.
fn finish(
    route: &'static str,
    request_id: &str,
    started: Instant,
    outcome: Result<serde_json::Value, ApiError>,
) -> Response {
    let response = match outcome {
        Ok(mut json) => {
            json["request_id"] = serde_json::Value::String(request_id.to_string());
            (
                StatusCode::OK,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                json.to_string(),
            )
                .into_response()
        }
        Err(e) => {
            warn!(route, request_id, error_type = e.error_type(), error = %e, "request failed");
            e.into_response_with_id(request_id)
        }
    };
    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    metrics::record_request(route, status, elapsed.as_secs_f64());
    info!(
        route,
        request_id,
        status,
        latency_ms = elapsed.as_millis() as u64,
        "request completed"
    );
    response
}

/// POST /v1/text: `{prompt, model?}` to `{text}`.
async fn generate_text(
    State(generator): State<Generator>,
    payload: Result<axum::Json<TextRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    let outcome = async {
        let req = body(payload)?;
        require_non_empty("prompt", &req.prompt)?;
        let text = generator
            .generate_text(&req.prompt, req.model.as_deref())
            .await?;
        Ok::<_, ApiError>(serde_json::json!({ "text": text }))
    }
    .await;
    finish("/v1/text", &request_id, started, outcome)
}

/// POST /v1/images: `{prompt}` to `{images}`.
async fn generate_images(
    State(generator): State<Generator>,
    payload: Result<axum::Json<ImageRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    let outcome = async {
        let req = body(payload)?;
        require_non_empty("prompt", &req.prompt)?;
        let images = generator.generate_image(&req.prompt).await;
        Ok::<_, ApiError>(serde_json::json!({ "images": images }))
    }
    .await;
    finish("/v1/images", &request_id, started, outcome)
}

/// POST /v1/content: per-platform content for a topic.
///
/// `platform: "all"` runs every platform concurrently. All generations run to
/// completion; the first failure in platform order fails the request.
async fn generate_content(
    State(generator): State<Generator>,
    payload: Result<axum::Json<ContentRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    let outcome = async {
        let req = body(payload)?;
        require_non_empty("topic", &req.topic)?;

        let targets = req.platform.targets();
        let generations = targets.iter().map(|&platform| {
            let generator = &generator;
            let prompt = content::content_prompt(&req.topic, platform);
            async move { generator.generate_text(&prompt, None).await }
        });
        let completions = futures_util::future::join_all(generations).await;

        let mut results: BTreeMap<&'static str, GeneratedContent> = BTreeMap::new();
        for (platform, completion) in targets.into_iter().zip(completions) {
            results.insert(platform.id(), content::parse_generated_content(&completion?));
        }
        Ok::<_, ApiError>(serde_json::json!({ "results": results }))
    }
    .await;
    finish("/v1/content", &request_id, started, outcome)
}

/// POST /v1/brand-assets: `{description, asset_type}` to `{asset_type, images}`.
async fn generate_brand_assets(
    State(generator): State<Generator>,
    payload: Result<axum::Json<BrandAssetRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    let outcome = async {
        let req = body(payload)?;
        require_non_empty("description", &req.description)?;
        let prompt = content::brand_asset_prompt(&req.description, req.asset_type);
        let images = generator.generate_image(&prompt).await;
        let (width, height) = req.asset_type.dimensions();
        Ok::<_, ApiError>(serde_json::json!({
            "asset_type": req.asset_type,
            "ratio": req.asset_type.ratio(),
            "width": width,
            "height": height,
            "images": images,
        }))
    }
    .await;
    finish("/v1/brand-assets", &request_id, started, outcome)
}

/// POST /v1/geo: `{content}` to `{analysis, schema}`.
///
/// The analysis and schema completions run concurrently; either failing
/// fails the request.
async fn analyze_geo(
    State(generator): State<Generator>,
    payload: Result<axum::Json<GeoRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    let outcome = async {
        let req = body(payload)?;
        require_non_empty("content", &req.content)?;

        let analysis_prompt = content::geo_analysis_prompt(&req.content);
        let schema_prompt = content::geo_schema_prompt(&req.content);
        let (analysis, schema) = tokio::join!(
            generator.generate_text(&analysis_prompt, None),
            generator.generate_text(&schema_prompt, None),
        );

        Ok::<_, ApiError>(serde_json::json!({
            "analysis": content::parse_geo_analysis(&analysis?),
            "schema": content::clean_schema(&schema?),
        }))
    }
    .await;
    finish("/v1/geo", &request_id, started, outcome)
}
