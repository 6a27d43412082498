use crate::domain::{AggregationService, AnalysisError};
use crate::models::{AnalysisRequest, AnalysisResponse, BatchResponse, ErrorResponse};
use crate::telemetry::Metrics;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{HttpResponse, get, post, web};
use chrono::Utc;

const BATCH_FORMAT_ERROR: &str = "Expected an array of objects with a text field";

/// Registers every route served by the API.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(metrics_endpoint)
        .service(analyze_batch)
        .service(analyze);
}

/// Cross-origin policy allowing a single caller origin.
///
/// Requests carrying any other `Origin` are answered with 400 before routing.
pub fn cors(origin: &str) -> Cors {
    Cors::default()
        .allowed_origin(origin)
        .block_on_origin_mismatch(true)
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}

fn error_response(err: &AnalysisError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };
    match err {
        AnalysisError::MissingText => HttpResponse::BadRequest().json(body),
        AnalysisError::Scorer { scorer, .. } => {
            tracing::debug!(scorer = *scorer, "responding with scorer failure");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn outcome(err: &AnalysisError) -> &'static str {
    match err {
        AnalysisError::MissingText => "invalid",
        AnalysisError::Scorer { .. } => "failed",
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = String),
    )
)]
#[get("/health")]
pub async fn health(metrics: web::Data<Metrics>) -> HttpResponse {
    metrics.update_system_metrics();

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "uptime_seconds": metrics.uptime_seconds.get(),
    }))
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Prometheus metrics", body = String),
    )
)]
#[get("/metrics")]
pub async fn metrics_endpoint(metrics: web::Data<Metrics>) -> HttpResponse {
    metrics.update_system_metrics();

    match metrics.export() {
        Ok(metrics_text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics_text),
        Err(e) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: format!("Failed to export metrics: {e}"),
        }),
    }
}

#[utoipa::path(
    post,
    path = "/analyze",
    tag = "analysis",
    request_body = AnalysisRequest,
    responses(
        (status = 200, description = "Scores of all three scorers", body = AnalysisResponse),
        (status = 400, description = "No text provided", body = ErrorResponse),
        (status = 500, description = "A scorer failed", body = ErrorResponse),
    )
)]
#[post("/analyze")]
pub async fn analyze(
    payload: Option<web::Json<AnalysisRequest>>,
    service: web::Data<AggregationService>,
    metrics: web::Data<Metrics>,
) -> HttpResponse {
    // absent or unparseable bodies are treated like a body without text
    let request = payload.map(web::Json::into_inner).unwrap_or_default();

    match service.analyze(&request).await {
        Ok(response) => {
            metrics.record_analysis("/analyze", "success");
            HttpResponse::Ok().json(response)
        }
        Err(err) => {
            metrics.record_analysis("/analyze", outcome(&err));
            tracing::error!("analysis failed: {err}");
            error_response(&err)
        }
    }
}

#[utoipa::path(
    post,
    path = "/analyze/batch",
    tag = "analysis",
    request_body = Vec<AnalysisRequest>,
    responses(
        (status = 200, description = "Per text scores and label summary", body = BatchResponse),
        (
            status = 400,
            description = "Malformed batch or an item without text",
            body = ErrorResponse
        ),
        (status = 500, description = "A scorer failed", body = ErrorResponse),
    )
)]
#[post("/analyze/batch")]
pub async fn analyze_batch(
    payload: Option<web::Json<Vec<AnalysisRequest>>>,
    service: web::Data<AggregationService>,
    metrics: web::Data<Metrics>,
) -> HttpResponse {
    let Some(requests) = payload.map(web::Json::into_inner) else {
        metrics.record_analysis("/analyze/batch", "invalid");
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: BATCH_FORMAT_ERROR.to_string(),
        });
    };

    match service.analyze_batch(&requests).await {
        Ok(response) => {
            metrics.record_analysis("/analyze/batch", "success");
            tracing::info!(
                texts = response.results.len(),
                positive = response.summary.positive,
                negative = response.summary.negative,
                neutral = response.summary.neutral,
                "batch analyzed"
            );
            HttpResponse::Ok().json(response)
        }
        Err(err) => {
            metrics.record_analysis("/analyze/batch", outcome(&err));
            tracing::error!("batch analysis failed: {err}");
            error_response(&err)
        }
    }
}
