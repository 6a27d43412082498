use actix_web::{App, HttpServer, middleware::Logger, web};
use config::Config;
use domain::AggregationService;
use sentiment_scorers::{RobertaClassifier, SentimentClassifier, VaderScorer};
use std::io::{Error, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use telemetry::Metrics;
use tokio::time::interval;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod domain;
mod handlers;
mod middleware;
mod models;
mod telemetry;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::analyze,
        handlers::analyze_batch,
        handlers::health,
        handlers::metrics_endpoint
    ),
    components(
        schemas(
            models::AnalysisRequest,
            models::AnalysisResponse,
            models::BatchResult,
            models::BatchSummary,
            models::BatchResponse,
            models::ErrorResponse
        )
    ),
    tags(
        (name = "analysis", description = "Sentiment analysis endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "Sentiment Analysis API",
        version = "1.0.0",
        description = "Lexicon and transformer sentiment scores for a single text"
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    )
)]
struct ApiDoc;

#[inline(always)]
#[allow(clippy::io_other_error)]
fn to_io_error(e: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Other, format!("{e}"))
}

/// Start a background task to periodically update system metrics
#[inline(always)]
async fn start_metrics_updater(metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            metrics.update_system_metrics();
        }
    });
}

/// Loads the lexicon and both transformer models once for the whole process.
async fn load_service(
    config: &Config,
    metrics: Arc<Metrics>,
) -> anyhow::Result<AggregationService> {
    let source = config.models.lexicon_source();
    tracing::info!("Loading lexicon from {source:?}");
    let vader = VaderScorer::load(source).await?;
    tracing::info!("Lexicon loaded with {} entries", vader.lexicon().len());

    let capacity = config.models.channel_capacity;
    let (_roberta_handle, roberta) =
        RobertaClassifier::spawn(config.models.roberta_resources(), capacity).await?;
    let (_pipeline_handle, pipeline) = SentimentClassifier::spawn(capacity).await?;

    Ok(AggregationService::new(
        Arc::new(vader),
        Arc::new(roberta),
        Arc::new(pipeline),
        config.fault_policy.policies(),
        metrics,
    ))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(to_io_error)?;

    config.validate().map_err(to_io_error)?;

    telemetry::init_telemetry(&config).map_err(to_io_error)?;

    tracing::info!(
        "Starting {} on {}:{}",
        config.telemetry.service_name,
        config.server.host,
        config.server.port
    );

    let metrics = Arc::new(Metrics::new(&config.metrics.histogram_buckets).map_err(to_io_error)?);

    if config.metrics.enabled {
        start_metrics_updater(metrics.clone()).await;
    }

    let service = web::Data::new(
        load_service(&config, metrics.clone())
            .await
            .map_err(to_io_error)?,
    );

    tracing::info!(
        "Fault policies: vader={}, roberta={}, huggingface={}",
        config.fault_policy.vader.as_str(),
        config.fault_policy.roberta.as_str(),
        config.fault_policy.huggingface.as_str()
    );

    let openapi = ApiDoc::openapi();

    let metrics_middleware = middleware::MetricsMiddleware::new(metrics.clone());
    let metrics_data = web::Data::from(metrics);

    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let server_workers = config.server.workers;
    let server_keep_alive = config.server.keep_alive;
    let server_request_timeout = config.server.request_timeout;
    let allowed_origin = config.server.origin.clone();
    let batch_limit = config.server.batch_limit_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(metrics_data.clone())
            .app_data(web::JsonConfig::default().limit(batch_limit))
            .wrap(metrics_middleware.clone())
            .wrap(Logger::new(
                "%a %t \"%r\" %s %b \"%{Referer}i\" \"%{User-Agent}i\" %T",
            ))
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(handlers::cors(&allowed_origin))
            .configure(handlers::routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .default_service(web::route().to(|| async {
                actix_web::HttpResponse::NotFound().json(serde_json::json!({
                    "error": "The requested resource was not found"
                }))
            }))
    })
    .workers(server_workers)
    .keep_alive(Duration::from_secs(server_keep_alive))
    .client_request_timeout(Duration::from_secs(server_request_timeout))
    .bind(format!("{server_host}:{server_port}"))?;

    tracing::info!("Server running at http://{}:{}", server_host, server_port);
    tracing::info!("Allowed origin: {}", config.server.origin);
    tracing::info!(
        "Swagger UI available at http://{}:{}/swagger-ui/",
        server_host,
        server_port
    );

    server.run().await
}
