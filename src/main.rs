//! Document Verify Consumer - Kafka-driven certificate and business license verification.

mod bus;
mod business;
mod config;
mod dispatcher;
mod error;
mod extractor;
mod geometry;
mod google_auth;
mod masking;
mod messages;
mod ocr;
mod registry;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, response::Json, routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bus::{KafkaConsumerService, KafkaPublisher};
use business::{GymMatcher, HttpGymMatcher, NoGymMatcher, NtsBusinessValidator};
use config::AppConfig;
use dispatcher::{ConsumerStats, Dispatcher, Services, StatsSnapshot};
use extractor::FieldExtractor;
use google_auth::ServiceAccountAuth;
use ocr::document_ai::DocumentAiProvider;
use registry::HttpCertificateRegistry;
use storage::S3ImageStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "doc_verify_consumer=debug,tower_http=info,rdkafka=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting consumer (brokers {}, group {}, scan certificates: {}, scan licenses: {})",
        config.kafka.bootstrap_servers,
        config.kafka.group_id,
        config.pipeline.scan_certificates,
        config.pipeline.scan_licenses
    );

    let http = reqwest::Client::new();

    let auth = ServiceAccountAuth::from_key_file(&config.document_ai.credentials_path)?;
    info!("Document AI credentials loaded for {}", auth.client_email());
    let ocr = DocumentAiProvider::new(http.clone(), auth, &config.document_ai);

    let images = S3ImageStore::new(http.clone(), &config.storage).await;
    info!("Object store ready (bucket {})", config.storage.bucket);

    let gyms: Arc<dyn GymMatcher> = match &config.business.gym_matcher_url {
        Some(url) => Arc::new(HttpGymMatcher::new(http.clone(), url.as_str())),
        None => {
            info!("GYM_MATCHER_URL not set; business licenses will carry no gym id");
            Arc::new(NoGymMatcher)
        }
    };

    let services = Services {
        images: Arc::new(images),
        ocr: Arc::new(ocr),
        registry: Arc::new(HttpCertificateRegistry::new(http.clone(), config.registry_url.as_str())),
        business: Arc::new(NtsBusinessValidator::new(
            http.clone(),
            config.business.validate_url.as_str(),
            config.business.service_key.as_str(),
        )),
        gyms,
        publisher: Arc::new(KafkaPublisher::new(&config.kafka)?),
    };

    let extractor = FieldExtractor::new().context("Failed to compile field grammars")?;
    let stats = Arc::new(ConsumerStats::default());
    let dispatcher = Dispatcher::new(services, extractor, config.pipeline, stats.clone());
    let consumer = KafkaConsumerService::new(&config.kafka, dispatcher)?;

    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(stats);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("Health endpoint listening on http://{}", config.http_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server stopped: {}", e);
        }
    });

    tokio::select! {
        result = consumer.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    Ok(())
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Message counters since startup.
async fn status(State(stats): State<Arc<ConsumerStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}
