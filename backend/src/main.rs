mod advisory;
mod auth;
mod config;
mod db;
mod diagnosis;
mod inference;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use advisory::catalog::AdvisoryCatalog;
use auth::jwt::JwtService;
use auth::middleware::AuthMiddleware;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use config::{AppConfig, StorageBackend};
use db::dynamodb_repository::DynamoDbRepository;
use diagnosis::pipeline::DiagnosisPipeline;
use diagnosis::recorder::{AwsRecorder, DiagnosisRecorder, MemoryRecorder};
use diagnosis::service::DiagnosisService;
use inference::model::ClassifierService;
use routes::{configure_routes, RouteSettings};
use std::env;
use std::io;
use std::sync::Arc;
use storage::s3_service::S3Service;

async fn build_recorder(storage: &StorageBackend) -> Arc<dyn DiagnosisRecorder> {
    match storage {
        StorageBackend::Memory => {
            log::warn!("Using in-memory diagnosis storage; history is lost on restart");
            Arc::new(MemoryRecorder::new())
        }
        StorageBackend::Aws {
            diagnoses_table,
            s3_bucket,
        } => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            let db_repo =
                DynamoDbRepository::new(DynamoDbClient::new(&aws_config), diagnoses_table.clone());
            let s3_service = S3Service::new(S3Client::new(&aws_config), s3_bucket.clone());
            log::info!(
                "Storing diagnoses in DynamoDB table {} and S3 bucket {}",
                diagnoses_table,
                s3_bucket
            );
            Arc::new(AwsRecorder::new(db_repo, s3_service))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::other(e)
    })?;

    let catalog = AdvisoryCatalog::load(&config.catalog_path).map_err(|e| {
        log::error!(
            "Failed to load advisory catalog from {}: {}",
            config.catalog_path.display(),
            e
        );
        io::Error::other(e)
    })?;

    let classifier = ClassifierService::load(&config.labels_path, &config.model_path);
    if let Some(labels) = classifier.labels() {
        for label in catalog.missing_labels(labels) {
            log::warn!("No advice configured for label '{}'", label);
        }
    }
    if let ClassifierService::Unavailable { reason } = &classifier {
        log::warn!("Predictions are disabled: {}", reason);
    }

    let pipeline = DiagnosisPipeline::new(classifier, Arc::new(catalog));
    let recorder = build_recorder(&config.storage).await;
    let diagnosis_service = DiagnosisService::new(pipeline, recorder);

    let auth_middleware = AuthMiddleware::new(JwtService::new(&config.jwt_secret));
    let settings = RouteSettings {
        examples_dir: config.examples_dir.clone(),
        max_image_bytes: config.max_image_bytes,
    };

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let settings = settings.clone();
        App::new()
            .wrap(auth_middleware.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(diagnosis_service.clone()))
            .configure(move |cfg| configure_routes(cfg, settings))
    })
    .bind(&bind_address)?
    .run()
    .await
}
