use actix_web::{middleware, web, App, HttpServer};
use deepdefender::config::ServerConfig;
use deepdefender::inference::classifier::TorchClassifier;
use deepdefender::inference::{Detector, ModelConfig};
use deepdefender::routes::{configure_routes, cors, UploadLimit};
use std::env;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServerConfig::from_env().map_err(|e| startup_error("Invalid settings", e))?;
    let model_config = ModelConfig::load(&config.model_config)
        .map_err(|e| startup_error("Failed to load model config", e))?;

    let classifier = TorchClassifier::load(&model_config.model_path)
        .map_err(|e| startup_error("Failed to load model", e))?;
    let detector = Detector::new(&model_config, classifier)
        .map_err(|e| startup_error("Invalid model config", e))?;

    let fake_class = detector.fake_class();
    log::info!(
        "Reporting class {} ({}) as deepfake",
        fake_class.index,
        fake_class.label.as_deref().unwrap_or("unlabeled")
    );

    let detector = web::Data::new(detector);
    let upload_limit = web::Data::new(UploadLimit {
        max_bytes: config.max_upload_bytes,
    });

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors())
            .app_data(detector.clone())
            .app_data(upload_limit.clone())
            .configure(configure_routes::<TorchClassifier>)
    })
    .bind(&bind_address)?
    .run()
    .await
}
