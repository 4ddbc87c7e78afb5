use actix_cors::Cors;
use actix_multipart::{Multipart, MultipartError};
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::TryStreamExt;
use log::{error, warn};
use shared::{ErrorResponse, HealthResponse, PredictionResponse};

use crate::inference::decoder::DecodeError;
use crate::inference::{Classifier, DetectError, Detector, InferenceError};

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Copy)]
pub struct UploadLimit {
    pub max_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing multipart field \"file\"")]
    MissingFile,
    #[error("Upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Decode(DecodeError),
    #[error(transparent)]
    Inference(InferenceError),
    #[error("Inference worker failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Decode(e) => ApiError::Decode(e),
            DetectError::Inference(e) => ApiError::Inference(e),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::Multipart(_) | ApiError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Inference(_) | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes<C: Classifier>(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(["/predict/", "/predict"]).route(web::post().to(predict::<C>)))
        .service(web::resource("/health").route(web::get().to(health)));
}

/// Any origin, method and header.
pub fn cors() -> Cors {
    Cors::permissive()
}

async fn predict<C: Classifier>(
    detector: web::Data<Detector<C>>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let result = run_prediction(detector, limit.max_bytes, payload).await;
    match &result {
        Ok(probability) => log::debug!("Deepfake probability: {:.4}", probability),
        Err(e) if e.status_code().is_server_error() => error!("Prediction failed: {}", e),
        Err(e) => warn!("Rejected upload: {}", e),
    }

    Ok(HttpResponse::Ok().json(PredictionResponse {
        deepfake_probability: result?,
    }))
}

async fn run_prediction<C: Classifier>(
    detector: web::Data<Detector<C>>,
    max_bytes: usize,
    payload: Multipart,
) -> Result<f32, ApiError> {
    let image_data = read_upload(payload, max_bytes).await?;
    let detector = detector.into_inner();
    let probability = web::block(move || detector.predict(&image_data)).await??;
    Ok(probability)
}

/// Collects the bytes of the first `file` field; other fields are drained.
async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    let mut upload = None;

    while let Some(mut field) = payload.try_next().await? {
        if upload.is_some() || field.name() != Some(UPLOAD_FIELD) {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if image_data.len() + chunk.len() > max_bytes {
                return Err(ApiError::PayloadTooLarge { limit: max_bytes });
            }
            image_data.extend_from_slice(&chunk);
        }
        upload = Some(image_data);
    }

    upload.ok_or(ApiError::MissingFile)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".into(),
    })
}
