//! HTTP surface.
//!
//! - POST /upload       - multipart `image` + `name`; registers a face
//! - POST /authenticate - multipart `image`; returns the matched name
//! - GET  /status       - daemon status JSON

use crate::service::{FaceService, ImageUpload, ServiceError};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

const IMAGE_FIELD: &str = "image";
const NAME_FIELD: &str = "name";

/// Build the router over a shared service.
pub fn router(service: FaceService, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/authenticate", post(authenticate))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Errors surfaced to HTTP clients as `{"message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    Multipart(StatusCode),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::warn!(error = %rejection, "rejected non-multipart request");
        ApiError::Multipart(StatusCode::BAD_REQUEST)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        tracing::warn!(error = %e, "malformed multipart body");
        ApiError::Multipart(e.status())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Multipart(code) if code == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Upload too large")
            }
            ApiError::Multipart(_) => (StatusCode::BAD_REQUEST, "Malformed multipart body"),
            ApiError::Service(e) => match e {
                ServiceError::MissingField(message) => (StatusCode::BAD_REQUEST, message),
                ServiceError::InvalidImage(_) => (StatusCode::BAD_REQUEST, "Invalid image"),
                ServiceError::NoFaceDetected => {
                    (StatusCode::BAD_REQUEST, "No face found in the image")
                }
                ServiceError::AuthenticationFailed => {
                    (StatusCode::UNAUTHORIZED, "Authentication failed")
                }
                internal => {
                    tracing::error!(error = %internal, "request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            },
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Fields of interest pulled out of a multipart body.
#[derive(Default)]
struct Form {
    image: Option<ImageUpload>,
    name: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<Form, ApiError> {
    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some(IMAGE_FIELD) => {
                let file_name = field.file_name().map(str::to_owned);
                let bytes = field.bytes().await?;
                form.image = Some(ImageUpload { file_name, bytes });
            }
            Some(NAME_FIELD) => form.name = Some(field.text().await?),
            other => tracing::debug!(field = ?other, "ignoring multipart field"),
        }
    }
    Ok(form)
}

async fn upload(
    State(service): State<FaceService>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart?).await?;
    service.register(form.image, form.name.as_deref()).await?;
    Ok(Json(json!({ "message": "User registered successfully" })))
}

async fn authenticate(
    State(service): State<FaceService>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart?).await?;
    let name = service.authenticate(form.image).await?;
    Ok(Json(json!({ "message": "Login successful", "name": name })))
}

async fn status(State(service): State<FaceService>) -> impl IntoResponse {
    Json(service.status())
}
