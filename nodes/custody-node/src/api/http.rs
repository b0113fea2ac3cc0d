// std
use std::{net::SocketAddr, sync::Arc};
// crates
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header::InvalidHeaderValue, HeaderValue},
    response::{IntoResponse, Response},
    routing, Json, Router, Server,
};
use bytes::Bytes;
use custody_api::{
    keys,
    messages::{
        Algorithm, KeyId, KeyInfo, PublicKey, Signature, SignatureRequest, Void, ENVELOPE_LEN,
        MAX_CONTENT_LEN,
    },
    Backend, ErrorCode,
};
use hyper::{
    header::{CONTENT_TYPE, USER_AGENT},
    StatusCode,
};
use key_management_system::{BackendIndex, KmsError};
use serde::de::DeserializeOwned;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
// internal
use crate::api::paths;

/// JSON carries content as hex, two characters per byte.
pub const MAX_BODY_LEN: usize = 2 * MAX_CONTENT_LEN + ENVELOPE_LEN;

/// Configuration for the Http Server
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct AxumBackendSettings {
    /// Socket where the server will be listening on for incoming requests.
    pub address: SocketAddr,
    /// Allowed origins for this server deployment requests.
    pub cors_origins: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("Invalid CORS origin {origin}: {source}")]
    InvalidOrigin {
        origin: String,
        source: InvalidHeaderValue,
    },
    #[error(transparent)]
    Server(#[from] hyper::Error),
}

pub struct AxumBackend {
    settings: AxumBackendSettings,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_key,
        delete_key,
        sign,
        key_info,
    ),
    components(
        schemas(Algorithm, KeyId, KeyInfo, PublicKey, Signature, SignatureRequest, Void)
    ),
    tags(
        (name = "keys", description = "key custody and signing APIs")
    )
)]
struct ApiDoc;

impl Backend for AxumBackend {
    type Error = HttpError;
    type Settings = AxumBackendSettings;

    async fn new(settings: Self::Settings) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        Ok(Self { settings })
    }

    async fn serve(self, index: Arc<BackendIndex>) -> Result<(), Self::Error> {
        let app = router(index, &self.settings.cors_origins)?;
        info!(address = %self.settings.address, "Serving HTTP");
        Server::bind(&self.settings.address)
            .serve(app.into_make_service())
            .await?;
        Ok(())
    }
}

/// Routes and middleware of the HTTP front, without a listener attached.
pub fn router(index: Arc<BackendIndex>, cors_origins: &[String]) -> Result<Router, HttpError> {
    let mut builder = CorsLayer::new();
    if cors_origins.is_empty() {
        builder = builder.allow_origin(Any);
    }

    for origin in cors_origins {
        let value = origin
            .as_str()
            .parse::<HeaderValue>()
            .map_err(|source| HttpError::InvalidOrigin {
                origin: origin.clone(),
                source,
            })?;
        builder = builder.allow_origin(value);
    }

    Ok(Router::new()
        .route(paths::OPENAPI, routing::get(openapi))
        .route(paths::CREATE_KEY, routing::post(create_key))
        .route(paths::DELETE_KEY, routing::post(delete_key))
        .route(paths::SIGN, routing::post(sign))
        .route(paths::KEY_INFO, routing::get(key_info))
        .with_state(index)
        .layer(DefaultBodyLimit::max(MAX_BODY_LEN))
        .layer(
            builder
                .allow_headers([CONTENT_TYPE, USER_AGENT])
                .allow_methods(Any),
        )
        .layer(TraceLayer::new_for_http()))
}

fn error_response(error: &KmsError) -> Response {
    match ErrorCode::from(error) {
        // Unknown keys answer with a bare status.
        ErrorCode::NotFound => StatusCode::NOT_FOUND.into_response(),
        ErrorCode::InvalidArgument => (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
        ErrorCode::Internal => {
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

/// Bodies are decoded by hand so that malformed JSON gets the same 400 as
/// any other bad argument, whatever the content type header says.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Malformed request body: {e}"),
        )
            .into_response()
    })
}

macro_rules! make_request_and_return_response {
    ($cond:expr) => {{
        match $cond.await {
            ::std::result::Result::Ok(val) => ::axum::response::IntoResponse::into_response((
                ::hyper::StatusCode::OK,
                ::axum::Json(val),
            )),
            ::std::result::Result::Err(e) => error_response(&e),
        }
    }};
}

macro_rules! parse_body_or_return {
    ($body:expr) => {
        match parse_body(&$body) {
            ::std::result::Result::Ok(message) => message,
            ::std::result::Result::Err(response) => return response,
        }
    };
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/new/{algorithm}",
    params(
        ("algorithm" = String, Path, description = "Algorithm tag of the backend to mint the key in")
    ),
    responses(
        (status = 200, description = "Create a key pair", body = PublicKey),
        (status = 400, description = "No backend serves the algorithm", body = String),
        (status = 500, description = "Internal server error", body = String),
    )
)]
async fn create_key(
    State(index): State<Arc<BackendIndex>>,
    Path(algorithm): Path<String>,
) -> Response {
    make_request_and_return_response!(keys::create_key(&index, Algorithm { algorithm }))
}

#[utoipa::path(
    post,
    path = "/delete",
    request_body = KeyId,
    responses(
        (status = 200, description = "Delete a key", body = Void),
        (status = 400, description = "Malformed request", body = String),
        (status = 404, description = "Unknown key"),
        (status = 500, description = "Internal server error", body = String),
    )
)]
async fn delete_key(State(index): State<Arc<BackendIndex>>, body: Bytes) -> Response {
    let key_id: KeyId = parse_body_or_return!(body);
    make_request_and_return_response!(keys::delete_key(&index, key_id))
}

#[utoipa::path(
    post,
    path = "/sign",
    request_body = SignatureRequest,
    responses(
        (status = 200, description = "Sign content with a stored key", body = Signature),
        (status = 400, description = "Malformed request", body = String),
        (status = 404, description = "Unknown key"),
        (status = 500, description = "Signing failed", body = String),
    )
)]
async fn sign(State(index): State<Arc<BackendIndex>>, body: Bytes) -> Response {
    let request: SignatureRequest = parse_body_or_return!(body);
    make_request_and_return_response!(keys::sign(&index, request))
}

#[utoipa::path(
    get,
    path = "/{id}",
    params(
        ("id" = String, Path, description = "Key identifier")
    ),
    responses(
        (status = 200, description = "Public half and metadata of a key", body = PublicKey),
        (status = 404, description = "Unknown key"),
        (status = 500, description = "Internal server error", body = String),
    )
)]
async fn key_info(State(index): State<Arc<BackendIndex>>, Path(id): Path<String>) -> Response {
    make_request_and_return_response!(keys::key_info(&index, KeyId { id }))
}
