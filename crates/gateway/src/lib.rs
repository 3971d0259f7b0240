use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod auth;
pub mod capability;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod models;
pub mod multipart;
pub mod ratelimit;
pub mod store;

use crate::auth::RoleAuthGate;
use crate::capability::CapabilityIssuer;
use crate::config::Config;
use crate::metadata::MetadataIndex;
use crate::multipart::MultipartStore;
use crate::ratelimit::RateLimiter;
use crate::store::ObjectStore;

/// Cap for the JSON bodies of share routes; raw transfer bodies have
/// their own, much larger cap in `handlers::storage`.
pub const JSON_BODY_LIMIT: usize = 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub metadata: MetadataIndex,
    pub objects: ObjectStore,
    pub multipart: MultipartStore,
    pub capabilities: CapabilityIssuer,
    pub auth: RoleAuthGate,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> std::io::Result<Self> {
        let objects = ObjectStore::new(&config.storage_root)?;
        let multipart = MultipartStore::new(objects.clone());
        let capabilities = CapabilityIssuer::new(&config.signing_secret, &config.public_base_url);
        let auth = RoleAuthGate::new(&config.signing_secret);
        Ok(Self {
            metadata: MetadataIndex::new(),
            objects,
            multipart,
            capabilities,
            auth,
            limiter: RateLimiter::new(),
            config,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let shares = Router::new()
        .route("/shares", post(handlers::shares::create_share))
        .route("/shares/:id/auth", post(handlers::shares::auth_uploader))
        .route(
            "/shares/:id/auth-download",
            post(handlers::shares::auth_viewer),
        )
        .route("/shares/:id/upload-url", post(handlers::shares::upload_url))
        .route(
            "/shares/:id/upload-complete",
            post(handlers::shares::upload_complete),
        )
        .route(
            "/shares/:id/multipart/init",
            post(handlers::shares::multipart_init),
        )
        .route(
            "/shares/:id/multipart/:upload_id/part-url",
            post(handlers::shares::part_url),
        )
        .route(
            "/shares/:id/multipart/:upload_id/complete",
            post(handlers::shares::multipart_complete),
        )
        .route("/shares/:id/files", get(handlers::shares::list_files))
        .route(
            "/shares/:id/files/:file_id",
            delete(handlers::shares::delete_file),
        )
        .route(
            "/shares/:id/download-url/:file_id",
            get(handlers::shares::download_url),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::require_within_limits,
        ))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT));

    let storage = Router::new()
        .route("/store/upload", put(handlers::storage::upload))
        .route("/store/download", get(handlers::storage::download))
        .route(
            "/store/multipart/part",
            put(handlers::storage::upload_part),
        );

    Router::new()
        .route("/health", get(health))
        .merge(shares)
        .merge(storage)
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
