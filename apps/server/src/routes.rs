//! HTTP surface over the document store. Handlers are thin: validate, call
//! the core operation, map errors to status codes.

use std::sync::Arc;

use axum::{
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use lectro_core::{
	ops::{
		heartbeat::{self, HeartbeatInput, HeartbeatOutput},
		maintenance::{
			self, CleanupReport, CoverCleanupReport, MigrateUserInput, MigrateUserReport,
		},
		sync::{self, SyncPushInput, SyncPushOutput},
	},
	DocumentStore, HeartbeatError, LibraryDocument, StoreError,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::error;

pub fn router(store: Arc<DocumentStore>) -> Router {
	Router::new()
		.route("/", get(|| async { "Lectro Server!" }))
		.route("/health", get(|| async { "OK" }))
		.route("/api/sync/metadata", get(pull).post(push))
		.route("/api/sync/heartbeat", post(beat))
		.route(
			"/api/maintenance/cleanup",
			get(cleanup_preview).post(cleanup_apply),
		)
		.route(
			"/api/maintenance/covers",
			get(covers_preview).post(covers_apply),
		)
		.route("/api/maintenance/migrate-user", post(migrate_user))
		.fallback(|| async { (StatusCode::NOT_FOUND, "404 Not Found") })
		.layer(CorsLayer::permissive())
		.with_state(store)
}

/// Error envelope for every endpoint: `{ "error": <message> }` with the
/// status the failure maps to. Store failures are 500s; merges are
/// idempotent and timestamp-driven, so clients may retry the same request.
struct ApiError {
	status: StatusCode,
	message: String,
}

impl From<StoreError> for ApiError {
	fn from(e: StoreError) -> Self {
		error!(error = %e, "store operation failed");
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			message: e.to_string(),
		}
	}
}

impl From<HeartbeatError> for ApiError {
	fn from(e: HeartbeatError) -> Self {
		match e {
			HeartbeatError::MissingField(_) => Self {
				status: StatusCode::BAD_REQUEST,
				message: e.to_string(),
			},
			HeartbeatError::Store(e) => e.into(),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(json!({ "error": self.message }))).into_response()
	}
}

async fn pull(
	State(store): State<Arc<DocumentStore>>,
) -> Result<Json<LibraryDocument>, ApiError> {
	Ok(Json(sync::pull(&store).await?))
}

async fn push(
	State(store): State<Arc<DocumentStore>>,
	Json(input): Json<SyncPushInput>,
) -> Result<Json<SyncPushOutput>, ApiError> {
	Ok(Json(sync::push(&store, input).await?))
}

async fn beat(
	State(store): State<Arc<DocumentStore>>,
	Json(input): Json<HeartbeatInput>,
) -> Result<Json<HeartbeatOutput>, ApiError> {
	Ok(Json(heartbeat::heartbeat(&store, input).await?))
}

async fn cleanup_preview(
	State(store): State<Arc<DocumentStore>>,
) -> Result<Json<CleanupReport>, ApiError> {
	Ok(Json(maintenance::cleanup(&store, false).await?))
}

async fn cleanup_apply(
	State(store): State<Arc<DocumentStore>>,
) -> Result<Json<CleanupReport>, ApiError> {
	Ok(Json(maintenance::cleanup(&store, true).await?))
}

async fn covers_preview(
	State(store): State<Arc<DocumentStore>>,
) -> Result<Json<CoverCleanupReport>, ApiError> {
	Ok(Json(maintenance::clean_covers(&store, false).await?))
}

async fn covers_apply(
	State(store): State<Arc<DocumentStore>>,
) -> Result<Json<CoverCleanupReport>, ApiError> {
	Ok(Json(maintenance::clean_covers(&store, true).await?))
}

async fn migrate_user(
	State(store): State<Arc<DocumentStore>>,
	Json(input): Json<MigrateUserInput>,
) -> Result<Json<MigrateUserReport>, ApiError> {
	Ok(Json(maintenance::migrate_user(&store, input).await?))
}
