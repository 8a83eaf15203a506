//! HTTP surface of the indexer.
//!
//! - `POST /witness/{mapName}` body `{key}` → root, current value and
//!   sibling path for that key.
//! - `POST /update/{mapName}` body `{key}` → marks the key consumed.
//! - `GET /health` → local replica root vs the authoritative root.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bridge_map::WitnessResponse;
use bridge_types::{MapName, Scalar};

use crate::{IndexerError, IndexerState};

#[derive(Debug, Deserialize)]
struct KeyBody {
	key: String,
}

pub fn router(state: Arc<IndexerState>) -> Router {
	Router::new()
		.route("/witness/{map}", post(witness))
		.route("/update/{map}", post(update))
		.route("/health", get(health))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Binds and serves the indexer API until the task is aborted.
pub async fn serve(state: Arc<IndexerState>, port: u16) -> Result<(), IndexerError> {
	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
		.await
		.map_err(|e| IndexerError::Storage(e.to_string()))?;
	info!(port, "indexer API listening");
	axum::serve(listener, router(state))
		.await
		.map_err(|e| IndexerError::Storage(e.to_string()))
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.0, Json(json!({ "error": self.1 }))).into_response()
	}
}

impl From<IndexerError> for ApiError {
	fn from(e: IndexerError) -> Self {
		let status = match &e {
			IndexerError::UnknownMap(_) => StatusCode::NOT_FOUND,
			IndexerError::InvalidKey(_) | IndexerError::Map(_) => StatusCode::BAD_REQUEST,
			IndexerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
		};
		ApiError(status, e.to_string())
	}
}

fn parse_map(raw: &str) -> Result<MapName, IndexerError> {
	raw.parse()
		.map_err(|_| IndexerError::UnknownMap(raw.to_string()))
}

fn parse_key(raw: &str) -> Result<Scalar, IndexerError> {
	Scalar::from_hex(raw).map_err(|e| IndexerError::InvalidKey(e.to_string()))
}

async fn witness(
	State(state): State<Arc<IndexerState>>,
	Path(map): Path<String>,
	Json(body): Json<KeyBody>,
) -> Result<Json<WitnessResponse>, ApiError> {
	let map = parse_map(&map)?;
	let key = parse_key(&body.key)?;
	let store = state.store(map).read().await;
	Ok(Json(store.get_witness(&key)))
}

async fn update(
	State(state): State<Arc<IndexerState>>,
	Path(map): Path<String>,
	Json(body): Json<KeyBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let map = parse_map(&map)?;
	let key = parse_key(&body.key)?;
	let new_root = state.store(map).write().await.mark_consumed(key).await?;
	Ok(Json(json!({ "status": "ok", "newRoot": new_root })))
}

async fn health(State(state): State<Arc<IndexerState>>) -> Json<serde_json::Value> {
	let intents_root = state.store(MapName::Intents).read().await.root();
	let nullifiers_root = state.store(MapName::Nullifiers).read().await.root();

	// the consuming map's root is the headline value, as in the original
	// service; the external root comes from the registry handle when the
	// indexer runs in-process
	let external = match state.external() {
		Some(view) => view.root_of(MapName::Nullifiers).to_hex(),
		None => "unknown".to_string(),
	};

	Json(json!({
		"status": "ok",
		"localRoot": nullifiers_root,
		"externalRoot": external,
		"maps": {
			"intents": intents_root,
			"nullifiers": nullifiers_root,
		},
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MapStore;
	use axum::body::Body;
	use axum::http::Request;
	use tower::ServiceExt;

	fn test_state() -> Arc<IndexerState> {
		Arc::new(IndexerState::new(
			MapStore::in_memory(MapName::Intents),
			MapStore::in_memory(MapName::Nullifiers),
		))
	}

	async fn response_json(response: Response) -> serde_json::Value {
		let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
			.await
			.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri(uri)
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	#[tokio::test]
	async fn witness_then_update_round_trip() {
		let state = test_state();
		let key_hex = Scalar::from_u64(9).to_hex();

		let response = router(state.clone())
			.oneshot(post_json(
				"/witness/nullifiers",
				json!({ "key": key_hex }),
			))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = response_json(response).await;
		assert_eq!(body["oldValue"], json!(Scalar::ZERO.to_hex()));
		assert_eq!(body["witness"]["siblings"].as_array().unwrap().len(), 32);

		let response = router(state.clone())
			.oneshot(post_json("/update/nullifiers", json!({ "key": key_hex })))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = response_json(response).await;
		assert_eq!(body["status"], "ok");

		let new_root: String = body["newRoot"].as_str().unwrap().to_string();
		assert_eq!(
			state.store(MapName::Nullifiers).read().await.root().to_hex(),
			new_root
		);
	}

	#[tokio::test]
	async fn unknown_map_is_404() {
		let response = router(test_state())
			.oneshot(post_json(
				"/witness/escrow",
				json!({ "key": Scalar::ZERO.to_hex() }),
			))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn malformed_key_is_400() {
		let response = router(test_state())
			.oneshot(post_json("/witness/intents", json!({ "key": "xyz" })))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn health_reports_roots() {
		let response = router(test_state())
			.oneshot(
				Request::builder()
					.uri("/health")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = response_json(response).await;
		assert_eq!(body["status"], "ok");
		assert_eq!(body["externalRoot"], "unknown");
		assert_eq!(body["localRoot"], body["maps"]["nullifiers"]);
	}
}
