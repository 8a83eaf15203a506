//! Witness providers: how the engine reaches the indexer.
//!
//! The engine never trusts a provider's root computation. Every response is
//! re-verified against the registry's committed root before use; a provider
//! can at worst cause a retryable stale-witness rejection.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use bridge_indexer::IndexerState;
use bridge_map::WitnessResponse;
use bridge_registry::AcceptedTransition;
use bridge_types::{MapName, Scalar};

#[derive(Debug, Error)]
pub enum ProviderError {
	/// The indexer cannot be reached; retryable, local state untouched.
	#[error("witness provider unreachable: {0}")]
	Unreachable(String),

	#[error("invalid provider response: {0}")]
	Invalid(String),
}

/// Access to an indexer serving witnesses for both maps.
#[async_trait]
pub trait WitnessProvider: Send + Sync {
	async fn witness(&self, map: MapName, key: Scalar) -> Result<WitnessResponse, ProviderError>;

	/// Propagates accepted transitions so the replica keeps serving fresh
	/// witnesses. Failures here never unwind a commit; the replica catches
	/// up through its own replay.
	async fn sync(&self, transitions: &[AcceptedTransition]) -> Result<(), ProviderError>;
}

/// In-process provider backed directly by the indexer state.
pub struct LocalWitnessProvider {
	state: Arc<IndexerState>,
}

impl LocalWitnessProvider {
	pub fn new(state: Arc<IndexerState>) -> Self {
		Self { state }
	}
}

#[async_trait]
impl WitnessProvider for LocalWitnessProvider {
	async fn witness(&self, map: MapName, key: Scalar) -> Result<WitnessResponse, ProviderError> {
		Ok(self.state.store(map).read().await.get_witness(&key))
	}

	async fn sync(&self, transitions: &[AcceptedTransition]) -> Result<(), ProviderError> {
		for t in transitions {
			self.state
				.apply(t.map, t.key, t.value)
				.await
				.map_err(|e| ProviderError::Invalid(e.to_string()))?;
		}
		Ok(())
	}
}

/// Remote provider speaking the indexer's HTTP contract.
pub struct HttpWitnessProvider {
	client: reqwest::Client,
	base_url: String,
}

impl HttpWitnessProvider {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into(),
		}
	}
}

#[async_trait]
impl WitnessProvider for HttpWitnessProvider {
	async fn witness(&self, map: MapName, key: Scalar) -> Result<WitnessResponse, ProviderError> {
		let url = format!("{}/witness/{}", self.base_url, map);
		let response = self
			.client
			.post(&url)
			.json(&serde_json::json!({ "key": key.to_hex() }))
			.send()
			.await
			.map_err(|e| ProviderError::Unreachable(e.to_string()))?;
		if !response.status().is_success() {
			return Err(ProviderError::Invalid(format!(
				"witness request returned {}",
				response.status()
			)));
		}
		response
			.json()
			.await
			.map_err(|e| ProviderError::Invalid(e.to_string()))
	}

	async fn sync(&self, transitions: &[AcceptedTransition]) -> Result<(), ProviderError> {
		for t in transitions {
			// the HTTP contract only exposes consuming updates; everything
			// else reaches the remote replica through its own replay
			if t.map != MapName::Nullifiers || t.value != Scalar::ONE {
				debug!(map = %t.map, key = %t.key, "transition left to indexer replay");
				continue;
			}
			let url = format!("{}/update/{}", self.base_url, t.map);
			let response = self
				.client
				.post(&url)
				.json(&serde_json::json!({ "key": t.key.to_hex() }))
				.send()
				.await
				.map_err(|e| ProviderError::Unreachable(e.to_string()))?;
			if !response.status().is_success() {
				return Err(ProviderError::Invalid(format!(
					"update request returned {}",
					response.status()
				)));
			}
		}
		Ok(())
	}
}
