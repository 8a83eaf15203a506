//! Witness/indexer service: off-chain replicas of both authenticated maps.
//!
//! The indexer replays accepted transitions into its replicas and serves
//! witnesses over HTTP. It is an untrusted collaborator: the core
//! re-verifies every witness against its own committed roots before use, so
//! a stale or corrupt replica can only cause retryable witness rejections,
//! never a bad commit.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::RwLock;

use bridge_map::MapError;
use bridge_types::{MapName, Scalar};

pub mod server;
pub mod store;

pub use server::{router, serve};
pub use store::MapStore;

#[derive(Debug, Error)]
pub enum IndexerError {
	#[error("unknown map: {0}")]
	UnknownMap(String),

	#[error("invalid key: {0}")]
	InvalidKey(String),

	/// Retryable backend failure; replica state on disk is never left
	/// half-written.
	#[error("storage error: {0}")]
	Storage(String),

	#[error(transparent)]
	Map(#[from] MapError),
}

/// Read access to the authoritative committed roots, used by `/health` to
/// report drift between replica and registry.
pub trait RootView: Send + Sync {
	fn root_of(&self, map: MapName) -> Scalar;
}

/// Shared state of the indexer: one replica per map, plus an optional view
/// of the authoritative roots.
pub struct IndexerState {
	intents: RwLock<MapStore>,
	nullifiers: RwLock<MapStore>,
	external: OnceLock<Arc<dyn RootView>>,
}

impl IndexerState {
	pub fn new(intents: MapStore, nullifiers: MapStore) -> Self {
		Self {
			intents: RwLock::new(intents),
			nullifiers: RwLock::new(nullifiers),
			external: OnceLock::new(),
		}
	}

	/// Attaches the authoritative root view once the engine exists; the
	/// indexer is constructed first because the engine's witness provider
	/// needs it.
	pub fn set_external(&self, external: Arc<dyn RootView>) {
		let _ = self.external.set(external);
	}

	pub fn store(&self, map: MapName) -> &RwLock<MapStore> {
		match map {
			MapName::Intents => &self.intents,
			MapName::Nullifiers => &self.nullifiers,
		}
	}

	pub fn external(&self) -> Option<&Arc<dyn RootView>> {
		self.external.get()
	}

	/// Replays one accepted transition into the owning replica.
	pub async fn apply(
		&self,
		map: MapName,
		key: Scalar,
		value: Scalar,
	) -> Result<Scalar, IndexerError> {
		self.store(map).write().await.apply(key, value).await
	}
}
