//! Persistent map replica.
//!
//! The flat persisted form is a single JSON object mapping hex keys to hex
//! values: the full assignment, rewritten after every consuming update.
//! Reload re-inserts every entry; the root only depends on the final
//! assignment, so replay order does not affect it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info};

use bridge_map::{SparseMap, WireWitness, WitnessResponse};
use bridge_types::{MapName, Scalar};

use crate::IndexerError;

pub struct MapStore {
	name: MapName,
	map: SparseMap,
	/// Snapshot path; in-memory only when absent.
	path: Option<PathBuf>,
}

impl MapStore {
	/// Replica without persistence, used in tests and ephemeral setups.
	pub fn in_memory(name: MapName) -> Self {
		Self {
			name,
			map: SparseMap::new(),
			path: None,
		}
	}

	/// Opens a replica backed by a snapshot file, loading it if present.
	pub async fn open(name: MapName, path: PathBuf) -> Result<Self, IndexerError> {
		let map = match fs::read_to_string(&path).await {
			Ok(raw) => {
				let entries: BTreeMap<String, String> = serde_json::from_str(&raw)
					.map_err(|e| IndexerError::Storage(e.to_string()))?;
				let map = SparseMap::from_snapshot(
					entries.iter().map(|(k, v)| (k.as_str(), v.as_str())),
				)?;
				info!(map = %name, entries = map.len(), root = %map.root(), "replica loaded");
				map
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(map = %name, "no snapshot found, starting empty");
				SparseMap::new()
			}
			Err(e) => return Err(IndexerError::Storage(e.to_string())),
		};
		Ok(Self {
			name,
			map,
			path: Some(path),
		})
	}

	pub fn name(&self) -> MapName {
		self.name
	}

	pub fn root(&self) -> Scalar {
		self.map.root()
	}

	/// Witness for a key in wire form. Total; absent keys return the zero
	/// value with an exclusion-shaped proof.
	pub fn get_witness(&self, key: &Scalar) -> WitnessResponse {
		let (root, witness, old_value) = self.map.get_witness(key);
		WitnessResponse {
			root,
			key: *key,
			old_value,
			witness: WireWitness::from_witness(key, &witness),
		}
	}

	/// Applies one accepted transition and rewrites the snapshot.
	pub async fn apply(&mut self, key: Scalar, value: Scalar) -> Result<Scalar, IndexerError> {
		let new_root = self.map.insert(key, value)?;
		self.persist().await?;
		Ok(new_root)
	}

	/// Marks a key consumed (value 1).
	pub async fn mark_consumed(&mut self, key: Scalar) -> Result<Scalar, IndexerError> {
		self.apply(key, Scalar::ONE).await
	}

	/// Full rewrite of the snapshot, atomically (temp file then rename).
	async fn persist(&self) -> Result<(), IndexerError> {
		let Some(path) = &self.path else {
			return Ok(());
		};

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| IndexerError::Storage(e.to_string()))?;
		}

		let snapshot = self.map.to_snapshot();
		let raw = serde_json::to_string_pretty(&snapshot)
			.map_err(|e| IndexerError::Storage(e.to_string()))?;

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, raw)
			.await
			.map_err(|e| IndexerError::Storage(e.to_string()))?;
		fs::rename(&temp_path, path)
			.await
			.map_err(|e| IndexerError::Storage(e.to_string()))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reload_reproduces_root() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nullifiers.json");

		let mut store = MapStore::open(MapName::Nullifiers, path.clone()).await.unwrap();
		for i in 0..10u64 {
			store.mark_consumed(Scalar::from_u64(i * 7 + 1)).await.unwrap();
		}
		let root = store.root();

		let reloaded = MapStore::open(MapName::Nullifiers, path).await.unwrap();
		assert_eq!(reloaded.root(), root);

		// served witnesses verify against the reloaded root
		let key = Scalar::from_u64(8);
		let response = reloaded.get_witness(&key);
		assert_eq!(response.root, root);
		assert_eq!(response.old_value, Scalar::ONE);
		let witness = response.witness.into_witness(&key).unwrap();
		assert!(witness.verify(&root, &key, &Scalar::ONE));
	}

	#[tokio::test]
	async fn missing_snapshot_starts_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = MapStore::open(MapName::Intents, dir.path().join("intents.json"))
			.await
			.unwrap();
		assert_eq!(store.root(), bridge_map::empty_root());
	}
}
