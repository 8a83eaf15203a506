//! Witness folding and the wire form served by the indexer.

use serde::{Deserialize, Serialize};

use bridge_types::{node_hash, Scalar};

use crate::{key_position, MapError, MAP_DEPTH};

/// Ordered sibling path authenticating one key's value under a root.
///
/// The fold direction at level `i` comes from bit `i` of the key's
/// position: a zero bit puts the accumulator on the left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapWitness {
	siblings: Vec<Scalar>,
}

impl MapWitness {
	pub fn new(siblings: Vec<Scalar>) -> Self {
		Self { siblings }
	}

	pub fn siblings(&self) -> &[Scalar] {
		&self.siblings
	}

	/// Recomputes the root implied by `(key, value)` under this path.
	pub fn fold(&self, key: &Scalar, value: &Scalar) -> Result<Scalar, MapError> {
		if self.siblings.len() != MAP_DEPTH {
			return Err(MapError::MalformedWitness(self.siblings.len()));
		}
		let position = key_position(key);
		let mut acc = *value;
		for (level, sibling) in self.siblings.iter().enumerate() {
			acc = if (position >> level) & 1 == 0 {
				node_hash(&acc, sibling)
			} else {
				node_hash(sibling, &acc)
			};
		}
		Ok(acc)
	}

	/// True iff this path proves `(key, value)` under `root`.
	pub fn verify(&self, root: &Scalar, key: &Scalar, value: &Scalar) -> bool {
		self.fold(key, value).map(|r| r == *root).unwrap_or(false)
	}

	/// Verifies `(key, old_value)` against `old_root`, then refolds with
	/// `new_value` to produce the successor root.
	pub fn commit(
		&self,
		old_root: &Scalar,
		key: &Scalar,
		old_value: &Scalar,
		new_value: &Scalar,
	) -> Result<Scalar, MapError> {
		if self.fold(key, old_value)? != *old_root {
			return Err(MapError::StaleWitness);
		}
		self.fold(key, new_value)
	}
}

/// Witness as it travels over the indexer HTTP surface: explicit direction
/// flags next to the siblings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireWitness {
	#[serde(rename = "isLeft")]
	pub is_left: Vec<bool>,
	pub siblings: Vec<Scalar>,
}

impl WireWitness {
	/// Wire form for a key's witness; directions derived from the key.
	pub fn from_witness(key: &Scalar, witness: &MapWitness) -> Self {
		let position = key_position(key);
		Self {
			is_left: (0..witness.siblings().len())
				.map(|level| (position >> level) & 1 == 0)
				.collect(),
			siblings: witness.siblings().to_vec(),
		}
	}

	/// Reconstructs the fold witness, cross-checking that the advertised
	/// directions match the key's position. The indexer is never trusted
	/// on direction.
	pub fn into_witness(self, key: &Scalar) -> Result<MapWitness, MapError> {
		if self.is_left.len() != self.siblings.len() {
			return Err(MapError::MalformedWitness(self.is_left.len()));
		}
		let position = key_position(key);
		for (level, is_left) in self.is_left.iter().enumerate() {
			if *is_left != ((position >> level) & 1 == 0) {
				return Err(MapError::DirectionMismatch);
			}
		}
		Ok(MapWitness::new(self.siblings))
	}
}

/// Response body of `POST /witness/{mapName}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessResponse {
	pub root: Scalar,
	pub key: Scalar,
	#[serde(rename = "oldValue")]
	pub old_value: Scalar,
	pub witness: WireWitness,
}
