//! Fixed-depth sparse authenticated key-value map.
//!
//! Every key owns a fixed leaf position (the low bits of the key scalar);
//! absent keys hold the zero element. The root is a pure function of the
//! full key→value assignment, so any `(root, key, value)` triple is either
//! provable with a depth-[`MAP_DEPTH`] sibling path or the key is absent
//! under that root.
//!
//! [`MapWitness`] carries the pure fold used by verifiers that hold only a
//! root; [`SparseMap`] is the materialized tree the indexer replicates.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use thiserror::Error;

use bridge_types::{node_hash, Scalar};

mod witness;

pub use witness::{MapWitness, WireWitness, WitnessResponse};

/// Tree depth, fixed regardless of occupancy.
pub const MAP_DEPTH: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
	/// The presented witness does not authenticate against the currently
	/// committed root. Retryable: refetch a fresh witness.
	#[error("stale witness: presented proof does not match the current root")]
	StaleWitness,
	/// A witness with the wrong number of siblings.
	#[error("malformed witness: expected {MAP_DEPTH} siblings, got {0}")]
	MalformedWitness(usize),
	/// The advertised fold directions disagree with the key's position.
	#[error("malformed witness: direction flags do not match the key position")]
	DirectionMismatch,
	/// A different key already occupies this key's leaf position.
	#[error("key position collision at index {0}")]
	PositionOccupied(u32),
	/// A snapshot entry that cannot be decoded.
	#[error("invalid snapshot entry for key {key}: {reason}")]
	Snapshot { key: String, reason: String },
}

/// Empty-subtree hashes, level 0 (zero leaf) up to the empty root.
fn empty_hashes() -> &'static [Scalar; MAP_DEPTH + 1] {
	static EMPTY: OnceLock<[Scalar; MAP_DEPTH + 1]> = OnceLock::new();
	EMPTY.get_or_init(|| {
		let mut levels = [Scalar::ZERO; MAP_DEPTH + 1];
		for i in 0..MAP_DEPTH {
			levels[i + 1] = node_hash(&levels[i], &levels[i]);
		}
		levels
	})
}

/// Root of a map with no entries.
pub fn empty_root() -> Scalar {
	empty_hashes()[MAP_DEPTH]
}

/// Leaf position of a key: its low [`MAP_DEPTH`] bits.
pub fn key_position(key: &Scalar) -> u32 {
	key.low_u32()
}

/// Materialized sparse map with cached interior nodes.
///
/// Insert-only at its call sites: the registry only ever writes fresh intent
/// digests, forward state transitions, and consumed-nullifier flags.
#[derive(Debug, Clone, Default)]
pub struct SparseMap {
	/// Full key→value assignment, used for lookups and snapshots.
	entries: BTreeMap<Scalar, Scalar>,
	/// Owner key of each occupied leaf position.
	positions: HashMap<u32, Scalar>,
	/// Cached non-empty interior nodes by (level, index).
	nodes: HashMap<(u8, u32), Scalar>,
}

impl SparseMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn root(&self) -> Scalar {
		self.node(MAP_DEPTH as u8, 0)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Current value of a key; the zero element when absent.
	pub fn get(&self, key: &Scalar) -> Scalar {
		self.entries.get(key).copied().unwrap_or(Scalar::ZERO)
	}

	fn node(&self, level: u8, index: u32) -> Scalar {
		self.nodes
			.get(&(level, index))
			.copied()
			.unwrap_or(empty_hashes()[level as usize])
	}

	/// Witness for a key under the current root. Total: absent keys return
	/// the zero value with a valid exclusion-shaped proof.
	pub fn get_witness(&self, key: &Scalar) -> (Scalar, MapWitness, Scalar) {
		let position = key_position(key);
		let mut siblings = Vec::with_capacity(MAP_DEPTH);
		for level in 0..MAP_DEPTH {
			let sibling_index = (position >> level) ^ 1;
			siblings.push(self.node(level as u8, sibling_index));
		}
		(self.root(), MapWitness::new(siblings), self.get(key))
	}

	/// Sets `key` to `value`, recomputing the path to the root.
	///
	/// Fails only if a *different* key already owns this position; the map
	/// cannot represent two keys per leaf.
	pub fn insert(&mut self, key: Scalar, value: Scalar) -> Result<Scalar, MapError> {
		let position = key_position(&key);
		match self.positions.get(&position) {
			Some(owner) if *owner != key => return Err(MapError::PositionOccupied(position)),
			_ => {}
		}

		self.positions.insert(position, key);
		self.entries.insert(key, value);
		self.nodes.insert((0, position), value);

		let mut acc = value;
		for level in 0..MAP_DEPTH {
			let index = position >> level;
			let sibling = self.node(level as u8, index ^ 1);
			acc = if index & 1 == 0 {
				node_hash(&acc, &sibling)
			} else {
				node_hash(&sibling, &acc)
			};
			self.nodes.insert((level as u8 + 1, index >> 1), acc);
		}
		Ok(acc)
	}

	/// Flat persisted form: hex key → hex value, full assignment.
	pub fn to_snapshot(&self) -> BTreeMap<String, String> {
		self.entries
			.iter()
			.map(|(k, v)| (k.to_hex(), v.to_hex()))
			.collect()
	}

	/// Rebuilds a map by re-inserting every snapshot entry. The root only
	/// depends on the final assignment, not the re-insertion order; see the
	/// replay tests.
	pub fn from_snapshot<'a, I>(entries: I) -> Result<Self, MapError>
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let mut map = SparseMap::new();
		for (key_hex, value_hex) in entries {
			let key = Scalar::from_hex(key_hex).map_err(|e| MapError::Snapshot {
				key: key_hex.to_string(),
				reason: e.to_string(),
			})?;
			let value = Scalar::from_hex(value_hex).map_err(|e| MapError::Snapshot {
				key: key_hex.to_string(),
				reason: e.to_string(),
			})?;
			map.insert(key, value)?;
		}
		Ok(map)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn absent_key_has_exclusion_proof() {
		let map = SparseMap::new();
		let key = Scalar::from_u64(42);
		let (root, witness, value) = map.get_witness(&key);
		assert_eq!(root, empty_root());
		assert!(value.is_zero());
		assert!(witness.verify(&root, &key, &Scalar::ZERO));
		assert!(!witness.verify(&root, &key, &Scalar::ONE));
	}

	#[test]
	fn insert_then_prove() {
		let mut map = SparseMap::new();
		let key = Scalar::from_u64(5);
		let value = Scalar::from_u64(77);
		map.insert(key, value).unwrap();

		let (root, witness, got) = map.get_witness(&key);
		assert_eq!(got, value);
		assert!(witness.verify(&root, &key, &value));

		// other keys remain provably absent under the new root
		let other = Scalar::from_u64(6);
		let (root2, w2, v2) = map.get_witness(&other);
		assert_eq!(root2, root);
		assert!(v2.is_zero());
		assert!(w2.verify(&root, &other, &Scalar::ZERO));
	}

	#[test]
	fn commit_matches_insert() {
		let mut map = SparseMap::new();
		map.insert(Scalar::from_u64(1), Scalar::from_u64(10)).unwrap();

		let key = Scalar::from_u64(2);
		let (root, witness, old) = map.get_witness(&key);
		let new_value = Scalar::from_u64(20);
		let predicted = witness.commit(&root, &key, &old, &new_value).unwrap();

		let actual = map.insert(key, new_value).unwrap();
		assert_eq!(predicted, actual);
		assert_eq!(map.root(), predicted);
	}

	#[test]
	fn stale_witness_rejected() {
		let mut map = SparseMap::new();
		let key = Scalar::from_u64(9);
		let (root, witness, old) = map.get_witness(&key);

		// a concurrent writer moves the root
		map.insert(Scalar::from_u64(8), Scalar::from_u64(1)).unwrap();

		let err = witness
			.commit(&map.root(), &key, &old, &Scalar::ONE)
			.unwrap_err();
		assert_eq!(err, MapError::StaleWitness);

		// the witness is still good against the root it was issued for
		assert!(witness.commit(&root, &key, &old, &Scalar::ONE).is_ok());
	}

	#[test]
	fn position_collisions_are_detected() {
		let mut map = SparseMap::new();
		let key_a = Scalar::from_u64(3);
		// distinct key, same low 32 bits
		let key_b = Scalar::from_u64(3 + (1 << 32));
		map.insert(key_a, Scalar::ONE).unwrap();
		assert_eq!(
			map.insert(key_b, Scalar::ONE).unwrap_err(),
			MapError::PositionOccupied(3)
		);
	}

	#[test]
	fn snapshot_round_trip_reproduces_root() {
		let mut map = SparseMap::new();
		for i in 0..20u64 {
			map.insert(Scalar::from_u64(i), Scalar::from_u64(i * i + 1))
				.unwrap();
		}
		let snapshot = map.to_snapshot();
		let reloaded = SparseMap::from_snapshot(
			snapshot.iter().map(|(k, v)| (k.as_str(), v.as_str())),
		)
		.unwrap();
		assert_eq!(reloaded.root(), map.root());
	}

	#[test]
	fn replay_order_does_not_matter() {
		let entries: Vec<(Scalar, Scalar)> = (0..16u64)
			.map(|i| (Scalar::from_u64(i * 3), Scalar::from_u64(i + 1)))
			.collect();

		let mut forward = SparseMap::new();
		for (k, v) in &entries {
			forward.insert(*k, *v).unwrap();
		}
		let mut backward = SparseMap::new();
		for (k, v) in entries.iter().rev() {
			backward.insert(*k, *v).unwrap();
		}
		assert_eq!(forward.root(), backward.root());
	}
}
