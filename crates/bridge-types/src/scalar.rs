//! Hash-domain scalars and the domain-separated hash helpers shared by
//! every component.
//!
//! All authenticated state in the bridge (map roots, intent digests,
//! commitments, nullifiers) lives in a single fixed-width hash domain.
//! Every derived value uses its own domain tag so that values from one
//! context can never be replayed as values from another.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

/// Domain tags for derived hashes. Two values computed under different tags
/// are unrelated even for identical inputs.
pub mod domain {
	/// Interior node of an authenticated map.
	pub const MAP_NODE: &[u8] = b"bridge.map.node.v1";
	/// Intent record digest stored as a map leaf.
	pub const INTENT: &[u8] = b"bridge.intent.v1";
	/// Nullifier derivation from (uniqueness tag, intent id).
	pub const NULLIFIER: &[u8] = b"bridge.nullifier.v1";
	/// External-chain note commitment opening.
	pub const NOTE_COMMITMENT: &[u8] = b"bridge.note.cm.v1";
	/// Receiver binding commitment.
	pub const RECEIVER: &[u8] = b"bridge.receiver.v1";
	/// Oracle attestation message.
	pub const ORACLE_ATTEST: &[u8] = b"bridge.oracle.attest.v1";
	/// Anchor update authorization message.
	pub const ANCHOR_UPDATE: &[u8] = b"bridge.anchor.update.v1";
}

/// Error produced when a scalar cannot be decoded from its text form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScalarParseError {
	#[error("invalid hex: {0}")]
	Hex(String),
	#[error("expected 32 bytes, got {0}")]
	Length(usize),
}

/// Fixed-width element of the hash domain.
///
/// The canonical text form is 64 lowercase hex characters (an optional `0x`
/// prefix is accepted on input). `Scalar::ZERO` is both the default value of
/// absent map keys and the bootstrap sentinel for the anchor feed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Scalar([u8; 32]);

impl Scalar {
	pub const ZERO: Scalar = Scalar([0u8; 32]);

	/// The consumed-nullifier flag value.
	pub const ONE: Scalar = {
		let mut b = [0u8; 32];
		b[0] = 1;
		Scalar(b)
	};

	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	pub fn to_bytes(self) -> [u8; 32] {
		self.0
	}

	/// Embeds a u64 into the low (leading, little-endian) bytes.
	pub fn from_u64(value: u64) -> Self {
		let mut b = [0u8; 32];
		b[..8].copy_from_slice(&value.to_le_bytes());
		Self(b)
	}

	/// Decodes the canonical 64-character hex form, `0x` prefix optional.
	pub fn from_hex(s: &str) -> Result<Self, ScalarParseError> {
		let s = s.strip_prefix("0x").unwrap_or(s);
		let raw = hex::decode(s).map_err(|e| ScalarParseError::Hex(e.to_string()))?;
		if raw.len() != 32 {
			return Err(ScalarParseError::Length(raw.len()));
		}
		let mut b = [0u8; 32];
		b.copy_from_slice(&raw);
		Ok(Self(b))
	}

	pub fn to_hex(self) -> String {
		hex::encode(self.0)
	}

	pub fn is_zero(self) -> bool {
		self == Self::ZERO
	}

	/// The low 32 bits of the scalar, little-endian. Authenticated maps use
	/// this as the leaf position of the key.
	pub fn low_u32(self) -> u32 {
		u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
	}
}

impl fmt::Debug for Scalar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Scalar({})", self.to_hex())
	}
}

impl fmt::Display for Scalar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl Serialize for Scalar {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Scalar {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Scalar::from_hex(&s).map_err(de::Error::custom)
	}
}

/// Domain-separated hash of an ordered list of byte strings.
pub fn hash_parts(domain: &[u8], parts: &[&[u8]]) -> Scalar {
	let mut hasher = Keccak256::new();
	hasher.update(domain);
	for part in parts {
		hasher.update(part);
	}
	Scalar(hasher.finalize().into())
}

/// Two-input interior node hash used by every authenticated map fold.
pub fn node_hash(left: &Scalar, right: &Scalar) -> Scalar {
	hash_parts(domain::MAP_NODE, &[&left.0, &right.0])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_round_trip() {
		let s = hash_parts(domain::MAP_NODE, &[b"abc"]);
		let parsed = Scalar::from_hex(&s.to_hex()).unwrap();
		assert_eq!(s, parsed);

		let prefixed = Scalar::from_hex(&format!("0x{}", s.to_hex())).unwrap();
		assert_eq!(s, prefixed);
	}

	#[test]
	fn rejects_wrong_length() {
		assert_eq!(Scalar::from_hex("abcd"), Err(ScalarParseError::Length(2)));
		assert!(matches!(
			Scalar::from_hex("zz"),
			Err(ScalarParseError::Hex(_))
		));
	}

	#[test]
	fn domains_separate() {
		let a = hash_parts(domain::INTENT, &[b"x"]);
		let b = hash_parts(domain::NULLIFIER, &[b"x"]);
		assert_ne!(a, b);
	}

	#[test]
	fn low_bits_of_counter_keys() {
		assert_eq!(Scalar::from_u64(0).low_u32(), 0);
		assert_eq!(Scalar::from_u64(7).low_u32(), 7);
		assert_eq!(Scalar::from_u64(u32::MAX as u64 + 5).low_u32(), 4);
	}

	#[test]
	fn one_is_from_u64_one() {
		assert_eq!(Scalar::ONE, Scalar::from_u64(1));
	}
}
