//! Anchor feed: the trusted external-chain reference value.
//!
//! A single scalar represents the external chain's commitment-tree root at
//! a confirmed height. Only the registered authority may move it, and every
//! update must chain from the previously stored value (the zero sentinel
//! bootstraps the chain). The inclusion-proof claim strategy reads the
//! current value through [`AnchorFeed::current`].

use arc_swap::ArcSwap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use bridge_types::{domain, Scalar};

pub mod poller;

pub use poller::{AnchorPoller, AnchorSource, HttpAnchorSource, PollerConfig};

#[derive(Debug, Error)]
pub enum AnchorError {
	#[error("invalid authority signature on anchor update")]
	InvalidSignature,

	#[error("malformed signature bytes: {0}")]
	MalformedSignature(String),

	#[error("continuity violation: stored value is {stored}, update chains from {presented}")]
	Continuity { stored: Scalar, presented: Scalar },

	/// Transient source-chain failure; the poller skips the cycle and
	/// retries on the next tick.
	#[error("anchor source error: {0}")]
	Source(String),
}

/// Signed anchor update submitted by the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorUpdate {
	pub new_value: Scalar,
	/// Value the submitter observed as current; enforces append-only
	/// chaining.
	pub prev_value: Scalar,
	#[serde(with = "hex_bytes")]
	pub signature: Vec<u8>,
}

impl AnchorUpdate {
	/// The exact message the authority signs.
	pub fn message(new_value: &Scalar, prev_value: &Scalar) -> Vec<u8> {
		let mut msg = Vec::with_capacity(domain::ANCHOR_UPDATE.len() + 64);
		msg.extend_from_slice(domain::ANCHOR_UPDATE);
		msg.extend_from_slice(&new_value.to_bytes());
		msg.extend_from_slice(&prev_value.to_bytes());
		msg
	}

	/// Builds and signs an update chaining from `prev_value`.
	pub fn signed(signer: &SigningKey, new_value: Scalar, prev_value: Scalar) -> Self {
		let signature = signer.sign(&Self::message(&new_value, &prev_value));
		Self {
			new_value,
			prev_value,
			signature: signature.to_bytes().to_vec(),
		}
	}
}

/// Outcome of a successfully authenticated update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
	Updated,
	/// The submitted value already matches the stored one.
	Unchanged,
}

/// The trusted anchor value with authorized, continuity-checked updates.
pub struct AnchorFeed {
	value: ArcSwap<Scalar>,
	authority: VerifyingKey,
}

impl AnchorFeed {
	/// A feed at the bootstrap sentinel.
	pub fn new(authority: VerifyingKey) -> Self {
		Self::with_current(authority, Scalar::ZERO)
	}

	/// A feed restored to a known value (state reload).
	pub fn with_current(authority: VerifyingKey, value: Scalar) -> Self {
		Self {
			value: ArcSwap::from_pointee(value),
			authority,
		}
	}

	pub fn current(&self) -> Scalar {
		**self.value.load()
	}

	pub fn is_bootstrapped(&self) -> bool {
		!self.current().is_zero()
	}

	/// Authenticates and applies an update. The signature check runs before
	/// the continuity check.
	pub fn apply_update(&self, update: &AnchorUpdate) -> Result<UpdateOutcome, AnchorError> {
		let signature = Signature::try_from(update.signature.as_slice())
			.map_err(|e| AnchorError::MalformedSignature(e.to_string()))?;
		let message = AnchorUpdate::message(&update.new_value, &update.prev_value);
		self.authority
			.verify(&message, &signature)
			.map_err(|_| AnchorError::InvalidSignature)?;

		let stored = self.current();
		if stored != Scalar::ZERO && update.prev_value != stored {
			return Err(AnchorError::Continuity {
				stored,
				presented: update.prev_value,
			});
		}
		if update.new_value == stored {
			return Ok(UpdateOutcome::Unchanged);
		}

		self.value.store(Arc::new(update.new_value));
		Ok(UpdateOutcome::Updated)
	}
}

mod hex_bytes {
	use serde::{de, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&hex::encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::OsRng;

	fn keypair() -> SigningKey {
		SigningKey::generate(&mut OsRng)
	}

	#[test]
	fn bootstrap_then_chain() {
		let signer = keypair();
		let feed = AnchorFeed::new(signer.verifying_key());
		assert!(!feed.is_bootstrapped());

		let a = Scalar::from_u64(100);
		let update = AnchorUpdate::signed(&signer, a, Scalar::ZERO);
		assert_eq!(feed.apply_update(&update).unwrap(), UpdateOutcome::Updated);
		assert_eq!(feed.current(), a);

		// chaining from the stored value succeeds
		let b = Scalar::from_u64(200);
		let update = AnchorUpdate::signed(&signer, b, a);
		assert_eq!(feed.apply_update(&update).unwrap(), UpdateOutcome::Updated);

		// chaining from a superseded value is a continuity violation
		let c = Scalar::from_u64(300);
		let stale = AnchorUpdate::signed(&signer, c, a);
		assert!(matches!(
			feed.apply_update(&stale),
			Err(AnchorError::Continuity { .. })
		));
		assert_eq!(feed.current(), b);
	}

	#[test]
	fn bootstrap_accepts_any_prev() {
		let signer = keypair();
		let feed = AnchorFeed::new(signer.verifying_key());
		// at the zero sentinel, continuity is not enforced
		let update = AnchorUpdate::signed(&signer, Scalar::from_u64(5), Scalar::from_u64(999));
		assert_eq!(feed.apply_update(&update).unwrap(), UpdateOutcome::Updated);
	}

	#[test]
	fn rejects_foreign_signer() {
		let signer = keypair();
		let feed = AnchorFeed::new(signer.verifying_key());
		let intruder = keypair();
		let update = AnchorUpdate::signed(&intruder, Scalar::from_u64(5), Scalar::ZERO);
		assert!(matches!(
			feed.apply_update(&update),
			Err(AnchorError::InvalidSignature)
		));
		assert_eq!(feed.current(), Scalar::ZERO);
	}

	#[test]
	fn resubmission_is_idempotent() {
		let signer = keypair();
		let feed = AnchorFeed::new(signer.verifying_key());
		let a = Scalar::from_u64(7);
		feed.apply_update(&AnchorUpdate::signed(&signer, a, Scalar::ZERO))
			.unwrap();

		let again = AnchorUpdate::signed(&signer, a, a);
		assert_eq!(
			feed.apply_update(&again).unwrap(),
			UpdateOutcome::Unchanged
		);
	}
}
