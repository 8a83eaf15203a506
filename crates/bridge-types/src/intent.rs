//! Intent records and their lifecycle states.
//!
//! An intent is a one-sided commitment to trade a locked asset for a
//! cross-chain payment meeting stated conditions. Records are stored in the
//! intent map as their digest; the full record travels alongside every
//! operation and is authenticated against the committed root.

use serde::{Deserialize, Serialize};

use crate::common::{AccountId, Amount, Slot};
use crate::scalar::{domain, hash_parts, Scalar};

/// Lifecycle state of an intent.
///
/// Transitions move only forward: `PendingLock → Open → Filled` or
/// `Open → Cancelled`. `Filled` and `Cancelled` are terminal; the record
/// itself is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentState {
	/// Created without escrow; waiting for the maker to lock funds.
	PendingLock,
	/// Funds escrowed; claimable until the deadline, cancellable after it.
	Open,
	/// Claimed against a verified external payment. Terminal.
	Filled,
	/// Reclaimed by the maker after the deadline. Terminal.
	Cancelled,
}

impl IntentState {
	/// Stable tag folded into the record digest.
	fn tag(self) -> u8 {
		match self {
			IntentState::Open => 0,
			IntentState::Filled => 1,
			IntentState::Cancelled => 2,
			IntentState::PendingLock => 3,
		}
	}
}

/// A cross-chain swap intent.
///
/// `locked_amount` and `min_counter_amount` are immutable after creation;
/// only `state` changes over the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
	/// Sequential identifier assigned by the registry counter.
	pub id: u64,
	/// Account that created the intent and escrows the locked asset.
	pub maker: AccountId,
	/// Amount of the maker asset held in escrow.
	pub locked_amount: Amount,
	/// Minimum qualifying counter-asset value on the external chain.
	pub min_counter_amount: Amount,
	/// Hash binding the intended recipient on the external chain.
	pub receiver_commitment: Scalar,
	/// Slot after which the maker may cancel and before (inclusive of)
	/// which a claim must land.
	pub deadline: Slot,
	pub state: IntentState,
}

impl Intent {
	/// Digest stored as the map leaf for this record. Covers every field,
	/// so any mutation moves the intent map root.
	pub fn digest(&self) -> Scalar {
		hash_parts(
			domain::INTENT,
			&[
				&self.id.to_le_bytes(),
				&self.maker.0,
				&self.locked_amount.to_le_bytes(),
				&self.min_counter_amount.to_le_bytes(),
				&self.receiver_commitment.to_bytes(),
				&self.deadline.to_le_bytes(),
				&[self.state.tag()],
			],
		)
	}

	/// The same record in a new state. Amounts and identities carry over
	/// untouched.
	pub fn with_state(&self, state: IntentState) -> Intent {
		Intent {
			state,
			..self.clone()
		}
	}

	/// Map key under which this record lives.
	pub fn key(&self) -> Scalar {
		Scalar::from_u64(self.id)
	}
}

/// Derives the replay-prevention nullifier for an external proof consumed
/// by a specific intent.
///
/// Scoped per intent: the same external uniqueness tag yields distinct
/// nullifiers for distinct intent ids.
pub fn derive_nullifier(uniqueness_tag: &Scalar, intent_id: u64) -> Scalar {
	hash_parts(
		domain::NULLIFIER,
		&[&uniqueness_tag.to_bytes(), &intent_id.to_le_bytes()],
	)
}
