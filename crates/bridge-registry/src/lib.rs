//! Intent registry: the authoritative state machine of the bridge.
//!
//! The registry holds only what the hosting ledger would hold: the two
//! committed map roots, the intent counter, and the escrow ledger. Every
//! transition authenticates the caller-supplied record and witness against
//! the currently committed root, applies all checks, and then mutates
//! roots and funds together, or not at all. A mismatched witness is an
//! ordinary race (`StaleWitness`), resolved by refetching and retrying.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use bridge_map::{empty_root, MapError, MapWitness};
use bridge_types::{
	derive_nullifier, AccountId, Amount, ClaimAttributes, Intent, IntentState, MapName, Scalar,
	Slot,
};

pub mod ledger;

pub use ledger::Ledger;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
	/// The supplied record does not carry the id the operation names.
	#[error("record id {record} does not match operation id {requested}")]
	RecordMismatch { requested: u64, record: u64 },

	#[error("caller is not the intent maker")]
	WrongCaller,

	#[error("intent is {actual:?}, operation requires {required:?}")]
	WrongState {
		required: IntentState,
		actual: IntentState,
	},

	#[error("cancellation opens after slot {deadline}, current slot is {now}")]
	DeadlineNotReached { deadline: Slot, now: Slot },

	#[error("claims close at slot {deadline}, current slot is {now}")]
	DeadlinePassed { deadline: Slot, now: Slot },

	#[error("claimed amount {claimed} is below the required minimum {minimum}")]
	AmountBelowMinimum { claimed: Amount, minimum: Amount },

	#[error("receiver commitment does not match the intent")]
	ReceiverMismatch,

	/// The external proof was already consumed for this intent.
	#[error("nullifier already consumed")]
	NullifierReused,

	#[error("insufficient balance: need {needed}, have {available}")]
	InsufficientBalance { needed: Amount, available: Amount },

	#[error("escrow accounting underflow")]
	EscrowUnderflow,

	#[error(transparent)]
	Map(#[from] MapError),
}

impl RegistryError {
	/// Stale witnesses are races, not protocol violations; callers refetch
	/// and retry.
	pub fn is_retryable(&self) -> bool {
		matches!(self, RegistryError::Map(MapError::StaleWitness))
	}
}

/// Escrow behavior of `create_intent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
	/// Escrow the locked amount in the creation step; intent opens
	/// immediately.
	AtomicLock,
	/// Create as `PendingLock`; the maker escrows later via `lock_funds`.
	TwoPhase,
}

/// Creation parameters; the id is assigned by the registry counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentParams {
	pub maker: AccountId,
	pub locked_amount: Amount,
	pub min_counter_amount: Amount,
	pub receiver_commitment: Scalar,
	pub deadline: Slot,
}

/// One accepted map write, in commit order. Replicas replay these to stay
/// order-consistent with the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedTransition {
	pub map: MapName,
	pub key: Scalar,
	pub value: Scalar,
}

/// Outcome of a successful transition.
#[derive(Debug, Clone)]
pub struct Receipt {
	/// The intent record as now committed.
	pub intent: Intent,
	/// Map writes to replay into replicas, in order.
	pub transitions: Vec<AcceptedTransition>,
}

/// Authoritative bridge state.
#[derive(Debug, Clone)]
pub struct Registry {
	intents_root: Scalar,
	nullifiers_root: Scalar,
	next_intent_id: u64,
	ledger: Ledger,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new(Ledger::new())
	}
}

impl Registry {
	pub fn new(ledger: Ledger) -> Self {
		Self {
			intents_root: empty_root(),
			nullifiers_root: empty_root(),
			next_intent_id: 0,
			ledger,
		}
	}

	pub fn intents_root(&self) -> Scalar {
		self.intents_root
	}

	pub fn nullifiers_root(&self) -> Scalar {
		self.nullifiers_root
	}

	pub fn next_intent_id(&self) -> u64 {
		self.next_intent_id
	}

	pub fn root_of(&self, map: MapName) -> Scalar {
		match map {
			MapName::Intents => self.intents_root,
			MapName::Nullifiers => self.nullifiers_root,
		}
	}

	pub fn ledger(&self) -> &Ledger {
		&self.ledger
	}

	pub fn ledger_mut(&mut self) -> &mut Ledger {
		&mut self.ledger
	}

	/// Creates the next intent. The witness must prove that the counter's
	/// key is still absent under the committed intents root.
	pub fn create_intent(
		&mut self,
		params: CreateIntentParams,
		witness: &MapWitness,
		mode: CreateMode,
	) -> Result<Receipt, RegistryError> {
		let id = self.next_intent_id;
		let key = Scalar::from_u64(id);

		let state = match mode {
			CreateMode::AtomicLock => IntentState::Open,
			CreateMode::TwoPhase => IntentState::PendingLock,
		};
		let intent = Intent {
			id,
			maker: params.maker,
			locked_amount: params.locked_amount,
			min_counter_amount: params.min_counter_amount,
			receiver_commitment: params.receiver_commitment,
			deadline: params.deadline,
			state,
		};
		let digest = intent.digest();

		// Everything fallible happens before any field is written.
		let new_root = witness.commit(&self.intents_root, &key, &Scalar::ZERO, &digest)?;
		if mode == CreateMode::AtomicLock {
			self.ledger.lock(&params.maker, params.locked_amount)?;
		}

		self.intents_root = new_root;
		self.next_intent_id = id + 1;
		info!(intent = id, root = %new_root, "intent created");

		Ok(Receipt {
			intent,
			transitions: vec![AcceptedTransition {
				map: MapName::Intents,
				key,
				value: digest,
			}],
		})
	}

	/// Two-phase completion: escrows the locked amount and opens the
	/// intent.
	pub fn lock_funds(
		&mut self,
		id: u64,
		intent: &Intent,
		witness: &MapWitness,
		caller: &AccountId,
	) -> Result<Receipt, RegistryError> {
		check_record(id, intent)?;
		if *caller != intent.maker {
			return Err(RegistryError::WrongCaller);
		}
		check_state(intent, IntentState::PendingLock)?;

		let updated = intent.with_state(IntentState::Open);
		let new_root = witness.commit(
			&self.intents_root,
			&intent.key(),
			&intent.digest(),
			&updated.digest(),
		)?;
		self.ledger.lock(caller, intent.locked_amount)?;

		self.intents_root = new_root;
		info!(intent = id, "funds locked, intent open");

		Ok(Receipt {
			transitions: vec![AcceptedTransition {
				map: MapName::Intents,
				key: updated.key(),
				value: updated.digest(),
			}],
			intent: updated,
		})
	}

	/// Maker reclaims escrow after the deadline.
	pub fn cancel(
		&mut self,
		id: u64,
		intent: &Intent,
		witness: &MapWitness,
		caller: &AccountId,
		now: Slot,
	) -> Result<Receipt, RegistryError> {
		check_record(id, intent)?;
		if *caller != intent.maker {
			return Err(RegistryError::WrongCaller);
		}
		check_state(intent, IntentState::Open)?;
		if now <= intent.deadline {
			return Err(RegistryError::DeadlineNotReached {
				deadline: intent.deadline,
				now,
			});
		}

		let updated = intent.with_state(IntentState::Cancelled);
		let new_root = witness.commit(
			&self.intents_root,
			&intent.key(),
			&intent.digest(),
			&updated.digest(),
		)?;
		self.ledger.release(caller, intent.locked_amount)?;

		self.intents_root = new_root;
		info!(intent = id, "intent cancelled, escrow refunded");

		Ok(Receipt {
			transitions: vec![AcceptedTransition {
				map: MapName::Intents,
				key: updated.key(),
				value: updated.digest(),
			}],
			intent: updated,
		})
	}

	/// Fills an intent against verified claim attributes.
	///
	/// The caller has already run the external proof through a strategy;
	/// this applies the mandatory post-strategy checks and commits the
	/// `Filled` record and the consumed nullifier in one atomic step.
	#[allow(clippy::too_many_arguments)]
	pub fn claim(
		&mut self,
		id: u64,
		intent: &Intent,
		intent_witness: &MapWitness,
		nullifier_witness: &MapWitness,
		attrs: &ClaimAttributes,
		claimant: &AccountId,
		now: Slot,
	) -> Result<Receipt, RegistryError> {
		check_record(id, intent)?;
		check_state(intent, IntentState::Open)?;
		if now > intent.deadline {
			return Err(RegistryError::DeadlinePassed {
				deadline: intent.deadline,
				now,
			});
		}

		// Replay prevention: the nullifier key must still be provably
		// unset. A witness that authenticates the consumed flag instead
		// is a replay, not a race.
		let nullifier = derive_nullifier(&attrs.uniqueness_tag, id);
		let new_nullifiers_root = match nullifier_witness.commit(
			&self.nullifiers_root,
			&nullifier,
			&Scalar::ZERO,
			&Scalar::ONE,
		) {
			Ok(root) => root,
			Err(MapError::StaleWitness)
				if nullifier_witness.verify(&self.nullifiers_root, &nullifier, &Scalar::ONE) =>
			{
				return Err(RegistryError::NullifierReused)
			}
			Err(e) => return Err(e.into()),
		};

		if attrs.claimed_amount < intent.min_counter_amount {
			return Err(RegistryError::AmountBelowMinimum {
				claimed: attrs.claimed_amount,
				minimum: intent.min_counter_amount,
			});
		}
		if attrs.receiver_commitment != intent.receiver_commitment {
			return Err(RegistryError::ReceiverMismatch);
		}

		let updated = intent.with_state(IntentState::Filled);
		let new_intents_root = intent_witness.commit(
			&self.intents_root,
			&intent.key(),
			&intent.digest(),
			&updated.digest(),
		)?;
		self.ledger.release(claimant, intent.locked_amount)?;

		// Both roots move together; a claim never lands half-committed.
		self.intents_root = new_intents_root;
		self.nullifiers_root = new_nullifiers_root;
		info!(intent = id, nullifier = %nullifier, "intent filled");

		Ok(Receipt {
			transitions: vec![
				AcceptedTransition {
					map: MapName::Intents,
					key: updated.key(),
					value: updated.digest(),
				},
				AcceptedTransition {
					map: MapName::Nullifiers,
					key: nullifier,
					value: Scalar::ONE,
				},
			],
			intent: updated,
		})
	}
}

fn check_record(id: u64, intent: &Intent) -> Result<(), RegistryError> {
	if intent.id != id {
		return Err(RegistryError::RecordMismatch {
			requested: id,
			record: intent.id,
		});
	}
	Ok(())
}

fn check_state(intent: &Intent, required: IntentState) -> Result<(), RegistryError> {
	if intent.state != required {
		return Err(RegistryError::WrongState {
			required,
			actual: intent.state,
		});
	}
	Ok(())
}
