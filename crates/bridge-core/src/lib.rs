//! The bridge engine.
//!
//! Wires the registry (authoritative roots + escrow), the claim service and
//! a witness provider into the four driver operations. Each operation reads
//! the committed roots, fetches fresh witnesses, re-verifies them against
//! the roots it read, and invokes the registry; a stale witness is retried
//! with a refetch up to a bounded number of attempts. Accepted transitions
//! are replayed into the replica after the commit.

use arc_swap::ArcSwap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use bridge_claim::{ClaimError, ClaimService};
use bridge_indexer::RootView;
use bridge_map::{MapError, MapWitness, WitnessResponse};
use bridge_registry::{CreateIntentParams, CreateMode, Receipt, Registry, RegistryError};
use bridge_types::{derive_nullifier, AccountId, ExternalProof, Intent, MapName, Scalar, Slot};

pub mod witness;


pub use witness::{HttpWitnessProvider, LocalWitnessProvider, ProviderError, WitnessProvider};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Claim(#[from] ClaimError),

	#[error(transparent)]
	Provider(#[from] ProviderError),

	#[error("operation still stale after {0} attempts")]
	RetriesExhausted(u32),
}

impl EngineError {
	fn is_stale(&self) -> bool {
		matches!(
			self,
			EngineError::Registry(RegistryError::Map(MapError::StaleWitness))
		)
	}
}

/// Committed roots as last published by the engine; lock-free for health
/// reporting.
pub struct RootsHandle {
	inner: ArcSwap<(Scalar, Scalar)>,
}

impl RootsHandle {
	fn new(intents: Scalar, nullifiers: Scalar) -> Self {
		Self {
			inner: ArcSwap::from_pointee((intents, nullifiers)),
		}
	}

	fn publish(&self, intents: Scalar, nullifiers: Scalar) {
		self.inner.store(Arc::new((intents, nullifiers)));
	}
}

impl RootView for RootsHandle {
	fn root_of(&self, map: MapName) -> Scalar {
		let roots = self.inner.load();
		match map {
			MapName::Intents => roots.0,
			MapName::Nullifiers => roots.1,
		}
	}
}

pub struct Engine {
	registry: RwLock<Registry>,
	claims: ClaimService,
	provider: Arc<dyn WitnessProvider>,
	published: Arc<RootsHandle>,
	max_attempts: u32,
}

impl Engine {
	pub fn new(registry: Registry, claims: ClaimService, provider: Arc<dyn WitnessProvider>) -> Self {
		let published = Arc::new(RootsHandle::new(
			registry.intents_root(),
			registry.nullifiers_root(),
		));
		Self {
			registry: RwLock::new(registry),
			claims,
			provider,
			published,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
		}
	}

	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;
		self
	}

	/// Handle the indexer's health endpoint reads committed roots through.
	pub fn roots_handle(&self) -> Arc<RootsHandle> {
		self.published.clone()
	}

	pub async fn intents_root(&self) -> Scalar {
		self.registry.read().await.intents_root()
	}

	pub async fn nullifiers_root(&self) -> Scalar {
		self.registry.read().await.nullifiers_root()
	}

	pub async fn next_intent_id(&self) -> u64 {
		self.registry.read().await.next_intent_id()
	}

	pub async fn balance(&self, account: &AccountId) -> u64 {
		self.registry.read().await.ledger().balance(account)
	}

	pub async fn escrowed(&self) -> u64 {
		self.registry.read().await.ledger().escrowed()
	}

	/// Funds an account on the hosting ledger.
	pub async fn credit(&self, account: AccountId, amount: u64) {
		self.registry.write().await.ledger_mut().credit(account, amount);
	}

	/// Checks a provider response against the root the engine just read.
	/// The provider is untrusted: root and fold are both re-verified.
	fn check_witness(
		response: WitnessResponse,
		expected_root: Scalar,
		key: &Scalar,
	) -> Result<(MapWitness, Scalar), EngineError> {
		if response.root != expected_root {
			return Err(RegistryError::Map(MapError::StaleWitness).into());
		}
		let old_value = response.old_value;
		let witness = response
			.witness
			.into_witness(key)
			.map_err(RegistryError::from)?;
		if !witness.verify(&expected_root, key, &old_value) {
			return Err(RegistryError::Map(MapError::StaleWitness).into());
		}
		Ok((witness, old_value))
	}

	/// Publishes new roots and pushes accepted transitions to the replica.
	/// A replica that misses the push only serves stale witnesses until its
	/// own replay catches up; the commit stands either way.
	async fn finish(&self, receipt: &Receipt, roots: (Scalar, Scalar)) {
		self.published.publish(roots.0, roots.1);
		if let Err(e) = self.provider.sync(&receipt.transitions).await {
			warn!(error = %e, "replica sync failed; indexer will catch up by replay");
		}
	}

	/// Creates the next intent, retrying on stale witnesses.
	pub async fn create_intent(
		&self,
		params: CreateIntentParams,
		mode: CreateMode,
	) -> Result<Intent, EngineError> {
		for attempt in 0..self.max_attempts {
			let (root, id) = {
				let registry = self.registry.read().await;
				(registry.intents_root(), registry.next_intent_id())
			};
			let key = Scalar::from_u64(id);
			let response = self.provider.witness(MapName::Intents, key).await?;

			let outcome = match Self::check_witness(response, root, &key) {
				Ok((witness, _)) => {
					let mut registry = self.registry.write().await;
					registry
						.create_intent(params.clone(), &witness, mode)
						.map(|receipt| {
							let roots = (registry.intents_root(), registry.nullifiers_root());
							(receipt, roots)
						})
						.map_err(EngineError::from)
				}
				Err(e) => Err(e),
			};

			match outcome {
				Ok((receipt, roots)) => {
					self.finish(&receipt, roots).await;
					return Ok(receipt.intent);
				}
				Err(e) if e.is_stale() => {
					debug!(attempt, "stale witness during create, refetching");
					continue;
				}
				Err(e) => return Err(e),
			}
		}
		Err(EngineError::RetriesExhausted(self.max_attempts))
	}

	/// Completes a two-phase creation by escrowing the maker's funds.
	pub async fn lock_funds(
		&self,
		id: u64,
		intent: &Intent,
		caller: &AccountId,
	) -> Result<Intent, EngineError> {
		for attempt in 0..self.max_attempts {
			let root = self.registry.read().await.intents_root();
			let key = intent.key();
			let response = self.provider.witness(MapName::Intents, key).await?;

			let outcome = match Self::check_witness(response, root, &key) {
				Ok((witness, _)) => {
					let mut registry = self.registry.write().await;
					registry
						.lock_funds(id, intent, &witness, caller)
						.map(|receipt| {
							let roots = (registry.intents_root(), registry.nullifiers_root());
							(receipt, roots)
						})
						.map_err(EngineError::from)
				}
				Err(e) => Err(e),
			};

			match outcome {
				Ok((receipt, roots)) => {
					self.finish(&receipt, roots).await;
					return Ok(receipt.intent);
				}
				Err(e) if e.is_stale() => {
					debug!(attempt, "stale witness during lock, refetching");
					continue;
				}
				Err(e) => return Err(e),
			}
		}
		Err(EngineError::RetriesExhausted(self.max_attempts))
	}

	/// Maker reclaims escrow after the deadline.
	pub async fn cancel(
		&self,
		id: u64,
		intent: &Intent,
		caller: &AccountId,
		now: Slot,
	) -> Result<Intent, EngineError> {
		for attempt in 0..self.max_attempts {
			let root = self.registry.read().await.intents_root();
			let key = intent.key();
			let response = self.provider.witness(MapName::Intents, key).await?;

			let outcome = match Self::check_witness(response, root, &key) {
				Ok((witness, _)) => {
					let mut registry = self.registry.write().await;
					registry
						.cancel(id, intent, &witness, caller, now)
						.map(|receipt| {
							let roots = (registry.intents_root(), registry.nullifiers_root());
							(receipt, roots)
						})
						.map_err(EngineError::from)
				}
				Err(e) => Err(e),
			};

			match outcome {
				Ok((receipt, roots)) => {
					self.finish(&receipt, roots).await;
					return Ok(receipt.intent);
				}
				Err(e) if e.is_stale() => {
					debug!(attempt, "stale witness during cancel, refetching");
					continue;
				}
				Err(e) => return Err(e),
			}
		}
		Err(EngineError::RetriesExhausted(self.max_attempts))
	}

	/// Fills an intent against an external proof.
	///
	/// Strategy verification runs first (it is pure); the registry then
	/// applies the mandatory nullifier/amount/receiver checks and commits
	/// the `Filled` record together with the consumed nullifier.
	pub async fn claim(
		&self,
		id: u64,
		intent: &Intent,
		proof: &ExternalProof,
		claimant: &AccountId,
		now: Slot,
	) -> Result<Intent, EngineError> {
		let attrs = self.claims.verify(intent, proof)?;
		let nullifier = derive_nullifier(&attrs.uniqueness_tag, id);

		for attempt in 0..self.max_attempts {
			let (intents_root, nullifiers_root) = {
				let registry = self.registry.read().await;
				(registry.intents_root(), registry.nullifiers_root())
			};
			let key = intent.key();
			let intent_response = self.provider.witness(MapName::Intents, key).await?;
			let nullifier_response = self.provider.witness(MapName::Nullifiers, nullifier).await?;

			let outcome = match Self::check_witness(intent_response, intents_root, &key).and_then(
				|(intent_witness, _)| {
					Self::check_witness(nullifier_response, nullifiers_root, &nullifier)
						.map(|(nullifier_witness, _)| (intent_witness, nullifier_witness))
				},
			) {
				Ok((intent_witness, nullifier_witness)) => {
					let mut registry = self.registry.write().await;
					registry
						.claim(
							id,
							intent,
							&intent_witness,
							&nullifier_witness,
							&attrs,
							claimant,
							now,
						)
						.map(|receipt| {
							let roots = (registry.intents_root(), registry.nullifiers_root());
							(receipt, roots)
						})
						.map_err(EngineError::from)
				}
				Err(e) => Err(e),
			};

			match outcome {
				Ok((receipt, roots)) => {
					self.finish(&receipt, roots).await;
					return Ok(receipt.intent);
				}
				Err(e) if e.is_stale() => {
					debug!(attempt, "stale witness during claim, refetching");
					continue;
				}
				Err(e) => return Err(e),
			}
		}
		Err(EngineError::RetriesExhausted(self.max_attempts))
	}
}
