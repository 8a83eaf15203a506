//! Claim verification: authenticating external payment proofs.
//!
//! Two interchangeable strategies prove that a qualifying payment happened
//! on the external chain: an inclusion proof against the trusted anchor,
//! and an oracle-attested signature. The driver depends only on
//! [`ExternalProofVerifier`]; which strategy runs is a deployment choice.
//! Whatever the strategy, it only ever *extracts* claim attributes; the
//! registry applies the mandatory nullifier/amount/receiver checks.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use bridge_types::{ClaimAttributes, ExternalProof, Intent};

mod inclusion;
mod oracle;

pub use inclusion::InclusionVerifier;
pub use oracle::OracleVerifier;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
	/// The opening does not reproduce the presented commitment.
	#[error("commitment opening mismatch")]
	CommitmentMismatch,

	/// The sibling path does not reach the trusted anchor.
	#[error("inclusion path does not authenticate against the trusted anchor")]
	AnchorMismatch,

	/// No candidate output pays the intended recipient enough.
	#[error("no matching output")]
	NoMatchingOutput,

	#[error("invalid oracle signature")]
	InvalidSignature,

	#[error("malformed external proof: {0}")]
	MalformedProof(String),

	#[error("no verifier registered for strategy `{0}`")]
	UnknownStrategy(&'static str),
}

/// Capability interface over the two external-proof forms.
pub trait ExternalProofVerifier: Send + Sync {
	/// Strategy name this verifier handles; keys the service registry.
	fn strategy(&self) -> &'static str;

	/// Authenticates `proof` and extracts the claim attributes, or
	/// identifies the failed sub-check.
	fn verify(&self, intent: &Intent, proof: &ExternalProof) -> Result<ClaimAttributes, ClaimError>;
}

/// Strategy name carried by a proof form.
pub fn strategy_of(proof: &ExternalProof) -> &'static str {
	match proof {
		ExternalProof::Inclusion(_) => "inclusion",
		ExternalProof::Oracle(_) => "oracle",
	}
}

/// Dispatches proofs to whichever verifiers are configured.
pub struct ClaimService {
	verifiers: HashMap<&'static str, Arc<dyn ExternalProofVerifier>>,
}

impl ClaimService {
	pub fn new(verifiers: Vec<Arc<dyn ExternalProofVerifier>>) -> Self {
		Self {
			verifiers: verifiers.into_iter().map(|v| (v.strategy(), v)).collect(),
		}
	}

	pub fn verify(
		&self,
		intent: &Intent,
		proof: &ExternalProof,
	) -> Result<ClaimAttributes, ClaimError> {
		let strategy = strategy_of(proof);
		let verifier = self
			.verifiers
			.get(strategy)
			.ok_or(ClaimError::UnknownStrategy(strategy))?;
		verifier.verify(intent, proof)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_types::{OracleAttestation, Scalar};

	#[test]
	fn unconfigured_strategy_is_rejected() {
		let service = ClaimService::new(vec![]);
		let intent = Intent {
			id: 0,
			maker: bridge_types::AccountId([0u8; 32]),
			locked_amount: 1,
			min_counter_amount: 1,
			receiver_commitment: Scalar::ZERO,
			deadline: 1,
			state: bridge_types::IntentState::Open,
		};
		let proof = ExternalProof::Oracle(OracleAttestation {
			uniqueness_tag: Scalar::ZERO,
			claimed_amount: 0,
			receiver_commitment: Scalar::ZERO,
			signature: vec![0u8; 64],
		});
		assert_eq!(
			service.verify(&intent, &proof).unwrap_err(),
			ClaimError::UnknownStrategy("oracle")
		);
	}
}
