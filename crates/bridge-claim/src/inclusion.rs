//! Inclusion-proof strategy: authenticate the payment against the trusted
//! anchor.

use std::sync::Arc;
use tracing::debug;

use bridge_anchor::AnchorFeed;
use bridge_types::{
	node_hash, ClaimAttributes, ExternalProof, InclusionProof, Intent, Scalar,
	EXTERNAL_TREE_DEPTH,
};

use crate::{ClaimError, ExternalProofVerifier};

/// Verifies an opened note commitment and its sibling path against the
/// anchor feed, then matches the candidate outputs against the intent.
pub struct InclusionVerifier {
	anchor: Arc<AnchorFeed>,
}

impl InclusionVerifier {
	pub fn new(anchor: Arc<AnchorFeed>) -> Self {
		Self { anchor }
	}

	fn fold_to_root(proof: &InclusionProof) -> Result<Scalar, ClaimError> {
		if proof.siblings.len() != EXTERNAL_TREE_DEPTH {
			return Err(ClaimError::MalformedProof(format!(
				"expected {} siblings, got {}",
				EXTERNAL_TREE_DEPTH,
				proof.siblings.len()
			)));
		}
		let mut acc = proof.cm;
		for (level, sibling) in proof.siblings.iter().enumerate() {
			acc = if (proof.position >> level) & 1 == 0 {
				node_hash(&acc, sibling)
			} else {
				node_hash(sibling, &acc)
			};
		}
		Ok(acc)
	}
}

impl ExternalProofVerifier for InclusionVerifier {
	fn strategy(&self) -> &'static str {
		"inclusion"
	}

	fn verify(&self, intent: &Intent, proof: &ExternalProof) -> Result<ClaimAttributes, ClaimError> {
		let ExternalProof::Inclusion(proof) = proof else {
			return Err(ClaimError::MalformedProof(
				"inclusion verifier received a non-inclusion proof".into(),
			));
		};

		// 1. the opening must reproduce the exported commitment
		if proof.opening.commitment() != proof.cm {
			return Err(ClaimError::CommitmentMismatch);
		}

		// 2. the path must hang from the trusted anchor
		let root = Self::fold_to_root(proof)?;
		let anchor = self.anchor.current();
		if root != anchor {
			debug!(%root, %anchor, "inclusion path root does not match anchor");
			return Err(ClaimError::AnchorMismatch);
		}

		// 3. some candidate output must pay the intended recipient enough;
		// sentinel slots are skipped so they can never match
		let matched = proof
			.outputs
			.iter()
			.filter(|entry| !entry.is_sentinel())
			.find(|entry| {
				entry.commitment == intent.receiver_commitment
					&& entry.amount >= intent.min_counter_amount
			})
			.ok_or(ClaimError::NoMatchingOutput)?;

		Ok(ClaimAttributes {
			uniqueness_tag: proof.uniqueness_tag,
			claimed_amount: matched.amount,
			receiver_commitment: matched.commitment,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_anchor::AnchorUpdate;
	use bridge_types::{AccountId, CommitmentOpening, IntentState, OutputEntry, OUTPUT_SLOTS};
	use ed25519_dalek::SigningKey;
	use rand::rngs::OsRng;

	fn receiver_opening() -> CommitmentOpening {
		CommitmentOpening {
			pk_d_receiver: Scalar::from_u64(41),
			value: 100_100,
			rseed: Scalar::from_u64(42),
			rho: Scalar::from_u64(43),
		}
	}

	fn intent_for(opening: &CommitmentOpening) -> Intent {
		Intent {
			id: 0,
			maker: AccountId([1u8; 32]),
			locked_amount: 10,
			min_counter_amount: 100_000,
			receiver_commitment: opening.receiver_commitment(),
			deadline: 1000,
			state: IntentState::Open,
		}
	}

	/// Proof whose path folds to a computable root: position 0 with
	/// all-zero siblings.
	fn proof_for(opening: CommitmentOpening) -> (InclusionProof, Scalar) {
		let cm = opening.commitment();
		let mut outputs = [OutputEntry::default(); OUTPUT_SLOTS];
		outputs[0] = OutputEntry {
			commitment: opening.receiver_commitment(),
			amount: opening.value,
		};
		let proof = InclusionProof {
			cm,
			siblings: vec![Scalar::ZERO; EXTERNAL_TREE_DEPTH],
			position: 0,
			opening,
			uniqueness_tag: Scalar::from_u64(777),
			outputs,
		};
		let root = InclusionVerifier::fold_to_root(&proof).unwrap();
		(proof, root)
	}

	fn anchored_feed(root: Scalar) -> Arc<AnchorFeed> {
		let signer = SigningKey::generate(&mut OsRng);
		let feed = AnchorFeed::new(signer.verifying_key());
		feed.apply_update(&AnchorUpdate::signed(&signer, root, Scalar::ZERO))
			.unwrap();
		Arc::new(feed)
	}

	#[test]
	fn accepts_valid_proof() {
		let opening = receiver_opening();
		let intent = intent_for(&opening);
		let (proof, root) = proof_for(opening);
		let verifier = InclusionVerifier::new(anchored_feed(root));

		let attrs = verifier
			.verify(&intent, &ExternalProof::Inclusion(proof))
			.unwrap();
		assert_eq!(attrs.claimed_amount, 100_100);
		assert_eq!(attrs.receiver_commitment, intent.receiver_commitment);
		assert_eq!(attrs.uniqueness_tag, Scalar::from_u64(777));
	}

	#[test]
	fn rejects_tampered_opening() {
		let opening = receiver_opening();
		let intent = intent_for(&opening);
		let (mut proof, root) = proof_for(opening);
		proof.opening.value += 1;
		let verifier = InclusionVerifier::new(anchored_feed(root));

		assert_eq!(
			verifier
				.verify(&intent, &ExternalProof::Inclusion(proof))
				.unwrap_err(),
			ClaimError::CommitmentMismatch
		);
	}

	#[test]
	fn rejects_wrong_anchor() {
		let opening = receiver_opening();
		let intent = intent_for(&opening);
		let (proof, _) = proof_for(opening);
		let verifier = InclusionVerifier::new(anchored_feed(Scalar::from_u64(123)));

		assert_eq!(
			verifier
				.verify(&intent, &ExternalProof::Inclusion(proof))
				.unwrap_err(),
			ClaimError::AnchorMismatch
		);
	}

	#[test]
	fn underpaying_output_list_is_rejected() {
		let opening = receiver_opening();
		let intent = intent_for(&opening);
		let (mut proof, root) = proof_for(opening);
		// every candidate pays below the minimum
		proof.outputs[0].amount = 99_999;
		let verifier = InclusionVerifier::new(anchored_feed(root));

		assert_eq!(
			verifier
				.verify(&intent, &ExternalProof::Inclusion(proof))
				.unwrap_err(),
			ClaimError::NoMatchingOutput
		);
	}

	#[test]
	fn any_later_slot_may_match() {
		let opening = receiver_opening();
		let intent = intent_for(&opening);
		let (mut proof, root) = proof_for(opening);
		proof.outputs[3] = proof.outputs[0];
		proof.outputs[0] = OutputEntry {
			commitment: Scalar::from_u64(5),
			amount: 1,
		};
		let verifier = InclusionVerifier::new(anchored_feed(root));

		let attrs = verifier
			.verify(&intent, &ExternalProof::Inclusion(proof))
			.unwrap();
		assert_eq!(attrs.claimed_amount, 100_100);
	}

	#[test]
	fn sentinel_slots_never_match() {
		let opening = receiver_opening();
		// an intent that would "match" an all-zero entry
		let mut intent = intent_for(&opening);
		intent.receiver_commitment = Scalar::ZERO;
		intent.min_counter_amount = 0;
		let (mut proof, root) = proof_for(opening);
		proof.outputs = [OutputEntry::default(); OUTPUT_SLOTS];
		let verifier = InclusionVerifier::new(anchored_feed(root));

		assert_eq!(
			verifier
				.verify(&intent, &ExternalProof::Inclusion(proof))
				.unwrap_err(),
			ClaimError::NoMatchingOutput
		);
	}
}
