//! Oracle-attested strategy: trust shifts to the oracle's honesty and
//! liveness, no tree traversal required.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use bridge_types::{ClaimAttributes, ExternalProof, Intent, OracleAttestation};

use crate::{ClaimError, ExternalProofVerifier};

/// Verifies the oracle's signature over exactly the attested tuple
/// (uniqueness tag, claimed amount, receiver commitment).
pub struct OracleVerifier {
	oracle_key: VerifyingKey,
}

impl OracleVerifier {
	pub fn new(oracle_key: VerifyingKey) -> Self {
		Self { oracle_key }
	}
}

impl ExternalProofVerifier for OracleVerifier {
	fn strategy(&self) -> &'static str {
		"oracle"
	}

	fn verify(&self, _intent: &Intent, proof: &ExternalProof) -> Result<ClaimAttributes, ClaimError> {
		let ExternalProof::Oracle(attestation) = proof else {
			return Err(ClaimError::MalformedProof(
				"oracle verifier received a non-oracle proof".into(),
			));
		};

		let signature = Signature::try_from(attestation.signature.as_slice())
			.map_err(|e| ClaimError::MalformedProof(format!("signature bytes: {e}")))?;
		let message = OracleAttestation::message(
			&attestation.uniqueness_tag,
			attestation.claimed_amount,
			&attestation.receiver_commitment,
		);
		self.oracle_key
			.verify(&message, &signature)
			.map_err(|_| ClaimError::InvalidSignature)?;

		Ok(ClaimAttributes {
			uniqueness_tag: attestation.uniqueness_tag,
			claimed_amount: attestation.claimed_amount,
			receiver_commitment: attestation.receiver_commitment,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_types::{AccountId, IntentState, Scalar};
	use ed25519_dalek::{Signer, SigningKey};
	use rand::rngs::OsRng;

	fn intent() -> Intent {
		Intent {
			id: 4,
			maker: AccountId([1u8; 32]),
			locked_amount: 10,
			min_counter_amount: 100_000,
			receiver_commitment: Scalar::from_u64(55),
			deadline: 1000,
			state: IntentState::Open,
		}
	}

	fn attested(signer: &SigningKey, amount: u64) -> OracleAttestation {
		let tag = Scalar::from_u64(777);
		let receiver = Scalar::from_u64(55);
		let signature = signer.sign(&OracleAttestation::message(&tag, amount, &receiver));
		OracleAttestation {
			uniqueness_tag: tag,
			claimed_amount: amount,
			receiver_commitment: receiver,
			signature: signature.to_bytes().to_vec(),
		}
	}

	#[test]
	fn accepts_oracle_signature() {
		let signer = SigningKey::generate(&mut OsRng);
		let verifier = OracleVerifier::new(signer.verifying_key());
		let attestation = attested(&signer, 100_100);

		let attrs = verifier
			.verify(&intent(), &ExternalProof::Oracle(attestation))
			.unwrap();
		assert_eq!(attrs.claimed_amount, 100_100);
	}

	#[test]
	fn rejects_tampered_tuple() {
		let signer = SigningKey::generate(&mut OsRng);
		let verifier = OracleVerifier::new(signer.verifying_key());
		let mut attestation = attested(&signer, 100_100);
		// the signature covers the amount; inflating it breaks verification
		attestation.claimed_amount = 200_000;

		assert_eq!(
			verifier
				.verify(&intent(), &ExternalProof::Oracle(attestation))
				.unwrap_err(),
			ClaimError::InvalidSignature
		);
	}

	#[test]
	fn rejects_foreign_oracle() {
		let signer = SigningKey::generate(&mut OsRng);
		let intruder = SigningKey::generate(&mut OsRng);
		let verifier = OracleVerifier::new(signer.verifying_key());
		let attestation = attested(&intruder, 100_100);

		assert_eq!(
			verifier
				.verify(&intent(), &ExternalProof::Oracle(attestation))
				.unwrap_err(),
			ClaimError::InvalidSignature
		);
	}

	#[test]
	fn rejects_short_signature() {
		let signer = SigningKey::generate(&mut OsRng);
		let verifier = OracleVerifier::new(signer.verifying_key());
		let mut attestation = attested(&signer, 100_100);
		attestation.signature.truncate(10);

		assert!(matches!(
			verifier
				.verify(&intent(), &ExternalProof::Oracle(attestation))
				.unwrap_err(),
			ClaimError::MalformedProof(_)
		));
	}
}
