//! External-proof forms consumed by the claim verifier.
//!
//! Two interchangeable authentication strategies exist; the driver depends
//! only on the polymorphic [`ExternalProof`] and on the
//! [`ClaimAttributes`] a strategy extracts from it.

use serde::{Deserialize, Serialize};

use crate::common::Amount;
use crate::scalar::{domain, hash_parts, Scalar};

/// Number of candidate output slots in an inclusion proof. Unused slots are
/// zero entries and can never match an intent.
pub const OUTPUT_SLOTS: usize = 5;

/// Attributes a strategy extracts from a verified external proof. The
/// registry applies the mandatory post-strategy checks to these, never to
/// the raw proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimAttributes {
	/// Uniqueness tag of the consumed external payment (the note
	/// nullifier on the external chain).
	pub uniqueness_tag: Scalar,
	/// Counter-asset value the payment delivered.
	pub claimed_amount: Amount,
	/// Commitment to the payment's recipient.
	pub receiver_commitment: Scalar,
}

/// One candidate output of the external transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputEntry {
	pub commitment: Scalar,
	pub amount: Amount,
}

impl OutputEntry {
	pub fn is_sentinel(&self) -> bool {
		self.commitment.is_zero() && self.amount == 0
	}
}

/// Opening of an external note commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentOpening {
	pub pk_d_receiver: Scalar,
	pub value: Amount,
	pub rseed: Scalar,
	pub rho: Scalar,
}

impl CommitmentOpening {
	/// Recomputes the note commitment this opening claims to open.
	pub fn commitment(&self) -> Scalar {
		hash_parts(
			domain::NOTE_COMMITMENT,
			&[
				&self.pk_d_receiver.to_bytes(),
				&self.value.to_le_bytes(),
				&self.rseed.to_bytes(),
				&self.rho.to_bytes(),
			],
		)
	}

	/// Commitment binding the payment recipient, comparable against
	/// `Intent::receiver_commitment`.
	pub fn receiver_commitment(&self) -> Scalar {
		hash_parts(domain::RECEIVER, &[&self.pk_d_receiver.to_bytes()])
	}
}

/// Inclusion-strategy proof: an opened note commitment plus its sibling
/// path to the trusted anchor, and a fixed-capacity candidate output list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InclusionProof {
	/// Note commitment as exported by the wallet.
	pub cm: Scalar,
	/// Sibling path from the leaf to the anchor, exactly one per level.
	pub siblings: Vec<Scalar>,
	/// Leaf position of `cm` in the external commitment tree.
	pub position: u32,
	/// Opening of `cm`.
	pub opening: CommitmentOpening,
	/// Uniqueness tag of the spent note.
	pub uniqueness_tag: Scalar,
	/// Candidate outputs; zero-padded to `OUTPUT_SLOTS`.
	pub outputs: [OutputEntry; OUTPUT_SLOTS],
}

/// Oracle-strategy proof: the claimed attributes plus the oracle's
/// signature over exactly that tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAttestation {
	pub uniqueness_tag: Scalar,
	pub claimed_amount: Amount,
	pub receiver_commitment: Scalar,
	/// Ed25519 signature bytes (64).
	#[serde(with = "sig_hex")]
	pub signature: Vec<u8>,
}

impl OracleAttestation {
	/// The exact message the oracle signs.
	pub fn message(
		uniqueness_tag: &Scalar,
		claimed_amount: Amount,
		receiver_commitment: &Scalar,
	) -> Vec<u8> {
		let mut msg = Vec::with_capacity(domain::ORACLE_ATTEST.len() + 72);
		msg.extend_from_slice(domain::ORACLE_ATTEST);
		msg.extend_from_slice(&uniqueness_tag.to_bytes());
		msg.extend_from_slice(&claimed_amount.to_le_bytes());
		msg.extend_from_slice(&receiver_commitment.to_bytes());
		msg
	}
}

/// Polymorphic external-proof capability: one of the two concrete forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ExternalProof {
	Inclusion(InclusionProof),
	Oracle(OracleAttestation),
}

mod sig_hex {
	use serde::{de, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&hex::encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(de::Error::custom)
	}
}
