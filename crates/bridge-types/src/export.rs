//! Versioned wallet export schema.
//!
//! The counterparty's wallet exports the data needed to prove its payment:
//! the note opening, the commitment-tree path, and the anchor it hangs
//! from. Parsing is strict: version, network and every `orchard.*` field
//! are validated before anything else touches the data, and violations name
//! the offending field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::claim::{
	CommitmentOpening, ExternalProof, InclusionProof, OutputEntry, OUTPUT_SLOTS,
};
use crate::scalar::Scalar;

/// Path length every inclusion proof must carry after padding.
pub const EXTERNAL_TREE_DEPTH: usize = 32;

const REQUIRED_ORCHARD_FIELDS: [&str; 9] = [
	"pk_d_receiver",
	"value",
	"rseed",
	"rho",
	"cm",
	"anchor",
	"merklePath",
	"position",
	"nf",
];

#[derive(Debug, Error)]
pub enum ExportError {
	#[error("failed to parse wallet export: {0}")]
	Json(String),
	#[error("unsupported export version: {0}")]
	Version(Value),
	#[error("invalid network: {0}")]
	Network(Value),
	#[error("missing required field in orchard data: {0}")]
	MissingField(&'static str),
	#[error("invalid field `{field}`: {reason}")]
	InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Testnet,
	Mainnet,
}

/// `orchard` section of the export: the shielded note and its tree path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchardExport {
	pub pk_d_receiver: String,
	/// Value in the external chain's smallest unit, as a decimal string.
	pub value: String,
	pub rseed: String,
	pub rho: String,
	pub cm: String,
	pub anchor: String,
	#[serde(rename = "merklePath")]
	pub merkle_path: Vec<String>,
	pub position: u32,
	pub nf: String,
}

/// Version-1 wallet export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletExportV1 {
	pub version: u32,
	pub network: Network,
	pub txid: String,
	#[serde(rename = "blockHeight", skip_serializing_if = "Option::is_none")]
	pub block_height: Option<u64>,
	#[serde(rename = "intentHint", skip_serializing_if = "Option::is_none")]
	pub intent_hint: Option<String>,
	pub orchard: OrchardExport,
}

/// Parses and validates a wallet export. Fails before any state is touched;
/// every failure identifies the violated field.
pub fn parse_wallet_export(json: &str) -> Result<WalletExportV1, ExportError> {
	let data: Value = serde_json::from_str(json).map_err(|e| ExportError::Json(e.to_string()))?;

	match data.get("version") {
		Some(v) if v.as_u64() == Some(1) => {}
		other => return Err(ExportError::Version(other.cloned().unwrap_or(Value::Null))),
	}

	match data.get("network").and_then(Value::as_str) {
		Some("testnet") | Some("mainnet") => {}
		_ => {
			return Err(ExportError::Network(
				data.get("network").cloned().unwrap_or(Value::Null),
			))
		}
	}

	let orchard = data
		.get("orchard")
		.ok_or(ExportError::MissingField("orchard"))?;
	for field in REQUIRED_ORCHARD_FIELDS {
		if orchard.get(field).is_none() {
			return Err(ExportError::MissingField(field));
		}
	}

	serde_json::from_value(data).map_err(|e| ExportError::Json(e.to_string()))
}

fn scalar_field(field: &'static str, value: &str) -> Result<Scalar, ExportError> {
	Scalar::from_hex(value).map_err(|e| ExportError::InvalidField {
		field,
		reason: e.to_string(),
	})
}

impl WalletExportV1 {
	/// Converts the export into an inclusion-strategy external proof.
	///
	/// The sibling path is zero-padded up to [`EXTERNAL_TREE_DEPTH`]; the
	/// single exported note becomes the first candidate output, bound to
	/// the derived receiver commitment.
	pub fn to_external_proof(&self) -> Result<ExternalProof, ExportError> {
		let o = &self.orchard;

		let opening = CommitmentOpening {
			pk_d_receiver: scalar_field("pk_d_receiver", &o.pk_d_receiver)?,
			value: o.value.parse().map_err(|_| ExportError::InvalidField {
				field: "value",
				reason: format!("expected decimal amount, got {:?}", o.value),
			})?,
			rseed: scalar_field("rseed", &o.rseed)?,
			rho: scalar_field("rho", &o.rho)?,
		};

		if o.merkle_path.len() > EXTERNAL_TREE_DEPTH {
			return Err(ExportError::InvalidField {
				field: "merklePath",
				reason: format!(
					"expected at most {} siblings, got {}",
					EXTERNAL_TREE_DEPTH,
					o.merkle_path.len()
				),
			});
		}
		let mut siblings = Vec::with_capacity(EXTERNAL_TREE_DEPTH);
		for entry in &o.merkle_path {
			siblings.push(scalar_field("merklePath", entry)?);
		}
		siblings.resize(EXTERNAL_TREE_DEPTH, Scalar::ZERO);

		let mut outputs = [OutputEntry::default(); OUTPUT_SLOTS];
		outputs[0] = OutputEntry {
			commitment: opening.receiver_commitment(),
			amount: opening.value,
		};

		Ok(ExternalProof::Inclusion(InclusionProof {
			cm: scalar_field("cm", &o.cm)?,
			siblings,
			position: o.position,
			opening,
			uniqueness_tag: scalar_field("nf", &o.nf)?,
			outputs,
		}))
	}

	/// The anchor this export's path hangs from.
	pub fn anchor(&self) -> Result<Scalar, ExportError> {
		scalar_field("anchor", &self.orchard.anchor)
	}
}
