//! Common aliases and identities used throughout the bridge.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Asset amount in the smallest indivisible unit of its ledger.
pub type Amount = u64;

/// Monotonic external time, expressed as a slot/height number.
pub type Slot = u64;

/// Identity of an account on the hosting ledger.
///
/// Treated as an opaque 32-byte value; the core only ever compares it and
/// folds it into intent digests.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
	pub fn to_hex(self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Option<Self> {
		let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
		let bytes: [u8; 32] = raw.try_into().ok()?;
		Some(Self(bytes))
	}
}

impl fmt::Debug for AccountId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "AccountId({})", self.to_hex())
	}
}

impl fmt::Display for AccountId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl Serialize for AccountId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for AccountId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		AccountId::from_hex(&s).ok_or_else(|| de::Error::custom("expected 32-byte hex account id"))
	}
}

/// The two authenticated maps the bridge maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapName {
	Intents,
	Nullifiers,
}

impl MapName {
	pub fn as_str(self) -> &'static str {
		match self {
			MapName::Intents => "intents",
			MapName::Nullifiers => "nullifiers",
		}
	}
}

impl fmt::Display for MapName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MapName {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"intents" => Ok(MapName::Intents),
			"nullifiers" => Ok(MapName::Nullifiers),
			_ => Err(()),
		}
	}
}
