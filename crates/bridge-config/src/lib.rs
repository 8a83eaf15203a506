//! Configuration types and loading.
//!
//! TOML files with `${VAR}` environment substitution and `BRIDGE_`-prefixed
//! overrides for the common knobs. Validation runs before anything consumes
//! the config: a service never starts on a config that cannot work.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Which external-proof strategy the claim verifier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStrategy {
	Inclusion,
	Oracle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
	#[serde(default = "default_service_name")]
	pub name: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
	/// Oracle verifying key, 32-byte hex.
	pub public_key: String,
	pub strategy: ClaimStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorConfig {
	/// JSON-RPC endpoint of the source chain.
	pub source_url: String,
	#[serde(default)]
	pub rpc_user: Option<String>,
	#[serde(default)]
	pub rpc_pass: Option<String>,
	#[serde(default = "default_poll_interval")]
	pub poll_interval_secs: u64,
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	/// Anchor-update authority verifying key, 32-byte hex.
	pub authority_key: String,
	/// Authority signing key, 32-byte hex. Only set on the node that runs
	/// the anchor poller; usually injected via `${...}` substitution.
	#[serde(default)]
	pub authority_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	/// Directory holding the replica snapshots.
	#[serde(default = "default_storage_path")]
	pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
	pub service: ServiceConfig,
	pub oracle: OracleConfig,
	pub anchor: AnchorConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

fn default_service_name() -> String {
	"bridge".to_string()
}

fn default_http_port() -> u16 {
	3001
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_poll_interval() -> u64 {
	30
}

fn default_confirmations() -> u64 {
	10
}

fn default_storage_path() -> PathBuf {
	PathBuf::from("./data")
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			path: default_storage_path(),
		}
	}
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "BRIDGE_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<BridgeConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		let content = tokio::fs::read_to_string(file_path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(file_path.clone())
			} else {
				ConfigError::IoError(e)
			}
		})?;

		let mut config = self.parse(&content)?;
		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;
		Ok(config)
	}

	/// Parses a TOML string directly; used by `load` and by tests.
	pub fn from_toml(content: &str) -> Result<BridgeConfig, ConfigError> {
		let loader = ConfigLoader::new();
		let config = loader.parse(content)?;
		validate_config(&config)?;
		Ok(config)
	}

	fn parse(&self, content: &str) -> Result<BridgeConfig, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value =
				env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut BridgeConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		Ok(())
	}
}

fn validate_config(config: &BridgeConfig) -> Result<(), ConfigError> {
	if config.service.http_port == 0 {
		return Err(ConfigError::ValidationError(
			"service.http_port must be non-zero".to_string(),
		));
	}
	if config.anchor.poll_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"anchor.poll_interval_secs must be non-zero".to_string(),
		));
	}
	validate_key("oracle.public_key", &config.oracle.public_key)?;
	validate_key("anchor.authority_key", &config.anchor.authority_key)?;
	if let Some(secret) = &config.anchor.authority_secret {
		validate_key("anchor.authority_secret", secret)?;
	}
	Ok(())
}

fn validate_key(name: &str, value: &str) -> Result<(), ConfigError> {
	let raw = hex::decode(value.strip_prefix("0x").unwrap_or(value))
		.map_err(|e| ConfigError::ValidationError(format!("{name} is not hex: {e}")))?;
	if raw.len() != 32 {
		return Err(ConfigError::ValidationError(format!(
			"{name} must be 32 bytes, got {}",
			raw.len()
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_toml() -> String {
		format!(
			r#"
[service]
name = "test-bridge"
http_port = 3001

[oracle]
public_key = "{key}"
strategy = "oracle"

[anchor]
source_url = "http://127.0.0.1:8232"
poll_interval_secs = 30
confirmations = 10
authority_key = "{key}"

[storage]
path = "./data"
"#,
			key = "ab".repeat(32)
		)
	}

	#[test]
	fn toml_parsing() {
		let config = ConfigLoader::from_toml(&sample_toml()).unwrap();
		assert_eq!(config.service.name, "test-bridge");
		assert_eq!(config.oracle.strategy, ClaimStrategy::Oracle);
		assert_eq!(config.anchor.confirmations, 10);
	}

	#[test]
	fn defaults_fill_in() {
		let toml = format!(
			r#"
[service]

[oracle]
public_key = "{key}"
strategy = "inclusion"

[anchor]
source_url = "http://127.0.0.1:8232"
authority_key = "{key}"
"#,
			key = "cd".repeat(32)
		);
		let config = ConfigLoader::from_toml(&toml).unwrap();
		assert_eq!(config.service.http_port, 3001);
		assert_eq!(config.anchor.poll_interval_secs, 30);
		assert_eq!(config.storage.path, PathBuf::from("./data"));
	}

	#[test]
	fn rejects_short_key() {
		let toml = sample_toml().replace(&"ab".repeat(32), "abcd");
		let err = ConfigLoader::from_toml(&toml).unwrap_err();
		assert!(matches!(err, ConfigError::ValidationError(_)), "{err}");
	}

	#[test]
	fn substitutes_env_vars() {
		env::set_var("BRIDGE_TEST_SOURCE_URL", "http://10.0.0.1:8232");
		let toml = sample_toml().replace(
			"http://127.0.0.1:8232",
			"${BRIDGE_TEST_SOURCE_URL}",
		);
		let loader = ConfigLoader::new();
		let config = loader.parse(&toml).unwrap();
		assert_eq!(config.anchor.source_url, "http://10.0.0.1:8232");
	}

	#[test]
	fn missing_env_var_is_an_error() {
		let toml = sample_toml().replace(
			"http://127.0.0.1:8232",
			"${BRIDGE_TEST_UNSET_VARIABLE}",
		);
		let loader = ConfigLoader::new();
		assert!(matches!(
			loader.parse(&toml),
			Err(ConfigError::EnvVarNotFound(_))
		));
	}
}
