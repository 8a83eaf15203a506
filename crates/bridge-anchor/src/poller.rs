//! Background poller tracking the source chain at a confirmation depth.
//!
//! Each tick: read the latest height, step back by the configured number of
//! confirmations, fetch the commitment-tree root at that height, and submit
//! a signed update only when it differs from what the feed already holds.
//! Transient failures are logged and the cycle is skipped; the poller never
//! terminates the process.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use bridge_types::Scalar;

use crate::{AnchorError, AnchorFeed, AnchorUpdate};

/// Read access to the source chain's height and commitment-tree roots.
#[async_trait]
pub trait AnchorSource: Send + Sync {
	async fn latest_height(&self) -> Result<u64, AnchorError>;

	/// Commitment-tree root at `height`; `None` when the chain exposes no
	/// root there.
	async fn commitment_root(&self, height: u64) -> Result<Option<Scalar>, AnchorError>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
	/// Confirmation depth before a height is considered final.
	pub confirmations: u64,
	pub poll_interval: Duration,
}

pub struct AnchorPoller<S> {
	source: S,
	feed: Arc<AnchorFeed>,
	signer: SigningKey,
	config: PollerConfig,
	last_processed_height: u64,
}

impl<S: AnchorSource> AnchorPoller<S> {
	pub fn new(source: S, feed: Arc<AnchorFeed>, signer: SigningKey, config: PollerConfig) -> Self {
		Self {
			source,
			feed,
			signer,
			config,
			last_processed_height: 0,
		}
	}

	/// Runs forever. A failed cycle is logged and retried on the next tick.
	pub async fn run(mut self) {
		let mut interval = tokio::time::interval(self.config.poll_interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		loop {
			interval.tick().await;
			if let Err(e) = self.tick().await {
				warn!(error = %e, "anchor poll cycle failed, retrying next tick");
			}
		}
	}

	/// One poll cycle. Public so tests can drive the poller without time.
	pub async fn tick(&mut self) -> Result<(), AnchorError> {
		let latest = self.source.latest_height().await?;
		let target = latest.saturating_sub(self.config.confirmations);
		if target <= self.last_processed_height {
			debug!(latest, target, "waiting for new confirmed blocks");
			return Ok(());
		}

		let Some(root) = self.source.commitment_root(target).await? else {
			debug!(height = target, "no commitment root at target height");
			return Ok(());
		};

		let current = self.feed.current();
		if root == current {
			debug!(height = target, "anchor already up to date");
			self.last_processed_height = target;
			return Ok(());
		}

		let update = AnchorUpdate::signed(&self.signer, root, current);
		self.feed.apply_update(&update)?;
		self.last_processed_height = target;
		info!(height = target, anchor = %root, "anchor updated");
		Ok(())
	}
}

/// JSON-RPC source client for the external chain.
pub struct HttpAnchorSource {
	client: reqwest::Client,
	url: String,
	auth: Option<(String, String)>,
}

impl HttpAnchorSource {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			url: url.into(),
			auth: None,
		}
	}

	pub fn with_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
		self.auth = Some((user.into(), pass.into()));
		self
	}

	async fn call(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, AnchorError> {
		let mut request = self.client.post(&self.url).json(&json!({
			"jsonrpc": "1.0",
			"id": "bridge-anchor-feed",
			"method": method,
			"params": params,
		}));
		if let Some((user, pass)) = &self.auth {
			request = request.basic_auth(user, Some(pass));
		}

		let response = request
			.send()
			.await
			.map_err(|e| AnchorError::Source(e.to_string()))?;
		let body: serde_json::Value = response
			.json()
			.await
			.map_err(|e| AnchorError::Source(e.to_string()))?;

		if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
			return Err(AnchorError::Source(error.to_string()));
		}
		body.get("result")
			.cloned()
			.ok_or_else(|| AnchorError::Source("missing result".into()))
	}
}

#[async_trait]
impl AnchorSource for HttpAnchorSource {
	async fn latest_height(&self) -> Result<u64, AnchorError> {
		self.call("getblockcount", json!([]))
			.await?
			.as_u64()
			.ok_or_else(|| AnchorError::Source("non-numeric block count".into()))
	}

	async fn commitment_root(&self, height: u64) -> Result<Option<Scalar>, AnchorError> {
		let hash = self
			.call("getblockhash", json!([height]))
			.await?
			.as_str()
			.ok_or_else(|| AnchorError::Source("non-string block hash".into()))?
			.to_string();
		let block = self.call("getblock", json!([hash, 1])).await?;

		let root_hex = block
			.pointer("/orchard_tree/root")
			.or_else(|| block.get("finalorchardroot"))
			.and_then(|v| v.as_str());
		match root_hex {
			Some(hex) => Scalar::from_hex(hex)
				.map(Some)
				.map_err(|e| AnchorError::Source(format!("bad commitment root: {e}"))),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::OsRng;
	use std::sync::Mutex;

	struct ScriptedSource {
		height: Mutex<u64>,
		roots: Mutex<std::collections::HashMap<u64, Scalar>>,
		fail_next: Mutex<bool>,
	}

	impl ScriptedSource {
		fn new() -> Self {
			Self {
				height: Mutex::new(0),
				roots: Mutex::new(Default::default()),
				fail_next: Mutex::new(false),
			}
		}

		fn advance(&self, height: u64, root: Scalar) {
			*self.height.lock().unwrap() = height;
			self.roots.lock().unwrap().insert(height, root);
		}
	}

	#[async_trait]
	impl AnchorSource for Arc<ScriptedSource> {
		async fn latest_height(&self) -> Result<u64, AnchorError> {
			if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
				return Err(AnchorError::Source("rpc unreachable".into()));
			}
			Ok(*self.height.lock().unwrap())
		}

		async fn commitment_root(&self, height: u64) -> Result<Option<Scalar>, AnchorError> {
			Ok(self.roots.lock().unwrap().get(&height).copied())
		}
	}

	fn poller(
		source: Arc<ScriptedSource>,
		feed: Arc<AnchorFeed>,
		signer: SigningKey,
	) -> AnchorPoller<Arc<ScriptedSource>> {
		AnchorPoller::new(
			source,
			feed,
			signer,
			PollerConfig {
				confirmations: 10,
				poll_interval: Duration::from_secs(30),
			},
		)
	}

	#[tokio::test]
	async fn submits_confirmed_roots_once() {
		let signer = SigningKey::generate(&mut OsRng);
		let feed = Arc::new(AnchorFeed::new(signer.verifying_key()));
		let source = Arc::new(ScriptedSource::new());
		let mut poller = poller(source.clone(), feed.clone(), signer);

		// no confirmed height yet
		source.advance(5, Scalar::from_u64(1));
		poller.tick().await.unwrap();
		assert_eq!(feed.current(), Scalar::ZERO);

		// height 30 confirms height 20
		let root = Scalar::from_u64(20);
		source.advance(30, root);
		source.roots.lock().unwrap().insert(20, root);
		poller.tick().await.unwrap();
		assert_eq!(feed.current(), root);

		// same confirmed height: nothing resubmitted, no error
		poller.tick().await.unwrap();
		assert_eq!(feed.current(), root);
	}

	#[tokio::test]
	async fn failed_cycle_recovers_on_next_tick() {
		let signer = SigningKey::generate(&mut OsRng);
		let feed = Arc::new(AnchorFeed::new(signer.verifying_key()));
		let source = Arc::new(ScriptedSource::new());
		let root = Scalar::from_u64(9);
		source.advance(40, root);
		source.roots.lock().unwrap().insert(30, root);

		let mut poller = poller(source.clone(), feed.clone(), signer);
		*source.fail_next.lock().unwrap() = true;
		assert!(poller.tick().await.is_err());
		assert_eq!(feed.current(), Scalar::ZERO);

		poller.tick().await.unwrap();
		assert_eq!(feed.current(), root);
	}
}
