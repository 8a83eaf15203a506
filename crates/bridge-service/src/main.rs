use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge_anchor::{AnchorFeed, AnchorPoller, HttpAnchorSource, PollerConfig};
use bridge_claim::{ClaimService, ExternalProofVerifier, InclusionVerifier, OracleVerifier};
use bridge_config::{BridgeConfig, ClaimStrategy, ConfigLoader};
use bridge_core::{Engine, LocalWitnessProvider};
use bridge_indexer::{IndexerState, MapStore};
use bridge_registry::{Ledger, Registry};
use bridge_types::MapName;

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "Cross-chain atomic-swap bridge node", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the bridge node
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting bridge node");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);

	// Replicas first: the engine's witness provider reads from them.
	let intents = MapStore::open(MapName::Intents, config.storage.path.join("intents.json"))
		.await
		.context("Failed to open intents replica")?;
	let nullifiers = MapStore::open(
		MapName::Nullifiers,
		config.storage.path.join("nullifiers.json"),
	)
	.await
	.context("Failed to open nullifiers replica")?;
	let indexer = Arc::new(IndexerState::new(intents, nullifiers));

	// Anchor feed, read by the inclusion strategy.
	let authority = verifying_key(&config.anchor.authority_key)
		.context("Invalid anchor.authority_key")?;
	let feed = Arc::new(AnchorFeed::new(authority));

	let claims = claim_service(&config, feed.clone()).context("Failed to build claim service")?;
	let provider = Arc::new(LocalWitnessProvider::new(indexer.clone()));
	let engine = Arc::new(Engine::new(Registry::new(Ledger::new()), claims, provider));
	indexer.set_external(engine.roots_handle());

	// Witness API
	let http_port = config.service.http_port;
	let server_state = indexer.clone();
	let server_handle =
		tokio::spawn(async move { bridge_indexer::serve(server_state, http_port).await });

	// Anchor poller, only on the node holding the authority key
	let poller_handle = match &config.anchor.authority_secret {
		Some(secret) => {
			let signer = signing_key(secret).context("Invalid anchor.authority_secret")?;
			let mut source = HttpAnchorSource::new(config.anchor.source_url.clone());
			if let (Some(user), Some(pass)) = (&config.anchor.rpc_user, &config.anchor.rpc_pass) {
				source = source.with_auth(user.clone(), pass.clone());
			}
			let poller = AnchorPoller::new(
				source,
				feed.clone(),
				signer,
				PollerConfig {
					confirmations: config.anchor.confirmations,
					poll_interval: Duration::from_secs(config.anchor.poll_interval_secs),
				},
			);
			info!("Anchor poller enabled");
			Some(tokio::spawn(poller.run()))
		}
		None => {
			info!("No authority secret configured; anchor poller disabled");
			None
		}
	};

	info!("Bridge node started");

	shutdown_signal().await;
	info!("Shutdown signal received, stopping services...");

	server_handle.abort();
	if let Some(handle) = poller_handle {
		handle.abort();
	}

	info!("Bridge node stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("Claim strategy: {:?}", config.oracle.strategy);
	info!("Anchor source: {}", config.anchor.source_url);
	info!(
		"Anchor poller: {}",
		if config.anchor.authority_secret.is_some() {
			"enabled"
		} else {
			"disabled"
		}
	);
	info!("Storage path: {:?}", config.storage.path);

	Ok(())
}

fn claim_service(config: &BridgeConfig, feed: Arc<AnchorFeed>) -> Result<ClaimService> {
	let verifier: Arc<dyn ExternalProofVerifier> = match config.oracle.strategy {
		ClaimStrategy::Inclusion => Arc::new(InclusionVerifier::new(feed)),
		ClaimStrategy::Oracle => {
			let oracle_key =
				verifying_key(&config.oracle.public_key).context("Invalid oracle.public_key")?;
			Arc::new(OracleVerifier::new(oracle_key))
		}
	};
	Ok(ClaimService::new(vec![verifier]))
}

fn verifying_key(hex_key: &str) -> Result<VerifyingKey> {
	let raw = hex::decode(hex_key.strip_prefix("0x").unwrap_or(hex_key))?;
	let bytes: [u8; 32] = raw
		.try_into()
		.map_err(|_| anyhow::anyhow!("expected 32 bytes"))?;
	VerifyingKey::from_bytes(&bytes).context("not a valid ed25519 public key")
}

fn signing_key(hex_key: &str) -> Result<SigningKey> {
	let raw = hex::decode(hex_key.strip_prefix("0x").unwrap_or(hex_key))?;
	let bytes: [u8; 32] = raw
		.try_into()
		.map_err(|_| anyhow::anyhow!("expected 32 bytes"))?;
	Ok(SigningKey::from_bytes(&bytes))
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
