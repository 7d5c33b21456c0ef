//! Main entry point for the fee relay service.
//!
//! Loads the configuration, builds the relay engine from the configured
//! implementations and serves the relay HTTP API until interrupted.

use clap::Parser;
use relay_config::Config;
use std::path::PathBuf;
use std::sync::Arc;

mod factory_registry;
mod server;

/// Command-line arguments for the relay service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
		std::future::pending::<()>().await;
	}
	tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG takes precedence over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started fee relay");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(relayer_id = %config.relayer.id, "Loaded configuration");

	let api_config = config
		.api
		.clone()
		.filter(|api| api.enabled)
		.ok_or("The [api] section must be present and enabled to serve relay requests")?;

	let engine = Arc::new(factory_registry::build_relay_from_config(config).await?);
	server::start_server(api_config, engine, shutdown_signal()).await?;

	tracing::info!("Stopped fee relay");
	Ok(())
}
