//! Configuration module for the fee relay.
//!
//! Loads the relay configuration from TOML, resolves `${VAR}` and
//! `${VAR:-default}` environment references, and validates every section
//! before the relay is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(feature = "testing")]
pub mod builders;
mod loader;

#[cfg(feature = "testing")]
pub use builders::config::ConfigBuilder;

use alloy_primitives::{utils::parse_ether, Address, B256};
use regex::Regex;
use relay_types::AccessListEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Relay instance settings, timeouts and confirmation policy.
	pub relayer: RelayerConfig,
	/// Sponsor entry point, designated asset and access hint.
	pub contracts: ContractsConfig,
	/// Ledger client implementations.
	pub ledger: LedgerConfig,
	/// Relayer signing identity.
	pub account: AccountConfig,
	/// Storage backend for the transaction log and alert counters.
	pub storage: StorageConfig,
	/// Low-balance alerting. Disabled when absent.
	pub alerts: Option<AlertConfig>,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Relay instance settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	/// Identifier used in logs.
	pub id: String,
	/// Bound for every ledger read, simulation and side-channel call.
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
	/// Bound for sending a sponsor call and waiting for its confirmations.
	#[serde(default = "default_confirmation_timeout_seconds")]
	pub confirmation_timeout_seconds: u64,
	/// Bound for waiting behind other submissions from the same relayer.
	#[serde(default = "default_submission_queue_timeout_seconds")]
	pub submission_queue_timeout_seconds: u64,
	/// Confirmations to wait for after submission.
	#[serde(default = "default_confirmations")]
	pub min_confirmations: u64,
	/// Upper bound on the history page size.
	#[serde(default = "default_max_history_limit")]
	pub max_history_limit: usize,
}

fn default_request_timeout_seconds() -> u64 {
	15
}

fn default_confirmation_timeout_seconds() -> u64 {
	120
}

fn default_submission_queue_timeout_seconds() -> u64 {
	30
}

fn default_confirmations() -> u64 {
	1
}

fn default_max_history_limit() -> usize {
	100
}

impl RelayerConfig {
	/// Longest a single relay can take when every bounded step runs to its limit.
	///
	/// Counts seven request-bounded calls (dry run, two nonce reads, the
	/// record append and the three alert calls) plus the queue wait and the
	/// send with its confirmations.
	pub fn pipeline_timeout_seconds(&self) -> u64 {
		self.request_timeout_seconds
			.saturating_mul(7)
			.saturating_add(self.submission_queue_timeout_seconds)
			.saturating_add(self.confirmation_timeout_seconds)
	}
}

/// On-chain addresses the pipeline works against.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractsConfig {
	/// Address exposing the `sponsor(bytes)` entry point.
	pub sponsor: String,
	/// Asset contract whose `Transfer` logs qualify a transaction.
	pub asset: String,
	/// Access hint passed to dry runs.
	#[serde(default = "AccessListEntry::default_hint")]
	pub access_list: Vec<AccessListEntry>,
}

/// Configuration for ledger client implementations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of ledger implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Low-balance alerting policy and notification channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertConfig {
	/// Whether alerting runs at all.
	#[serde(default = "default_alerts_enabled")]
	pub enabled: bool,
	/// Processed attempts per sender between balance checks.
	pub sampling_interval: u64,
	/// Alert when the relayer balance is at or below this many ether.
	pub min_balance: String,
	/// Count only sponsored (`SENT`) attempts towards the sampling interval.
	#[serde(default)]
	pub count_only_sponsored: bool,
	/// Which notifier implementation to use.
	pub primary: String,
	/// Map of notifier implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

fn default_alerts_enabled() -> bool {
	true
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Covers the default relay pipeline bound.
fn default_api_timeout() -> u64 {
	300
}

fn default_max_request_size() -> usize {
	256 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match (std::env::var(var_name), default_value) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name
				)));
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply in reverse to keep earlier offsets valid
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates every section.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.relayer.id.is_empty() {
			return Err(ConfigError::Validation("Relayer ID cannot be empty".into()));
		}
		if self.relayer.request_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"request_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.relayer.confirmation_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"confirmation_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.relayer.submission_queue_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"submission_queue_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.relayer.min_confirmations == 0 {
			return Err(ConfigError::Validation(
				"min_confirmations must be at least 1".into(),
			));
		}
		if self.relayer.min_confirmations > 100 {
			return Err(ConfigError::Validation(
				"min_confirmations cannot exceed 100".into(),
			));
		}
		if self.relayer.max_history_limit == 0 {
			return Err(ConfigError::Validation(
				"max_history_limit must be greater than 0".into(),
			));
		}

		self.validate_contracts()?;

		validate_primary("ledger", &self.ledger.primary, &self.ledger.implementations)?;
		validate_primary(
			"account",
			&self.account.primary,
			&self.account.implementations,
		)?;
		validate_primary(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;

		if let Some(alerts) = self.alerts.as_ref().filter(|a| a.enabled) {
			if alerts.sampling_interval == 0 {
				return Err(ConfigError::Validation(
					"alerts.sampling_interval must be greater than 0".into(),
				));
			}
			parse_ether(&alerts.min_balance).map_err(|e| {
				ConfigError::Validation(format!(
					"alerts.min_balance '{}' is not an ether amount: {}",
					alerts.min_balance, e
				))
			})?;
			validate_primary("alerts", &alerts.primary, &alerts.implementations)?;
		}

		if let Some(api) = self.api.as_ref().filter(|a| a.enabled) {
			let pipeline = self.relayer.pipeline_timeout_seconds();
			if api.timeout_seconds < pipeline {
				return Err(ConfigError::Validation(format!(
					"api.timeout_seconds ({}) must cover the relay pipeline bound of {}s",
					api.timeout_seconds, pipeline
				)));
			}
		}

		Ok(())
	}

	fn validate_contracts(&self) -> Result<(), ConfigError> {
		for (name, value) in [
			("contracts.sponsor", &self.contracts.sponsor),
			("contracts.asset", &self.contracts.asset),
		] {
			value.parse::<Address>().map_err(|e| {
				ConfigError::Validation(format!("{} '{}' is not an address: {}", name, value, e))
			})?;
		}

		for entry in &self.contracts.access_list {
			entry.address.parse::<Address>().map_err(|e| {
				ConfigError::Validation(format!(
					"Access list address '{}' is invalid: {}",
					entry.address, e
				))
			})?;
			for key in &entry.storage_keys {
				key.parse::<B256>().map_err(|e| {
					ConfigError::Validation(format!(
						"Access list storage key '{}' is invalid: {}",
						key, e
					))
				})?;
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses, resolves environment variables and validates a TOML string.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
