//! Relayer account management.
//!
//! The relayer pays the gas of every sponsor call it submits. This crate
//! provides the identity it signs with: the relayer address used for nonce
//! and balance reads, and the key handed to the ledger client for signing.

use alloy_primitives::Address;
use async_trait::async_trait;
use relay_types::{ConfigSchema, ImplementationRegistry, SecretString};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The configured key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// The implementation's configuration was rejected.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Interface of a relayer identity.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address the relayer submits from.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Private key as a `0x`-prefixed hex string.
	///
	/// Consumed by ledger clients that sign locally.
	fn get_private_key(&self) -> SecretString;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Returns every built-in account implementation as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service wrapping the configured account implementation.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the relayer address.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Returns the signing key for ledger clients.
	pub fn get_private_key(&self) -> SecretString {
		self.implementation.get_private_key()
	}
}
