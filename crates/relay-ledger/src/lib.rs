//! Ledger client for the fee relay.
//!
//! Everything the relay asks of the chain goes through [`LedgerInterface`]:
//! dry runs of the sponsor call, submission with confirmation, and the
//! relayer's pending nonce and native balance. Calldata is opaque here; the
//! pipeline encodes it.

use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use relay_types::{ConfigSchema, ImplementationRegistry, LedgerReceipt, SecretString};
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors from ledger reads and construction.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The implementation's configuration was rejected.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Why a dry run did not return cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
	/// Execution reverted with a string reason.
	#[error("Execution reverted: {0}")]
	Reverted(String),
	/// Node, transport or decoding failure; the call outcome is unknown.
	#[error("Call failed: {0}")]
	Transport(String),
}

/// Why a submission did not produce a confirmed receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailure {
	/// The node refused the transaction; nothing was broadcast.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	/// The transaction may have been broadcast but no receipt was obtained.
	#[error("Transaction unconfirmed{}: {detail}", hash_suffix(.hash))]
	Unconfirmed {
		hash: Option<String>,
		detail: String,
	},
}

fn hash_suffix(hash: &Option<String>) -> String {
	hash.as_deref()
		.map(|h| format!(" ({})", h))
		.unwrap_or_default()
}

impl SendFailure {
	/// Whether the transaction might have reached the chain.
	pub fn possibly_applied(&self) -> bool {
		matches!(self, SendFailure::Unconfirmed { .. })
	}
}

/// Interface of a ledger client bound to the relayer identity.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the configuration schema for this ledger implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address transactions are sent from.
	fn relayer_address(&self) -> Address;

	/// Dry-runs `calldata` against `target` from the relayer address.
	async fn simulate_call(
		&self,
		target: Address,
		calldata: Bytes,
		access_list: AccessList,
	) -> Result<(), CallFailure>;

	/// Signs and sends a call, then waits for `confirmations` blocks.
	async fn send_and_confirm(
		&self,
		target: Address,
		calldata: Bytes,
		confirmations: u64,
		timeout: Duration,
	) -> Result<LedgerReceipt, SendFailure>;

	/// Next nonce of `address`, counting pending transactions.
	async fn pending_nonce(&self, address: Address) -> Result<u64, LedgerError>;

	/// Native balance of `address` in wei.
	async fn native_balance(&self, address: Address) -> Result<U256, LedgerError>;
}

/// Type alias for ledger factory functions.
///
/// Receives the implementation table and the relayer's signing key.
pub type LedgerFactory =
	fn(&toml::Value, &SecretString) -> Result<Box<dyn LedgerInterface>, LedgerError>;

/// Registry trait for ledger implementations.
pub trait LedgerRegistry: ImplementationRegistry<Factory = LedgerFactory> {}

/// Returns every built-in ledger implementation as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Service wrapping the configured ledger client.
pub struct LedgerService {
	implementation: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(implementation: Box<dyn LedgerInterface>) -> Self {
		Self { implementation }
	}

	pub fn relayer_address(&self) -> Address {
		self.implementation.relayer_address()
	}

	pub async fn simulate_call(
		&self,
		target: Address,
		calldata: Bytes,
		access_list: AccessList,
	) -> Result<(), CallFailure> {
		self.implementation
			.simulate_call(target, calldata, access_list)
			.await
	}

	pub async fn send_and_confirm(
		&self,
		target: Address,
		calldata: Bytes,
		confirmations: u64,
		timeout: Duration,
	) -> Result<LedgerReceipt, SendFailure> {
		self.implementation
			.send_and_confirm(target, calldata, confirmations, timeout)
			.await
	}

	pub async fn pending_nonce(&self, address: Address) -> Result<u64, LedgerError> {
		self.implementation.pending_nonce(address).await
	}

	pub async fn native_balance(&self, address: Address) -> Result<U256, LedgerError> {
		self.implementation.native_balance(address).await
	}
}
