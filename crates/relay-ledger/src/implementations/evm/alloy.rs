//! Alloy-based EVM ledger client.
//!
//! Talks to a single JSON-RPC endpoint over HTTP. The relayer key is loaded
//! into an [`EthereumWallet`] so the provider fills nonce, gas and chain id
//! and signs every submission.

use crate::{CallFailure, LedgerError, LedgerInterface, SendFailure};
use alloy_eips::eip2930::AccessList;
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Revert, SolError};
use alloy_transport::TransportError;
use async_trait::async_trait;
use relay_types::{
	ConfigSchema, Field, FieldType, LedgerReceipt, Schema, SecretString, ValidationError,
};
use std::time::Duration;
use tokio::time::Instant;

/// Ledger client over an Alloy HTTP provider with the relayer wallet.
pub struct AlloyLedger {
	provider: DynProvider,
	relayer: Address,
}

impl AlloyLedger {
	/// Builds a provider for `rpc_url` signing with `signer`.
	pub fn new(
		rpc_url: &str,
		signer: PrivateKeySigner,
		poll_interval: Option<Duration>,
	) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse::<reqwest::Url>()
			.map_err(|e| LedgerError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;

		let relayer = signer.address();
		let provider = ProviderBuilder::new()
			.wallet(EthereumWallet::from(signer))
			.connect_http(url);
		if let Some(interval) = poll_interval {
			provider.client().set_poll_interval(interval);
		}

		Ok(Self {
			provider: provider.erased(),
			relayer,
		})
	}
}

/// Configuration schema for the Alloy ledger client.
pub struct AlloyLedgerSchema;

impl ConfigSchema for AlloyLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or_default();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("rpc_url must be an http(s) URL".to_string())
					}
				}),
			],
			vec![Field::new(
				"poll_interval_ms",
				FieldType::Integer {
					min: Some(50),
					max: Some(60_000),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Extracts the revert string from an RPC error, if the node returned one.
///
/// Prefers ABI-encoded `Error(string)` data; falls back to the message when
/// the data is absent or not an `Error(string)`.
fn revert_reason(err: &TransportError) -> Option<String> {
	let payload = err.as_error_resp()?;
	reason_from_payload(payload.as_revert_data().as_ref().map(|data| data.as_ref()), &payload.message)
}

fn reason_from_payload(data: Option<&[u8]>, message: &str) -> Option<String> {
	data.and_then(decode_revert_data)
		.or_else(|| reason_from_message(message))
}

fn decode_revert_data(data: &[u8]) -> Option<String> {
	Revert::abi_decode(data).ok().map(|revert| revert.reason)
}

fn reason_from_message(message: &str) -> Option<String> {
	message
		.strip_prefix("execution reverted: ")
		.filter(|reason| !reason.is_empty())
		.map(str::to_string)
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyLedgerSchema)
	}

	fn relayer_address(&self) -> Address {
		self.relayer
	}

	async fn simulate_call(
		&self,
		target: Address,
		calldata: Bytes,
		access_list: AccessList,
	) -> Result<(), CallFailure> {
		let request = TransactionRequest::default()
			.from(self.relayer)
			.to(target)
			.input(calldata.into())
			.access_list(access_list);

		match self.provider.call(request).await {
			Ok(_) => Ok(()),
			Err(e) => match revert_reason(&e) {
				Some(reason) => Err(CallFailure::Reverted(reason)),
				None => Err(CallFailure::Transport(e.to_string())),
			},
		}
	}

	async fn send_and_confirm(
		&self,
		target: Address,
		calldata: Bytes,
		confirmations: u64,
		timeout: Duration,
	) -> Result<LedgerReceipt, SendFailure> {
		let request = TransactionRequest::default()
			.from(self.relayer)
			.to(target)
			.input(calldata.into());

		// One deadline covers both the send and the confirmation wait
		let deadline = Instant::now() + timeout;
		let pending = match tokio::time::timeout_at(deadline, self.provider.send_transaction(request))
			.await
		{
			Ok(Ok(pending)) => pending,
			Ok(Err(e)) => return Err(SendFailure::Rejected(e.to_string())),
			Err(_) => {
				return Err(SendFailure::Unconfirmed {
					hash: None,
					detail: format!("No response to submission within {}s", timeout.as_secs()),
				})
			},
		};

		let tx_hash = format!("{:#x}", pending.tx_hash());
		tracing::info!(tx_hash = %tx_hash, confirmations, "Submitted sponsor transaction");

		let remaining = deadline.saturating_duration_since(Instant::now());
		let receipt = match tokio::time::timeout_at(
			deadline,
			pending
				.with_required_confirmations(confirmations)
				.with_timeout(Some(remaining))
				.get_receipt(),
		)
		.await
		{
			Ok(Ok(receipt)) => receipt,
			Ok(Err(e)) => {
				return Err(SendFailure::Unconfirmed {
					hash: Some(tx_hash),
					detail: e.to_string(),
				})
			},
			Err(_) => {
				return Err(SendFailure::Unconfirmed {
					hash: Some(tx_hash),
					detail: format!("Not confirmed within {}s", timeout.as_secs()),
				})
			},
		};

		Ok(LedgerReceipt {
			tx_hash,
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
		})
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, LedgerError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get nonce: {}", e)))
	}

	async fn native_balance(&self, address: Address) -> Result<U256, LedgerError> {
		self.provider
			.get_balance(address)
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get balance: {}", e)))
	}
}

/// Factory for `[ledger.implementations.evm_alloy]`.
///
/// # Parameters
/// - `config`: table with `rpc_url` and optional `poll_interval_ms`
/// - `private_key`: relayer key used to sign submissions
pub fn create_ledger(
	config: &toml::Value,
	private_key: &SecretString,
) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	AlloyLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::InvalidConfig("rpc_url is required".to_string()))?;
	let poll_interval = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.map(|ms| Duration::from_millis(ms as u64));

	let signer: PrivateKeySigner = private_key.with_exposed(|key| {
		key.trim_start_matches("0x")
			.parse()
			.map_err(|_| LedgerError::InvalidConfig("Invalid private key format".to_string()))
	})?;

	Ok(Box::new(AlloyLedger::new(rpc_url, signer, poll_interval)?))
}

/// Registry for the Alloy ledger implementation.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::LedgerRegistry for Registry {}
