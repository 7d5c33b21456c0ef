//! Test fixtures: signed transactions and a scriptable in-process ledger.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! downstream crates that drive a real engine over a fake ledger.

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_eips::eip2930::AccessList;
use alloy_network::TxSignerSync;
use alloy_primitives::{address, Address, Bytes, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relay_ledger::{CallFailure, LedgerError, LedgerInterface, LedgerService, SendFailure};
use relay_types::{ConfigSchema, LedgerReceipt, Schema, ValidationError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const RELAYER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const SPONSOR: Address = address!("0x1111111111111111111111111111111111111111");
pub const ASSET: Address = address!("0x2222222222222222222222222222222222222222");

pub fn signer() -> PrivateKeySigner {
	USER_KEY.parse().unwrap()
}

pub fn dead_address() -> Address {
	address!("0x000000000000000000000000000000000000dEaD")
}

fn encode(envelope: TxEnvelope) -> String {
	format!("0x{}", hex::encode(envelope.encoded_2718()))
}

/// Zero-value legacy transfer; `to = None` creates a contract.
pub fn sign_legacy(
	signer: &PrivateKeySigner,
	nonce: u64,
	chain_id: Option<u64>,
	to: Option<Address>,
) -> String {
	let mut tx = TxLegacy {
		chain_id,
		nonce,
		gas_price: 25_000_000_000,
		gas_limit: 21_000,
		to: to.map_or(TxKind::Create, TxKind::Call),
		value: U256::ZERO,
		input: Bytes::new(),
	};
	let signature = signer.sign_transaction_sync(&mut tx).unwrap();
	encode(tx.into_signed(signature).into())
}

pub fn sign_eip1559(signer: &PrivateKeySigner, nonce: u64, chain_id: u64) -> String {
	let mut tx = TxEip1559 {
		chain_id,
		nonce,
		gas_limit: 60_000,
		max_fee_per_gas: 30_000_000_000,
		max_priority_fee_per_gas: 1_000_000_000,
		to: TxKind::Call(ASSET),
		value: U256::ZERO,
		input: Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb]),
		..Default::default()
	};
	let signature = signer.sign_transaction_sync(&mut tx).unwrap();
	encode(tx.into_signed(signature).into())
}

/// Scriptable ledger double.
///
/// Each successful `send_and_confirm` advances the pending nonce by
/// `nonce_step` and counts the send.
pub struct FakeLedger {
	pub simulation: Mutex<Result<(), CallFailure>>,
	pub send_failure: Mutex<Option<SendFailure>>,
	pub receipt_success: AtomicBool,
	pub nonce: AtomicU64,
	pub nonce_step: AtomicU64,
	pub balance: Mutex<U256>,
	pub fail_nonce_read_at: Mutex<Option<usize>>,
	pub send_delay: Mutex<Duration>,
	pub nonce_reads: AtomicUsize,
	pub simulations: AtomicUsize,
	pub sends: AtomicUsize,
	pub balance_reads: AtomicUsize,
	pub in_flight: AtomicBool,
	pub overlapped: AtomicBool,
	pub last_simulation: Mutex<Option<(Address, Bytes, AccessList)>>,
}

impl FakeLedger {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			simulation: Mutex::new(Ok(())),
			send_failure: Mutex::new(None),
			receipt_success: AtomicBool::new(true),
			nonce: AtomicU64::new(7),
			nonce_step: AtomicU64::new(1),
			balance: Mutex::new(U256::ZERO),
			fail_nonce_read_at: Mutex::new(None),
			send_delay: Mutex::new(Duration::ZERO),
			nonce_reads: AtomicUsize::new(0),
			simulations: AtomicUsize::new(0),
			sends: AtomicUsize::new(0),
			balance_reads: AtomicUsize::new(0),
			in_flight: AtomicBool::new(false),
			overlapped: AtomicBool::new(false),
			last_simulation: Mutex::new(None),
		})
	}

	pub fn simulate_with(&self, result: Result<(), CallFailure>) {
		*self.simulation.lock().unwrap() = result;
	}

	/// Reverts the dry run with `reason` as the revert string.
	pub fn revert_with(&self, reason: &str) {
		self.simulate_with(Err(CallFailure::Reverted(reason.to_string())));
	}

	pub fn set_balance(&self, wei: U256) {
		*self.balance.lock().unwrap() = wei;
	}

	/// A ledger implementation backed by this fake, for factories.
	pub fn boxed(self: &Arc<Self>) -> Box<dyn LedgerInterface> {
		Box::new(FakeLedgerHandle(self.clone()))
	}

	pub fn service(self: &Arc<Self>) -> Arc<LedgerService> {
		Arc::new(LedgerService::new(self.boxed()))
	}

	pub fn send_count(&self) -> usize {
		self.sends.load(Ordering::SeqCst)
	}
}

struct FakeLedgerHandle(Arc<FakeLedger>);

struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl LedgerInterface for FakeLedgerHandle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	fn relayer_address(&self) -> Address {
		RELAYER
	}

	async fn simulate_call(
		&self,
		target: Address,
		calldata: Bytes,
		access_list: AccessList,
	) -> Result<(), CallFailure> {
		let ledger = &self.0;
		ledger.simulations.fetch_add(1, Ordering::SeqCst);
		*ledger.last_simulation.lock().unwrap() = Some((target, calldata, access_list));
		ledger.simulation.lock().unwrap().clone()
	}

	async fn send_and_confirm(
		&self,
		_target: Address,
		_calldata: Bytes,
		_confirmations: u64,
		_timeout: Duration,
	) -> Result<LedgerReceipt, SendFailure> {
		let ledger = &self.0;
		if ledger.in_flight.swap(true, Ordering::SeqCst) {
			ledger.overlapped.store(true, Ordering::SeqCst);
		}
		let delay = *ledger.send_delay.lock().unwrap();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		ledger.in_flight.store(false, Ordering::SeqCst);

		if let Some(failure) = ledger.send_failure.lock().unwrap().clone() {
			return Err(failure);
		}

		let count = ledger.sends.fetch_add(1, Ordering::SeqCst) + 1;
		ledger
			.nonce
			.fetch_add(ledger.nonce_step.load(Ordering::SeqCst), Ordering::SeqCst);
		Ok(LedgerReceipt {
			tx_hash: format!("0x{:064x}", count),
			block_number: 100 + count as u64,
			success: ledger.receipt_success.load(Ordering::SeqCst),
		})
	}

	async fn pending_nonce(&self, _address: Address) -> Result<u64, LedgerError> {
		let ledger = &self.0;
		let index = ledger.nonce_reads.fetch_add(1, Ordering::SeqCst);
		if *ledger.fail_nonce_read_at.lock().unwrap() == Some(index) {
			return Err(LedgerError::Network("connection reset".to_string()));
		}
		Ok(ledger.nonce.load(Ordering::SeqCst))
	}

	async fn native_balance(&self, _address: Address) -> Result<U256, LedgerError> {
		self.0.balance_reads.fetch_add(1, Ordering::SeqCst);
		Ok(*self.0.balance.lock().unwrap())
	}
}
