//! Relay engine that runs the sponsorship pipeline and serves read queries.
//!
//! The engine owns the pipeline stages and the two side channels. One
//! engine instance is shared by every request handler; concurrent relays
//! only serialize inside the submission guard.

use crate::alerts::AlertThrottler;
use crate::decoder::{self, sender_of};
use crate::recorder::OutcomeRecorder;
use crate::simulator::EligibilitySimulator;
use crate::submission::SubmissionGuard;
use crate::RelayError;
use alloy_eips::eip2930::{AccessList, AccessListItem};
use alloy_primitives::utils::format_ether;
use alloy_primitives::{Address, B256};
use relay_config::Config;
use relay_ledger::LedgerService;
use relay_storage::StorageService;
use relay_types::{
	current_timestamp_millis, DecodedTransaction, EligibilityVerdict, HistoryEntry, HistoryQuery,
	RelayOutcome, SubmissionOutcome, TransactionStatus,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Errors raised while assembling an engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Errors of the read-only queries.
#[derive(Debug, Error)]
pub enum QueryError {
	#[error("Invalid address: {0}")]
	InvalidAddress(String),
	#[error("Invalid status filter: {0}")]
	InvalidFilter(String),
	#[error("Ledger unavailable: {0}")]
	Ledger(String),
	#[error("Storage unavailable: {0}")]
	Storage(String),
}

/// Pipeline parameters resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
	pub sponsor: Address,
	pub asset: Address,
	pub access_list: AccessList,
	pub min_confirmations: u64,
	pub request_timeout: Duration,
	pub confirmation_timeout: Duration,
	pub submission_queue_timeout: Duration,
	pub max_history_limit: usize,
}

fn parse_address(field: &str, value: &str) -> Result<Address, EngineError> {
	Address::from_str(value)
		.map_err(|e| EngineError::Config(format!("{} '{}' is not an address: {}", field, value, e)))
}

impl EngineSettings {
	pub fn from_config(config: &Config) -> Result<Self, EngineError> {
		let contracts = &config.contracts;
		let access_list = contracts
			.access_list
			.iter()
			.map(|entry| {
				let storage_keys = entry
					.storage_keys
					.iter()
					.map(|key| {
						B256::from_str(key).map_err(|e| {
							EngineError::Config(format!("Invalid storage key '{}': {}", key, e))
						})
					})
					.collect::<Result<Vec<_>, _>>()?;
				Ok(AccessListItem {
					address: parse_address("access_list address", &entry.address)?,
					storage_keys,
				})
			})
			.collect::<Result<Vec<_>, EngineError>>()?;

		Ok(Self {
			sponsor: parse_address("sponsor", &contracts.sponsor)?,
			asset: parse_address("asset", &contracts.asset)?,
			access_list: AccessList(access_list),
			min_confirmations: config.relayer.min_confirmations,
			request_timeout: Duration::from_secs(config.relayer.request_timeout_seconds),
			confirmation_timeout: Duration::from_secs(config.relayer.confirmation_timeout_seconds),
			submission_queue_timeout: Duration::from_secs(
				config.relayer.submission_queue_timeout_seconds,
			),
			max_history_limit: config.relayer.max_history_limit,
		})
	}
}

/// Sponsorship pipeline and its read queries.
pub struct RelayEngine {
	settings: EngineSettings,
	storage: Arc<StorageService>,
	ledger: Arc<LedgerService>,
	simulator: EligibilitySimulator,
	submission: SubmissionGuard,
	recorder: Arc<dyn OutcomeRecorder>,
	throttler: Arc<dyn AlertThrottler>,
}

impl RelayEngine {
	pub fn new(
		settings: EngineSettings,
		storage: Arc<StorageService>,
		ledger: Arc<LedgerService>,
		recorder: Arc<dyn OutcomeRecorder>,
		throttler: Arc<dyn AlertThrottler>,
	) -> Self {
		let simulator = EligibilitySimulator::new(
			ledger.clone(),
			settings.sponsor,
			settings.asset,
			settings.access_list.clone(),
			settings.request_timeout,
		);
		let submission = SubmissionGuard::new(
			ledger.clone(),
			settings.sponsor,
			settings.min_confirmations,
			settings.request_timeout,
			settings.confirmation_timeout,
			settings.submission_queue_timeout,
		);
		Self {
			settings,
			storage,
			ledger,
			simulator,
			submission,
			recorder,
			throttler,
		}
	}

	/// Address of the relayer identity paying for sponsorships.
	pub fn relayer_address(&self) -> Address {
		self.ledger.relayer_address()
	}

	/// Runs one raw transaction through the pipeline.
	///
	/// The outcome is recorded and counted for alerting whenever the sender
	/// is known, including schema failures.
	#[instrument(skip_all, fields(sender = tracing::field::Empty))]
	pub async fn relay(&self, raw_transaction: &str) -> RelayOutcome {
		tracing::debug!(raw_transaction = %raw_transaction, "Received relay request");

		let tx = match decoder::decode(raw_transaction) {
			Ok(tx) => tx,
			Err(e) => {
				let failure = RelayError::from(e);
				tracing::warn!(error = %failure, "Rejected undecodable transaction");
				return rejected(&failure);
			},
		};
		tracing::debug!(decoded = ?tx, "Decoded transaction");

		let sender = sender_of(&tx);
		if let Some(sender) = &sender {
			tracing::Span::current().record("sender", sender.as_str());
		}

		let outcome = match self.process(raw_transaction, &tx).await {
			Ok(submission) => {
				tracing::info!(
					tx_hash = submission.tx_hash.as_deref().unwrap_or_default(),
					nonce_consistent = submission.nonce_consistent,
					status = %TransactionStatus::Sent,
					"Transaction sponsored"
				);
				RelayOutcome {
					schema_valid: true,
					sponsored: true,
					status: TransactionStatus::Sent,
					nonce_consistent: Some(submission.nonce_consistent),
					error: None,
				}
			},
			Err(failure) => {
				tracing::info!(status = %failure.status(), reason = %failure, "Transaction not sponsored");
				rejected(&failure)
			},
		};

		match sender {
			Some(sender) => {
				self.recorder
					.record(
						&sender,
						raw_transaction,
						outcome.status,
						outcome.error.as_deref(),
					)
					.await;
				self.throttler.record_attempt(&sender, outcome.status).await;
			},
			None => tracing::info!("Sender unknown, outcome not recorded"),
		}

		outcome
	}

	async fn process(
		&self,
		raw_transaction: &str,
		tx: &DecodedTransaction,
	) -> Result<SubmissionOutcome, RelayError> {
		decoder::validate(tx)?;
		let raw = decoder::raw_bytes(raw_transaction)?;

		match self.simulator.evaluate(&raw).await {
			EligibilityVerdict::Eligible => {},
			EligibilityVerdict::Ineligible(reason) => return Err(RelayError::Ineligible(reason)),
			EligibilityVerdict::InfrastructureError(detail) => {
				return Err(RelayError::SimulationInfrastructure(detail))
			},
		}

		let sender = sender_of(tx).unwrap_or_default();
		let submission = self.submission.submit(&raw, &sender).await;
		if submission.is_confirmed() {
			return Ok(submission);
		}
		Err(RelayError::Submission {
			detail: submission
				.error
				.unwrap_or_else(|| "Sponsor transaction was not submitted".to_string()),
			possibly_applied: submission.possibly_applied,
		})
	}

	/// Native balance of `address`, formatted in ether.
	#[instrument(skip(self))]
	pub async fn balance_of(&self, address: &str) -> Result<String, QueryError> {
		let address = parse_query_address(address)?;
		let balance = tokio::time::timeout(
			self.settings.request_timeout,
			self.ledger.native_balance(address),
		)
		.await
		.map_err(|_| QueryError::Ledger("Balance read timed out".to_string()))?
		.map_err(|e| QueryError::Ledger(e.to_string()))?;
		Ok(format_ether(balance))
	}

	/// Recorded attempts of `address`, newest first.
	///
	/// `before == 0` means now. `limit` defaults to, and is capped by, the
	/// configured maximum page size.
	#[instrument(skip(self))]
	pub async fn history(
		&self,
		address: &str,
		status_filter: &str,
		before: u64,
		limit: Option<usize>,
	) -> Result<Vec<HistoryEntry>, QueryError> {
		let sender = format!("{:#x}", parse_query_address(address)?);
		let statuses =
			TransactionStatus::parse_filter(status_filter).map_err(QueryError::InvalidFilter)?;
		let max = self.settings.max_history_limit;
		let query = HistoryQuery {
			statuses,
			before: if before == 0 {
				current_timestamp_millis()
			} else {
				before
			},
			limit: limit.map_or(max, |limit| limit.min(max)),
		};

		let records = tokio::time::timeout(
			self.settings.request_timeout,
			self.storage.query_records(&sender, &query),
		)
		.await
		.map_err(|_| QueryError::Storage("History read timed out".to_string()))?
		.map_err(|e| QueryError::Storage(e.to_string()))?;

		let entries = records
			.into_iter()
			.filter_map(|record| match decoder::decode(&record.raw_transaction) {
				Ok(tx) => Some(HistoryEntry {
					tx,
					status: record.status,
					error: record.error,
					created_at: record.created_at,
				}),
				Err(e) => {
					tracing::warn!(error = %e, "Skipping undecodable stored transaction");
					None
				},
			})
			.collect();
		Ok(entries)
	}
}

fn parse_query_address(address: &str) -> Result<Address, QueryError> {
	let trimmed = address.trim();
	if !trimmed.starts_with("0x") {
		return Err(QueryError::InvalidAddress(address.to_string()));
	}
	Address::from_str(trimmed).map_err(|_| QueryError::InvalidAddress(address.to_string()))
}

fn rejected(failure: &RelayError) -> RelayOutcome {
	RelayOutcome {
		schema_valid: failure.schema_valid(),
		sponsored: false,
		status: failure.status(),
		nonce_consistent: None,
		error: Some(failure.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::alerts::NoopThrottler;
	use crate::recorder::{NoopRecorder, StorageRecorder};
	use crate::submission::POSSIBLY_APPLIED_WARNING;
	use crate::testing::{
		dead_address, sign_eip1559, sign_legacy, signer, FakeLedger, ASSET, SPONSOR,
	};
	use alloy_primitives::U256;
	use alloy_sol_types::SolEvent;
	use relay_ledger::SendFailure;
	use relay_storage::implementations::memory::MemoryStorage;
	use serde_json::json;
	use std::sync::atomic::Ordering;

	fn settings() -> EngineSettings {
		EngineSettings {
			sponsor: SPONSOR,
			asset: ASSET,
			access_list: AccessList::default(),
			min_confirmations: 1,
			request_timeout: Duration::from_secs(5),
			confirmation_timeout: Duration::from_secs(5),
			submission_queue_timeout: Duration::from_secs(5),
			max_history_limit: 3,
		}
	}

	fn engine(ledger: &Arc<FakeLedger>) -> (Arc<RelayEngine>, Arc<StorageService>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let engine = RelayEngine::new(
			settings(),
			storage.clone(),
			ledger.service(),
			Arc::new(StorageRecorder::new(storage.clone(), Duration::from_secs(1))),
			Arc::new(NoopThrottler),
		);
		(Arc::new(engine), storage)
	}

	fn sender() -> String {
		format!("{:#x}", signer().address())
	}

	fn transfer_payload(amount: u64) -> String {
		json!({
			"err": null,
			"logs": [{
				"address": format!("{:#x}", ASSET),
				"topics": [
					crate::simulator::Transfer::SIGNATURE_HASH,
					B256::left_padding_from(&[0xaa; 20]),
					B256::left_padding_from(&[0xbb; 20]),
				],
				"data": format!("0x{:064x}", amount),
			}],
		})
		.to_string()
	}

	async fn all_history(engine: &RelayEngine) -> Vec<HistoryEntry> {
		engine.history(&sender(), "", u64::MAX, None).await.unwrap()
	}

	#[tokio::test]
	async fn test_clean_transfer_is_sent_and_recorded() {
		let ledger = FakeLedger::new();
		let (engine, _) = engine(&ledger);
		let raw = sign_legacy(&signer(), 5, Some(43114), Some(dead_address()));

		let outcome = engine.relay(&raw).await;
		assert!(outcome.schema_valid);
		assert!(outcome.sponsored);
		assert_eq!(outcome.status, TransactionStatus::Sent);
		assert_eq!(outcome.nonce_consistent, Some(true));
		assert_eq!(ledger.send_count(), 1);

		let history = all_history(&engine).await;
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].status, TransactionStatus::Sent);
		assert_eq!(history[0].error, None);
		assert_eq!(history[0].tx.nonce, 5);
		assert_eq!(history[0].tx, decoder::decode(&raw).unwrap());
	}

	#[tokio::test]
	async fn test_declined_simulation_is_discarded() {
		let ledger = FakeLedger::new();
		ledger.revert_with(r#"{"err":true}"#);
		let (engine, _) = engine(&ledger);

		let outcome = engine
			.relay(&sign_legacy(&signer(), 1, Some(1), Some(dead_address())))
			.await;
		assert!(outcome.schema_valid);
		assert!(!outcome.sponsored);
		assert_eq!(outcome.status, TransactionStatus::Discarded);
		assert_eq!(ledger.send_count(), 0);

		let history = all_history(&engine).await;
		assert_eq!(history[0].status, TransactionStatus::Discarded);
		assert_eq!(history[0].error.as_deref(), Some(r#"{"err":true}"#));
	}

	#[tokio::test]
	async fn test_missing_transfer_log_is_discarded() {
		let ledger = FakeLedger::new();
		ledger.revert_with(&transfer_payload(0));
		let (engine, _) = engine(&ledger);

		let outcome = engine.relay(&sign_eip1559(&signer(), 2, 1)).await;
		assert_eq!(outcome.status, TransactionStatus::Discarded);
		assert_eq!(ledger.send_count(), 0);
	}

	#[tokio::test]
	async fn test_qualifying_transfer_in_revert_is_submitted() {
		let ledger = FakeLedger::new();
		ledger.revert_with(&transfer_payload(10));
		let (engine, _) = engine(&ledger);

		let outcome = engine.relay(&sign_eip1559(&signer(), 2, 1)).await;
		assert!(outcome.sponsored);
		assert_eq!(ledger.send_count(), 1);
	}

	#[tokio::test]
	async fn test_unparseable_revert_is_error() {
		let ledger = FakeLedger::new();
		ledger.revert_with("out of gas");
		let (engine, _) = engine(&ledger);

		let outcome = engine
			.relay(&sign_legacy(&signer(), 1, Some(1), Some(dead_address())))
			.await;
		assert!(outcome.schema_valid);
		assert!(!outcome.sponsored);
		assert_eq!(outcome.status, TransactionStatus::Error);
		assert!(outcome.error.unwrap().contains("out of gas"));
		assert_eq!(ledger.send_count(), 0);
		assert_eq!(all_history(&engine).await[0].status, TransactionStatus::Error);
	}

	#[tokio::test]
	async fn test_schema_failure_never_simulates() {
		let ledger = FakeLedger::new();
		let (engine, _) = engine(&ledger);

		let outcome = engine
			.relay(&sign_legacy(&signer(), 0, Some(1), None))
			.await;
		assert!(!outcome.schema_valid);
		assert!(!outcome.sponsored);
		assert_eq!(outcome.error.as_deref(), Some("to is invalid."));
		assert_eq!(ledger.simulations.load(Ordering::SeqCst), 0);
		assert_eq!(ledger.send_count(), 0);

		// sender is known, so the failure is still on record
		assert_eq!(all_history(&engine).await[0].status, TransactionStatus::Error);
	}

	#[tokio::test]
	async fn test_undecodable_input_is_not_recorded() {
		let ledger = FakeLedger::new();
		let (engine, storage) = engine(&ledger);

		let outcome = engine.relay("0xnothex").await;
		assert!(!outcome.schema_valid);
		assert!(!outcome.sponsored);
		assert_eq!(outcome.status, TransactionStatus::Error);
		assert_eq!(ledger.simulations.load(Ordering::SeqCst), 0);
		assert!(all_history(&engine).await.is_empty());
		assert_eq!(storage.get_counter(&sender()).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_inconsistent_nonce_still_sponsored() {
		let ledger = FakeLedger::new();
		ledger.nonce_step.store(2, Ordering::SeqCst);
		let (engine, _) = engine(&ledger);

		let outcome = engine
			.relay(&sign_legacy(&signer(), 1, Some(1), Some(dead_address())))
			.await;
		assert!(outcome.sponsored);
		assert_eq!(outcome.nonce_consistent, Some(false));
		assert_eq!(outcome.status, TransactionStatus::Sent);
	}

	#[tokio::test]
	async fn test_unconfirmed_submission_warns_of_application() {
		let ledger = FakeLedger::new();
		*ledger.send_failure.lock().unwrap() = Some(SendFailure::Unconfirmed {
			hash: None,
			detail: "timed out".into(),
		});
		let (engine, _) = engine(&ledger);

		let outcome = engine
			.relay(&sign_legacy(&signer(), 1, Some(1), Some(dead_address())))
			.await;
		assert!(!outcome.sponsored);
		assert_eq!(outcome.status, TransactionStatus::Error);
		assert!(outcome.error.unwrap().contains(POSSIBLY_APPLIED_WARNING));
	}

	#[tokio::test]
	async fn test_repeated_submission_records_twice() {
		let ledger = FakeLedger::new();
		let (engine, _) = engine(&ledger);
		let raw = sign_legacy(&signer(), 1, Some(1), Some(dead_address()));

		engine.relay(&raw).await;
		engine.relay(&raw).await;
		assert_eq!(all_history(&engine).await.len(), 2);
	}

	#[tokio::test]
	async fn test_concurrent_relays_serialize_submissions() {
		let ledger = FakeLedger::new();
		*ledger.send_delay.lock().unwrap() = Duration::from_millis(10);
		let engine = Arc::new(RelayEngine::new(
			settings(),
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			ledger.service(),
			Arc::new(NoopRecorder),
			Arc::new(NoopThrottler),
		));

		let mut handles = Vec::new();
		for nonce in 0..5 {
			let engine = engine.clone();
			handles.push(tokio::spawn(async move {
				let raw = sign_legacy(&signer(), nonce, Some(1), Some(dead_address()));
				engine.relay(&raw).await
			}));
		}
		for handle in handles {
			let outcome = handle.await.unwrap();
			assert!(outcome.sponsored);
			assert_eq!(outcome.nonce_consistent, Some(true));
		}
		assert!(!ledger.overlapped.load(Ordering::SeqCst));
		assert_eq!(ledger.send_count(), 5);
	}

	#[tokio::test]
	async fn test_history_filters_and_pages() {
		let ledger = FakeLedger::new();
		let (engine, _) = engine(&ledger);
		for nonce in 0..4 {
			engine
				.relay(&sign_legacy(&signer(), nonce, Some(1), Some(dead_address())))
				.await;
			tokio::time::sleep(Duration::from_millis(2)).await;
		}
		ledger.revert_with(r#"{"err":"declined"}"#);
		engine
			.relay(&sign_legacy(&signer(), 9, Some(1), Some(dead_address())))
			.await;
		tokio::time::sleep(Duration::from_millis(2)).await;

		// default and oversized limits are capped at the configured maximum
		let page = engine.history(&sender(), "", 0, None).await.unwrap();
		assert_eq!(page.len(), 3);
		assert_eq!(page[0].tx.nonce, 9);
		let page = engine.history(&sender(), "", 0, Some(50)).await.unwrap();
		assert_eq!(page.len(), 3);

		let sent = engine.history(&sender(), "sent", 0, Some(2)).await.unwrap();
		let nonces: Vec<u64> = sent.iter().map(|entry| entry.tx.nonce).collect();
		assert_eq!(nonces, vec![3, 2]);

		let discarded = engine
			.history(&sender(), "DISCARDED", 0, None)
			.await
			.unwrap();
		assert_eq!(discarded.len(), 1);

		let older = engine
			.history(&sender(), "SENT", discarded[0].created_at, None)
			.await
			.unwrap();
		assert!(older.iter().all(|e| e.created_at < discarded[0].created_at));
	}

	#[tokio::test]
	async fn test_history_rejects_bad_input() {
		let ledger = FakeLedger::new();
		let (engine, _) = engine(&ledger);

		assert!(matches!(
			engine.history(&sender(), "SENT,PENDING", 0, None).await,
			Err(QueryError::InvalidFilter(_))
		));
		assert!(matches!(
			engine.history("not-an-address", "", 0, None).await,
			Err(QueryError::InvalidAddress(_))
		));
	}

	#[tokio::test]
	async fn test_history_lookup_ignores_address_case() {
		let ledger = FakeLedger::new();
		let (engine, _) = engine(&ledger);
		engine
			.relay(&sign_legacy(&signer(), 1, Some(1), Some(dead_address())))
			.await;

		let checksummed = signer().address().to_checksum(None);
		let history = engine
			.history(&checksummed, "", u64::MAX, None)
			.await
			.unwrap();
		assert_eq!(history.len(), 1);
	}

	#[tokio::test]
	async fn test_balance_is_formatted_in_ether() {
		let ledger = FakeLedger::new();
		ledger.set_balance(U256::from(1_500_000_000_000_000_000u128));
		let (engine, _) = engine(&ledger);

		let balance = engine.balance_of(&sender()).await.unwrap();
		assert!(balance.starts_with("1.5"));
		assert!(matches!(
			engine.balance_of("0x1234").await,
			Err(QueryError::InvalidAddress(_))
		));
	}
}
