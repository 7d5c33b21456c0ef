//! Guarded on-chain submission of sponsor calls.
//!
//! The relayer has a single nonce sequence. The guard holds its lock from
//! the first nonce read until the second, so two submissions from the same
//! identity never interleave. Waiting for the lock is bounded; a submission
//! that cannot get it in time is not attempted.

use crate::simulator::sponsor_calldata;
use alloy_primitives::{Address, Bytes};
use relay_ledger::{LedgerService, SendFailure};
use relay_types::SubmissionOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Prefix of every failure that happened after the node accepted the call.
pub const POSSIBLY_APPLIED_WARNING: &str =
	"Sponsor transaction may already have been applied on-chain; do not resubmit blindly";

/// Serialized submitter for one relayer identity.
pub struct SubmissionGuard {
	ledger: Arc<LedgerService>,
	sponsor: Address,
	confirmations: u64,
	request_timeout: Duration,
	confirmation_timeout: Duration,
	queue_timeout: Duration,
	lock: Mutex<()>,
}

impl SubmissionGuard {
	pub fn new(
		ledger: Arc<LedgerService>,
		sponsor: Address,
		confirmations: u64,
		request_timeout: Duration,
		confirmation_timeout: Duration,
		queue_timeout: Duration,
	) -> Self {
		Self {
			ledger,
			sponsor,
			confirmations,
			request_timeout,
			confirmation_timeout,
			queue_timeout,
			lock: Mutex::new(()),
		}
	}

	async fn read_nonce(&self, relayer: Address) -> Result<u64, String> {
		match tokio::time::timeout(self.request_timeout, self.ledger.pending_nonce(relayer)).await
		{
			Ok(Ok(nonce)) => Ok(nonce),
			Ok(Err(e)) => Err(e.to_string()),
			Err(_) => Err(format!(
				"Nonce read timed out after {}s",
				self.request_timeout.as_secs()
			)),
		}
	}

	/// Submits `sponsor(raw_tx)` and waits for confirmation.
	///
	/// `nonce_consistent` is true only when the relayer's pending nonce moved
	/// by exactly one across the submission.
	pub async fn submit(&self, raw_tx: &Bytes, sender: &str) -> SubmissionOutcome {
		let relayer = self.ledger.relayer_address();
		let mut outcome = SubmissionOutcome {
			sender: sender.to_string(),
			attempted: false,
			nonce_consistent: false,
			tx_hash: None,
			error: None,
			possibly_applied: false,
		};

		let _guard = match tokio::time::timeout(self.queue_timeout, self.lock.lock()).await {
			Ok(guard) => guard,
			Err(_) => {
				tracing::error!(
					queue_timeout_secs = self.queue_timeout.as_secs(),
					"Timed out waiting for the relayer submission slot"
				);
				outcome.error = Some(format!(
					"Relayer busy: no submission slot within {}s",
					self.queue_timeout.as_secs()
				));
				return outcome;
			},
		};

		let before = match self.read_nonce(relayer).await {
			Ok(nonce) => nonce,
			Err(e) => {
				tracing::error!(error = %e, "Failed to read relayer nonce before submission");
				outcome.error = Some(format!("Failed to read relayer nonce: {}", e));
				return outcome;
			},
		};

		let sent = self
			.ledger
			.send_and_confirm(
				self.sponsor,
				sponsor_calldata(raw_tx),
				self.confirmations,
				self.confirmation_timeout,
			)
			.await;

		let receipt = match sent {
			Ok(receipt) => receipt,
			Err(failure @ SendFailure::Rejected(_)) => {
				tracing::error!(error = %failure, "Sponsor transaction rejected");
				outcome.error = Some(failure.to_string());
				return outcome;
			},
			Err(failure @ SendFailure::Unconfirmed { .. }) => {
				tracing::error!(error = %failure, "Sponsor transaction unconfirmed");
				outcome.attempted = true;
				outcome.possibly_applied = true;
				if let SendFailure::Unconfirmed {
					hash: Some(hash), ..
				} = &failure
				{
					outcome.tx_hash = Some(hash.clone());
				}
				outcome.error = Some(format!("{}: {}", POSSIBLY_APPLIED_WARNING, failure));
				return outcome;
			},
		};

		outcome.attempted = true;
		outcome.tx_hash = Some(receipt.tx_hash.clone());

		match self.read_nonce(relayer).await {
			Ok(after) => {
				outcome.nonce_consistent = before.checked_add(1) == Some(after);
				if !outcome.nonce_consistent {
					tracing::warn!(
						tx_hash = %receipt.tx_hash,
						nonce_before = before,
						nonce_after = after,
						"Relayer nonce did not advance by exactly one"
					);
				}
			},
			Err(e) => {
				tracing::warn!(
					tx_hash = %receipt.tx_hash,
					error = %e,
					"Failed to read relayer nonce after confirmation"
				);
			},
		}

		if !receipt.success {
			tracing::error!(
				tx_hash = %receipt.tx_hash,
				block = receipt.block_number,
				"Sponsor transaction reverted on-chain"
			);
			outcome.error = Some(format!(
				"Sponsor transaction {} reverted in block {}",
				receipt.tx_hash, receipt.block_number
			));
			return outcome;
		}

		tracing::info!(
			tx_hash = %receipt.tx_hash,
			block = receipt.block_number,
			nonce_consistent = outcome.nonce_consistent,
			"Sponsor transaction confirmed"
		);
		outcome
	}
}
