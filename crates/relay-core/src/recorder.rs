//! Persistence of relay outcomes.
//!
//! Recording is a side channel: failures are logged and swallowed so that
//! the caller's verdict never depends on storage health.

use async_trait::async_trait;
use relay_storage::StorageService;
use relay_types::{current_timestamp_millis, TransactionRecord, TransactionStatus};
use std::sync::Arc;
use std::time::Duration;

/// Sink for the terminal outcome of each relay attempt.
#[async_trait]
pub trait OutcomeRecorder: Send + Sync {
	async fn record(
		&self,
		sender: &str,
		raw_transaction: &str,
		status: TransactionStatus,
		error: Option<&str>,
	);
}

/// Appends one [`TransactionRecord`] per attempt to storage.
pub struct StorageRecorder {
	storage: Arc<StorageService>,
	timeout: Duration,
}

impl StorageRecorder {
	pub fn new(storage: Arc<StorageService>, timeout: Duration) -> Self {
		Self { storage, timeout }
	}
}

#[async_trait]
impl OutcomeRecorder for StorageRecorder {
	async fn record(
		&self,
		sender: &str,
		raw_transaction: &str,
		status: TransactionStatus,
		error: Option<&str>,
	) {
		let record = TransactionRecord {
			sender: sender.to_lowercase(),
			raw_transaction: raw_transaction.to_string(),
			status,
			error: error.map(str::to_string),
			created_at: current_timestamp_millis(),
		};

		match tokio::time::timeout(self.timeout, self.storage.append_record(&record)).await {
			Ok(Ok(())) => {
				tracing::debug!(sender = %record.sender, status = %status, "Recorded relay outcome")
			},
			Ok(Err(e)) => tracing::warn!(
				sender = %record.sender,
				status = %status,
				error = %e,
				"Failed to record relay outcome"
			),
			Err(_) => tracing::warn!(
				sender = %record.sender,
				status = %status,
				"Timed out recording relay outcome"
			),
		}
	}
}

/// Recorder that drops every outcome.
pub struct NoopRecorder;

#[async_trait]
impl OutcomeRecorder for NoopRecorder {
	async fn record(&self, _: &str, _: &str, _: TransactionStatus, _: Option<&str>) {}
}
