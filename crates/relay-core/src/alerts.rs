//! Low-balance alerting for the relayer's fee account.
//!
//! Every processed transaction bumps a per-sender counter. On every
//! `sampling_interval`-th attempt the relayer balance is read and, when at or
//! below the threshold, one notification goes out.

use alloy_primitives::utils::format_ether;
use alloy_primitives::U256;
use async_trait::async_trait;
use relay_ledger::LedgerService;
use relay_notify::NotifierService;
use relay_storage::StorageService;
use relay_types::TransactionStatus;
use std::sync::Arc;
use std::time::Duration;

/// Observer of processed relay attempts.
#[async_trait]
pub trait AlertThrottler: Send + Sync {
	async fn record_attempt(&self, sender: &str, status: TransactionStatus);
}

/// Samples the relayer balance on a per-sender cadence.
pub struct BalanceAlertThrottler {
	storage: Arc<StorageService>,
	ledger: Arc<LedgerService>,
	notifier: Arc<NotifierService>,
	sampling_interval: u64,
	min_balance: U256,
	count_only_sponsored: bool,
	timeout: Duration,
}

impl BalanceAlertThrottler {
	pub fn new(
		storage: Arc<StorageService>,
		ledger: Arc<LedgerService>,
		notifier: Arc<NotifierService>,
		sampling_interval: u64,
		min_balance: U256,
		timeout: Duration,
	) -> Self {
		Self {
			storage,
			ledger,
			notifier,
			sampling_interval: sampling_interval.max(1),
			min_balance,
			count_only_sponsored: false,
			timeout,
		}
	}

	/// Counts only `SENT` outcomes towards the sampling cadence.
	pub fn with_count_only_sponsored(mut self, enabled: bool) -> Self {
		self.count_only_sponsored = enabled;
		self
	}

	async fn check_balance(&self, sender: &str, count: u64) {
		let relayer = self.ledger.relayer_address();
		let balance =
			match tokio::time::timeout(self.timeout, self.ledger.native_balance(relayer)).await {
				Ok(Ok(balance)) => balance,
				Ok(Err(e)) => {
					tracing::warn!(error = %e, "Failed to read relayer balance for alerting");
					return;
				},
				Err(_) => {
					tracing::warn!("Timed out reading relayer balance for alerting");
					return;
				},
			};

		if balance > self.min_balance {
			tracing::debug!(sender = %sender, count, "Relayer balance above alert threshold");
			return;
		}

		let address = relayer.to_checksum(None);
		let formatted = format_ether(balance);
		tracing::warn!(relayer = %address, balance = %formatted, "Relayer balance is low");

		let sent = tokio::time::timeout(
			self.timeout,
			self.notifier.notify_low_balance(&address, &formatted),
		)
		.await;
		match sent {
			Ok(Ok(())) => tracing::info!(relayer = %address, "Sent low balance alert"),
			Ok(Err(e)) => tracing::warn!(error = %e, "Failed to send low balance alert"),
			Err(_) => tracing::warn!("Timed out sending low balance alert"),
		}
	}
}

#[async_trait]
impl AlertThrottler for BalanceAlertThrottler {
	async fn record_attempt(&self, sender: &str, status: TransactionStatus) {
		if self.count_only_sponsored && status != TransactionStatus::Sent {
			return;
		}

		let count =
			match tokio::time::timeout(self.timeout, self.storage.increment_counter(sender)).await {
				Ok(Ok(count)) => count,
				Ok(Err(e)) => {
					tracing::warn!(sender = %sender, error = %e, "Failed to update alert counter");
					return;
				},
				Err(_) => {
					tracing::warn!(sender = %sender, "Timed out updating alert counter");
					return;
				},
			};

		if count % self.sampling_interval == 0 {
			self.check_balance(sender, count).await;
		}
	}
}

/// Throttler that ignores every attempt.
pub struct NoopThrottler;

#[async_trait]
impl AlertThrottler for NoopThrottler {
	async fn record_attempt(&self, _: &str, _: TransactionStatus) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{FakeLedger, RELAYER};
	use alloy_primitives::utils::parse_ether;
	use mockall::mock;
	use relay_notify::{NotificationError, NotifierInterface};
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_types::ConfigSchema;
	use std::sync::atomic::Ordering;

	mock! {
		Notifier {}

		#[async_trait]
		impl NotifierInterface for Notifier {
			fn config_schema(&self) -> Box<dyn ConfigSchema>;
			async fn send(&self, address: &str, balance: &str) -> Result<(), NotificationError>;
		}
	}

	fn throttler(
		ledger: &Arc<FakeLedger>,
		notifier: MockNotifier,
		interval: u64,
	) -> (BalanceAlertThrottler, Arc<StorageService>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let throttler = BalanceAlertThrottler::new(
			storage.clone(),
			ledger.service(),
			Arc::new(NotifierService::new(Box::new(notifier))),
			interval,
			parse_ether("1").unwrap(),
			Duration::from_secs(1),
		);
		(throttler, storage)
	}

	#[tokio::test]
	async fn test_low_balance_alerts_once_per_interval() {
		let ledger = FakeLedger::new();
		let balance = parse_ether("0.5").unwrap();
		ledger.set_balance(balance);

		let expected_address = RELAYER.to_checksum(None);
		let expected_balance = format_ether(balance);
		let mut notifier = MockNotifier::new();
		notifier
			.expect_send()
			.withf(move |address, formatted| {
				address == expected_address && formatted == expected_balance
			})
			.times(5)
			.returning(|_, _| Ok(()));

		let (throttler, storage) = throttler(&ledger, notifier, 3);
		for _ in 0..15 {
			throttler
				.record_attempt("0xsender", TransactionStatus::Sent)
				.await;
		}

		assert_eq!(storage.get_counter("0xsender").await.unwrap(), 15);
		assert_eq!(ledger.balance_reads.load(Ordering::SeqCst), 5);
	}

	#[tokio::test]
	async fn test_threshold_is_inclusive() {
		let ledger = FakeLedger::new();
		ledger.set_balance(parse_ether("1").unwrap());

		let mut notifier = MockNotifier::new();
		notifier.expect_send().times(1).returning(|_, _| Ok(()));

		let (throttler, _) = throttler(&ledger, notifier, 1);
		throttler
			.record_attempt("0xsender", TransactionStatus::Error)
			.await;
	}

	#[tokio::test]
	async fn test_healthy_balance_never_alerts() {
		let ledger = FakeLedger::new();
		ledger.set_balance(parse_ether("2").unwrap());

		let mut notifier = MockNotifier::new();
		notifier.expect_send().never();

		let (throttler, _) = throttler(&ledger, notifier, 2);
		for _ in 0..10 {
			throttler
				.record_attempt("0xsender", TransactionStatus::Discarded)
				.await;
		}
		assert_eq!(ledger.balance_reads.load(Ordering::SeqCst), 5);
	}

	#[tokio::test]
	async fn test_counters_are_per_sender() {
		let ledger = FakeLedger::new();
		let mut notifier = MockNotifier::new();
		notifier.expect_send().never();

		let (throttler, storage) = throttler(&ledger, notifier, 2);
		throttler.record_attempt("0xa", TransactionStatus::Sent).await;
		throttler.record_attempt("0xb", TransactionStatus::Sent).await;

		assert_eq!(storage.get_counter("0xa").await.unwrap(), 1);
		assert_eq!(storage.get_counter("0xb").await.unwrap(), 1);
		assert_eq!(ledger.balance_reads.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_count_only_sponsored_skips_other_outcomes() {
		let ledger = FakeLedger::new();
		let mut notifier = MockNotifier::new();
		notifier.expect_send().times(1).returning(|_, _| Ok(()));

		let (throttler, storage) = throttler(&ledger, notifier, 2);
		let throttler = throttler.with_count_only_sponsored(true);
		for status in [
			TransactionStatus::Discarded,
			TransactionStatus::Sent,
			TransactionStatus::Error,
			TransactionStatus::Sent,
		] {
			throttler.record_attempt("0xsender", status).await;
		}
		assert_eq!(storage.get_counter("0xsender").await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_notification_failure_is_swallowed() {
		let ledger = FakeLedger::new();
		let mut notifier = MockNotifier::new();
		notifier
			.expect_send()
			.times(2)
			.returning(|_, _| Err(NotificationError::Transport("unreachable".into())));

		let (throttler, storage) = throttler(&ledger, notifier, 1);
		throttler.record_attempt("0xsender", TransactionStatus::Sent).await;
		throttler.record_attempt("0xsender", TransactionStatus::Sent).await;
		assert_eq!(storage.get_counter("0xsender").await.unwrap(), 2);
	}
}
