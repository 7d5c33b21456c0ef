//! Outbound notification channel.
//!
//! Used by the balance alert throttler to report a low relayer balance. A
//! notification is fire-and-forget from the pipeline's point of view: the
//! caller logs failures and moves on.

use async_trait::async_trait;
use relay_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

pub mod implementations {
	pub mod log;
	pub mod telegram;
}

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
	/// The channel could not be reached.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The channel answered with an error.
	#[error("Rejected by channel: {0}")]
	Rejected(String),
	/// The implementation's configuration was rejected.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Interface of a notification channel.
#[async_trait]
pub trait NotifierInterface: Send + Sync {
	/// Returns the configuration schema for this notifier implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Reports that `address` holds `balance` (formatted in ether).
	async fn send(&self, address: &str, balance: &str) -> Result<(), NotificationError>;
}

/// Type alias for notifier factory functions.
pub type NotifierFactory =
	fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotificationError>;

/// Registry trait for notifier implementations.
pub trait NotifierRegistry: ImplementationRegistry<Factory = NotifierFactory> {}

/// Returns every built-in notifier implementation as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, NotifierFactory)> {
	use implementations::{log, telegram};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(telegram::Registry::NAME, telegram::Registry::factory()),
	]
}

/// Text of a low-balance alert.
pub fn format_alert(address: &str, balance: &str) -> String {
	format!(
		"Low relayer balance\nAddress: {}\nBalance: {}",
		address, balance
	)
}

/// Service wrapping the configured notifier.
pub struct NotifierService {
	implementation: Box<dyn NotifierInterface>,
}

impl NotifierService {
	pub fn new(implementation: Box<dyn NotifierInterface>) -> Self {
		Self { implementation }
	}

	/// Delivers one low-balance alert.
	pub async fn notify_low_balance(
		&self,
		address: &str,
		balance: &str,
	) -> Result<(), NotificationError> {
		self.implementation.send(address, balance).await
	}
}
