//! Notifier that writes alerts to the process log.

use crate::{format_alert, NotificationError, NotifierInterface};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Schema, ValidationError};

/// Emits each alert as a `warn` event.
pub struct LogNotifier;

#[async_trait]
impl NotifierInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn send(&self, address: &str, balance: &str) -> Result<(), NotificationError> {
		tracing::warn!(address = %address, balance = %balance, "{}", format_alert(address, balance));
		Ok(())
	}
}

pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotifierInterface>, NotificationError> {
	LogNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
	Ok(Box::new(LogNotifier))
}

/// Registry for the log notifier.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = crate::NotifierFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotifierRegistry for Registry {}
