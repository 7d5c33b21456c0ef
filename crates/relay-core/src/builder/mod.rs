//! Builder pattern for constructing relay engines.
//!
//! Composes a [`RelayEngine`] from the configured storage, account, ledger
//! and notifier implementations using factory functions keyed by name.

use crate::alerts::{AlertThrottler, BalanceAlertThrottler, NoopThrottler};
use crate::engine::{EngineSettings, RelayEngine};
use crate::recorder::StorageRecorder;
use alloy_primitives::utils::parse_ether;
use relay_account::{AccountError, AccountInterface, AccountService};
use relay_config::Config;
use relay_ledger::{LedgerError, LedgerInterface, LedgerService};
use relay_notify::{NotificationError, NotifierInterface, NotifierService};
use relay_storage::{StorageError, StorageInterface, StorageService};
use relay_types::SecretString;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during relay engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct RelayFactories<SF, AF, LF, NF> {
	pub storage_factories: HashMap<String, SF>,
	pub account_factories: HashMap<String, AF>,
	pub ledger_factories: HashMap<String, LF>,
	pub notifier_factories: HashMap<String, NF>,
}

/// Instantiates the primary implementation of one component.
///
/// Every configured implementation with a known factory is created so that
/// configuration mistakes surface at startup, not only for the primary.
fn load_primary<T, E: Display>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	mut create: impl FnMut(&str, &toml::Value) -> Option<Result<T, E>>,
) -> Result<T, BuilderError> {
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		match create(name, config) {
			Some(Ok(implementation)) => {
				let is_primary = name == primary;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Some(Err(e)) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
			None => tracing::warn!(component, implementation = %name, "Unknown implementation"),
		}
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"Primary {} '{}' failed to load or has no factory",
			component, primary
		))
	})
}

/// Builder for constructing a [`RelayEngine`] with pluggable implementations.
pub struct RelayBuilder {
	config: Config,
}

impl RelayBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub async fn build<SF, AF, LF, NF>(
		self,
		factories: RelayFactories<SF, AF, LF, NF>,
	) -> Result<RelayEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
		LF: Fn(&toml::Value, &SecretString) -> Result<Box<dyn LedgerInterface>, LedgerError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotificationError>,
	{
		let config = &self.config;
		let settings =
			EngineSettings::from_config(config).map_err(|e| BuilderError::Config(e.to_string()))?;

		let storage = load_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			|name, table| factories.storage_factories.get(name).map(|f| f(table)),
		)?;
		let storage = Arc::new(StorageService::new(storage));

		let account = load_primary(
			"account",
			&config.account.primary,
			&config.account.implementations,
			|name, table| factories.account_factories.get(name).map(|f| f(table)),
		)?;
		let account = AccountService::new(account);
		let relayer = account.get_address().await.map_err(|e| {
			tracing::error!(component = "account", error = %e, "Failed to get relayer address");
			BuilderError::Config(format!("Failed to get relayer address: {}", e))
		})?;

		let private_key = account.get_private_key();
		let ledger = load_primary(
			"ledger",
			&config.ledger.primary,
			&config.ledger.implementations,
			|name, table| {
				factories
					.ledger_factories
					.get(name)
					.map(|f| f(table, &private_key))
			},
		)?;
		let ledger = Arc::new(LedgerService::new(ledger));
		if ledger.relayer_address() != relayer {
			return Err(BuilderError::Config(format!(
				"Ledger signs as {} but the account is {}",
				ledger.relayer_address(),
				relayer
			)));
		}

		let throttler: Arc<dyn AlertThrottler> = match &config.alerts {
			Some(alerts) if alerts.enabled => {
				let notifier = load_primary(
					"notifier",
					&alerts.primary,
					&alerts.implementations,
					|name, table| factories.notifier_factories.get(name).map(|f| f(table)),
				)?;
				let min_balance = parse_ether(&alerts.min_balance).map_err(|e| {
					BuilderError::Config(format!(
						"Invalid min_balance '{}': {}",
						alerts.min_balance, e
					))
				})?;
				Arc::new(
					BalanceAlertThrottler::new(
						storage.clone(),
						ledger.clone(),
						Arc::new(NotifierService::new(notifier)),
						alerts.sampling_interval,
						min_balance,
						settings.request_timeout,
					)
					.with_count_only_sponsored(alerts.count_only_sponsored),
				)
			},
			_ => {
				tracing::info!(component = "alerts", "Balance alerts disabled");
				Arc::new(NoopThrottler)
			},
		};

		let recorder = Arc::new(StorageRecorder::new(
			storage.clone(),
			settings.request_timeout,
		));

		tracing::info!(
			relayer_id = %config.relayer.id,
			relayer = %relayer,
			sponsor = %settings.sponsor,
			asset = %settings.asset,
			"Relay engine ready"
		);
		Ok(RelayEngine::new(settings, storage, ledger, recorder, throttler))
	}
}
