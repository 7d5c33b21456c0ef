//! Fluent construction of [`Config`] values for tests and local runs.
//!
//! The built configuration points at an in-memory store and a local signer.
//! Ledger and account tables are empty unless set explicitly.

use crate::{
	AccountConfig, AlertConfig, ApiConfig, Config, ContractsConfig, LedgerConfig, RelayerConfig,
	StorageConfig,
};
use relay_types::AccessListEntry;
use std::collections::HashMap;

/// Builder for creating `Config` instances with test defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	relayer_id: String,
	request_timeout_seconds: u64,
	confirmation_timeout_seconds: u64,
	submission_queue_timeout_seconds: u64,
	min_confirmations: u64,
	max_history_limit: usize,
	sponsor: String,
	asset: String,
	ledger_primary: String,
	ledger_implementations: HashMap<String, toml::Value>,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	account_primary: String,
	account_implementations: HashMap<String, toml::Value>,
	alerts: Option<AlertConfig>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			relayer_id: "test-relay".to_string(),
			request_timeout_seconds: 5,
			confirmation_timeout_seconds: 30,
			submission_queue_timeout_seconds: 10,
			min_confirmations: 1,
			max_history_limit: 100,
			sponsor: "0x1111111111111111111111111111111111111111".to_string(),
			asset: "0x2222222222222222222222222222222222222222".to_string(),
			ledger_primary: "evm_alloy".to_string(),
			ledger_implementations: HashMap::new(),
			storage_primary: "memory".to_string(),
			storage_implementations: HashMap::from([(
				"memory".to_string(),
				toml::Value::Table(toml::map::Map::new()),
			)]),
			account_primary: "local".to_string(),
			account_implementations: HashMap::new(),
			alerts: None,
			api: None,
		}
	}

	pub fn relayer_id(mut self, id: impl Into<String>) -> Self {
		self.relayer_id = id.into();
		self
	}

	pub fn request_timeout_seconds(mut self, seconds: u64) -> Self {
		self.request_timeout_seconds = seconds;
		self
	}

	pub fn confirmation_timeout_seconds(mut self, seconds: u64) -> Self {
		self.confirmation_timeout_seconds = seconds;
		self
	}

	pub fn submission_queue_timeout_seconds(mut self, seconds: u64) -> Self {
		self.submission_queue_timeout_seconds = seconds;
		self
	}

	/// Sets the confirmations awaited after each sponsor call.
	pub fn min_confirmations(mut self, confirmations: u64) -> Self {
		self.min_confirmations = confirmations;
		self
	}

	pub fn max_history_limit(mut self, limit: usize) -> Self {
		self.max_history_limit = limit;
		self
	}

	/// Sets the sponsor entry point and designated asset addresses.
	pub fn contracts(mut self, sponsor: impl Into<String>, asset: impl Into<String>) -> Self {
		self.sponsor = sponsor.into();
		self.asset = asset.into();
		self
	}

	/// Registers a ledger implementation table and makes it primary.
	pub fn ledger(mut self, name: impl Into<String>, table: toml::Value) -> Self {
		let name = name.into();
		self.ledger_implementations.insert(name.clone(), table);
		self.ledger_primary = name;
		self
	}

	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	pub fn account_primary(mut self, primary: impl Into<String>) -> Self {
		self.account_primary = primary.into();
		self
	}

	/// Registers an account implementation table and makes it primary.
	pub fn account(mut self, name: impl Into<String>, table: toml::Value) -> Self {
		let name = name.into();
		self.account_implementations.insert(name.clone(), table);
		self.account_primary = name;
		self
	}

	/// Registers a storage implementation table and makes it primary.
	pub fn storage(mut self, name: impl Into<String>, table: toml::Value) -> Self {
		let name = name.into();
		self.storage_implementations.insert(name.clone(), table);
		self.storage_primary = name;
		self
	}

	pub fn alerts(mut self, alerts: Option<AlertConfig>) -> Self {
		self.alerts = alerts;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		Config {
			relayer: RelayerConfig {
				id: self.relayer_id,
				request_timeout_seconds: self.request_timeout_seconds,
				confirmation_timeout_seconds: self.confirmation_timeout_seconds,
				submission_queue_timeout_seconds: self.submission_queue_timeout_seconds,
				min_confirmations: self.min_confirmations,
				max_history_limit: self.max_history_limit,
			},
			contracts: ContractsConfig {
				sponsor: self.sponsor,
				asset: self.asset,
				access_list: AccessListEntry::default_hint(),
			},
			ledger: LedgerConfig {
				primary: self.ledger_primary,
				implementations: self.ledger_implementations,
			},
			account: AccountConfig {
				primary: self.account_primary,
				implementations: self.account_implementations,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
			alerts: self.alerts,
			api: self.api,
		}
	}
}
