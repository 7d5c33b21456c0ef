//! Registry of every built-in implementation factory.
//!
//! The configuration names implementations by string; this module maps those
//! names to factories and hands the relevant subset to the engine builder.

use relay_account::AccountFactory;
use relay_config::Config;
use relay_core::{RelayBuilder, RelayEngine, RelayFactories};
use relay_ledger::LedgerFactory;
use relay_notify::NotifierFactory;
use relay_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// All known factories, by component and implementation name.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
	pub ledger: HashMap<String, LedgerFactory>,
	pub notifier: HashMap<String, NotifierFactory>,
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

fn named<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| {
			tracing::debug!(implementation = %name, "Registering implementation");
			(name.to_string(), factory)
		})
		.collect()
}

/// Returns the process-wide registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| FactoryRegistry {
		storage: named(relay_storage::get_all_implementations()),
		account: named(relay_account::get_all_implementations()),
		ledger: named(relay_ledger::get_all_implementations()),
		notifier: named(relay_notify::get_all_implementations()),
	})
}

/// Selects the factories for the implementations a config section names.
///
/// An unknown name is an error listing what is available.
fn select<F: Copy>(
	registry: &HashMap<String, F>,
	configured: &HashMap<String, toml::Value>,
	component: &str,
) -> Result<HashMap<String, F>, String> {
	let mut factories = HashMap::new();
	for name in configured.keys() {
		let factory = registry.get(name).ok_or_else(|| {
			let mut available: Vec<&str> = registry.keys().map(String::as_str).collect();
			available.sort_unstable();
			format!(
				"Unknown {} implementation '{}'. Available: [{}]",
				component,
				name,
				available.join(", ")
			)
		})?;
		factories.insert(name.clone(), *factory);
	}
	Ok(factories)
}

/// Builds the relay engine for `config` from the built-in implementations.
pub async fn build_relay_from_config(
	config: Config,
) -> Result<RelayEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let empty = HashMap::new();
	let notifier_impls = config
		.alerts
		.as_ref()
		.filter(|alerts| alerts.enabled)
		.map_or(&empty, |alerts| &alerts.implementations);

	let factories = RelayFactories {
		storage_factories: select(&registry.storage, &config.storage.implementations, "storage")?,
		account_factories: select(&registry.account, &config.account.implementations, "account")?,
		ledger_factories: select(&registry.ledger, &config.ledger.implementations, "ledger")?,
		notifier_factories: select(&registry.notifier, notifier_impls, "notifier")?,
	};

	Ok(RelayBuilder::new(config).build(factories).await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_lists_builtin_implementations() {
		let registry = get_registry();
		assert!(registry.storage.contains_key("memory"));
		assert!(registry.storage.contains_key("file"));
		assert!(registry.account.contains_key("local"));
		assert!(registry.ledger.contains_key("evm_alloy"));
		assert!(registry.notifier.contains_key("telegram"));
		assert!(registry.notifier.contains_key("log"));
	}

	#[test]
	fn test_unknown_implementation_lists_alternatives() {
		let configured = HashMap::from([("redis".to_string(), toml::Value::Table(Default::default()))]);
		let err = select(&get_registry().storage, &configured, "storage").unwrap_err();
		assert_eq!(
			err,
			"Unknown storage implementation 'redis'. Available: [file, memory]"
		);
	}

	#[tokio::test]
	async fn test_builds_engine_against_local_node_config() {
		let dir = tempfile::tempdir().unwrap();
		let config: Config = format!(
			r#"
[relayer]
id = "registry-test"

[contracts]
sponsor = "0x1111111111111111111111111111111111111111"
asset = "0x2222222222222222222222222222222222222222"

[ledger]
primary = "evm_alloy"
[ledger.implementations.evm_alloy]
rpc_url = "http://127.0.0.1:8545"

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"
"#,
			dir.path().display()
		)
		.parse()
		.unwrap();

		// construction never dials the node
		let engine = build_relay_from_config(config).await.unwrap();
		assert_eq!(
			engine.relayer_address().to_checksum(None),
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
		);
	}
}
