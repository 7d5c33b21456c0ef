//! Local key account.
//!
//! Holds the relayer key in process memory. Suitable for a single hot wallet
//! whose key is supplied through the environment.

use crate::{AccountError, AccountInterface};
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError};

/// Account backed by an in-memory private key.
pub struct LocalAccount {
	signer: PrivateKeySigner,
	private_key: SecretString,
}

impl LocalAccount {
	/// Parses a hex private key, with or without `0x`.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer: PrivateKeySigner = private_key.with_exposed(|key| {
			key.trim_start_matches("0x")
				.parse()
				.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
		})?;
		let normalized = private_key.with_exposed(|key| {
			SecretString::from(format!("0x{}", key.trim_start_matches("0x")))
		});

		Ok(Self {
			signer,
			private_key: normalized,
		})
	}
}

/// Configuration schema for the local account.
pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default().trim_start_matches("0x");
					if key.len() != 64 {
						return Err("Private key must be 64 hex characters".to_string());
					}
					if !key.chars().all(|c| c.is_ascii_hexdigit()) {
						return Err("Private key must contain only hex characters".to_string());
					}
					Ok(())
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	fn get_private_key(&self) -> SecretString {
		self.private_key.clone()
	}
}

/// Factory for `[account.implementations.local]`.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidConfig(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidConfig("private_key is required".to_string()))?;

	let account = LocalAccount::new(&SecretString::from(private_key))?;
	tracing::debug!(address = %account.signer.address(), "Loaded local relayer key");
	Ok(Box::new(account))
}

/// Registry for the local account implementation.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}
