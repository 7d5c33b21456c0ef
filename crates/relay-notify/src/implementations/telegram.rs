//! Telegram Bot API notifier.
//!
//! Posts alerts to a chat with `sendMessage`.

use crate::{format_alert, NotificationError, NotifierInterface};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Serialize)]
struct SendMessage<'a> {
	chat_id: &'a str,
	text: String,
}

#[derive(Deserialize)]
struct BotResponse {
	ok: bool,
	#[serde(default)]
	description: Option<String>,
}

/// Sends alerts through a Telegram bot.
pub struct TelegramNotifier {
	http: reqwest::Client,
	api_url: String,
	bot_token: SecretString,
	chat_id: String,
}

impl TelegramNotifier {
	pub fn new(
		api_url: String,
		bot_token: SecretString,
		chat_id: String,
		timeout: Duration,
	) -> Result<Self, NotificationError> {
		let http = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
		Ok(Self {
			http,
			api_url: api_url.trim_end_matches('/').to_string(),
			bot_token,
			chat_id,
		})
	}

	fn endpoint(&self) -> String {
		self.bot_token
			.with_exposed(|token| format!("{}/bot{}/sendMessage", self.api_url, token))
	}
}

#[async_trait]
impl NotifierInterface for TelegramNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TelegramNotifierSchema)
	}

	async fn send(&self, address: &str, balance: &str) -> Result<(), NotificationError> {
		let body = SendMessage {
			chat_id: &self.chat_id,
			text: format_alert(address, balance),
		};

		// reqwest errors can carry the URL, which embeds the token
		let response = self
			.http
			.post(self.endpoint())
			.json(&body)
			.send()
			.await
			.map_err(|e| NotificationError::Transport(e.without_url().to_string()))?;

		let status = response.status();
		let reply: BotResponse = response
			.json()
			.await
			.map_err(|e| NotificationError::Transport(e.without_url().to_string()))?;

		if !status.is_success() || !reply.ok {
			return Err(NotificationError::Rejected(
				reply
					.description
					.unwrap_or_else(|| format!("HTTP {}", status)),
			));
		}

		tracing::debug!(chat_id = %self.chat_id, "Delivered Telegram alert");
		Ok(())
	}
}

/// Configuration schema for the Telegram notifier.
pub struct TelegramNotifierSchema;

fn non_empty(name: &'static str) -> impl Fn(&toml::Value) -> Result<(), String> {
	move |value| match value.as_str() {
		Some(s) if !s.trim().is_empty() => Ok(()),
		_ => Err(format!("{} cannot be empty", name)),
	}
}

impl ConfigSchema for TelegramNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("bot_token", FieldType::String).with_validator(non_empty("bot_token")),
				Field::new("chat_id", FieldType::String).with_validator(non_empty("chat_id")),
			],
			vec![
				Field::new("api_url", FieldType::String).with_validator(non_empty("api_url")),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(60),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory for `[alerts.implementations.telegram]`.
///
/// Configuration parameters:
/// - `bot_token`, `chat_id`: required
/// - `api_url`: Bot API base URL (default: "https://api.telegram.org")
/// - `timeout_seconds`: per-request timeout (default: 10)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotifierInterface>, NotificationError> {
	TelegramNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;

	let get_str = |key: &str| config.get(key).and_then(|v| v.as_str());
	let bot_token = get_str("bot_token")
		.ok_or_else(|| NotificationError::InvalidConfig("bot_token is required".into()))?;
	let chat_id = get_str("chat_id")
		.ok_or_else(|| NotificationError::InvalidConfig("chat_id is required".into()))?;
	let api_url = get_str("api_url").unwrap_or(DEFAULT_API_URL);
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|s| s as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(TelegramNotifier::new(
		api_url.to_string(),
		SecretString::from(bot_token),
		chat_id.to_string(),
		Duration::from_secs(timeout),
	)?))
}

/// Registry for the Telegram notifier.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "telegram";
	type Factory = crate::NotifierFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotifierRegistry for Registry {}
