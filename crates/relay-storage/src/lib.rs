//! Storage module for the fee relay.
//!
//! Backends implement a plain key/value [`StorageInterface`]. On top of it,
//! [`StorageService`] keeps the append-only transaction log and the per-sender
//! alert counters, serializing every read-modify-write through one lock.

use async_trait::async_trait;
use relay_types::{
	ConfigSchema, HistoryQuery, ImplementationRegistry, StorageKey, TransactionRecord,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level key/value interface for storage backends.
///
/// Each call is atomic for its single key.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key. Missing keys are fine.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Returns every built-in storage implementation as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed storage over a backend: transaction log and alert counters.
///
/// Each record lives under its own key, `transactions:<sender>:<seq>`, and
/// `transactions:<sender>:count` holds the next sequence number, so an
/// append touches two small values whatever the history size.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
	/// Held across every read-modify-write.
	write_lock: Mutex<()>,
}

fn storage_key(namespace: StorageKey, id: &str) -> String {
	format!("{}:{}", namespace.as_str(), id.to_lowercase())
}

fn record_count_key(sender: &str) -> String {
	format!("{}:count", storage_key(StorageKey::Transactions, sender))
}

fn record_key(sender: &str, seq: u64) -> String {
	format!("{}:{:020}", storage_key(StorageKey::Transactions, sender), seq)
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			write_lock: Mutex::new(()),
		}
	}

	async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StorageError> {
		match self.backend.get_bytes(key).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map_err(|e| StorageError::Serialization(e.to_string())),
			Err(StorageError::NotFound) => Ok(T::default()),
			Err(e) => Err(e),
		}
	}

	async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(key, bytes).await
	}

	/// Number of records appended for `sender`.
	///
	/// An unreadable counter is rebuilt by probing record keys from zero.
	async fn record_count(&self, sender: &str) -> Result<u64, StorageError> {
		match self.load(&record_count_key(sender)).await {
			Err(StorageError::Serialization(e)) => {
				tracing::warn!(sender = %sender, error = %e, "Rebuilding corrupt record counter");
				let mut count = 0;
				while self.backend.exists(&record_key(sender, count)).await? {
					count += 1;
				}
				Ok(count)
			},
			other => other,
		}
	}

	/// Appends a record to its sender's log.
	pub async fn append_record(&self, record: &TransactionRecord) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;

		let seq = self.record_count(&record.sender).await?;
		self.save(&record_key(&record.sender, seq), record).await?;
		self.save(&record_count_key(&record.sender), &(seq + 1))
			.await?;

		tracing::debug!(
			sender = %record.sender,
			status = %record.status,
			seq,
			"Appended transaction record"
		);
		Ok(())
	}

	/// Returns a sender's records matching `query`, newest first.
	///
	/// Matches have a status in `query.statuses` and `created_at` strictly
	/// before `query.before`. At most `query.limit` are returned. Records
	/// that no longer deserialize are skipped.
	pub async fn query_records(
		&self,
		sender: &str,
		query: &HistoryQuery,
	) -> Result<Vec<TransactionRecord>, StorageError> {
		let count = self.record_count(sender).await?;

		let mut matches = Vec::new();
		for seq in (0..count).rev() {
			if matches.len() >= query.limit {
				break;
			}
			let bytes = match self.backend.get_bytes(&record_key(sender, seq)).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let record: TransactionRecord = match serde_json::from_slice(&bytes) {
				Ok(record) => record,
				Err(e) => {
					tracing::warn!(sender = %sender, seq, error = %e, "Skipping unreadable record");
					continue;
				},
			};
			if record.created_at < query.before && query.statuses.contains(&record.status) {
				matches.push(record);
			}
		}

		// Append order can trail the clock by a few millis under concurrency
		matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(matches)
	}

	/// Increments a sender's alert counter and returns the new value.
	pub async fn increment_counter(&self, sender: &str) -> Result<u64, StorageError> {
		let key = storage_key(StorageKey::AlertCounters, sender);
		let _guard = self.write_lock.lock().await;

		let count: u64 = self.load(&key).await?;
		let next = count.saturating_add(1);
		self.save(&key, &next).await?;
		Ok(next)
	}

	/// Current value of a sender's alert counter; zero when never incremented.
	pub async fn get_counter(&self, sender: &str) -> Result<u64, StorageError> {
		self.load(&storage_key(StorageKey::AlertCounters, sender))
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use relay_types::TransactionStatus;
	use std::sync::Arc;

	fn record(sender: &str, status: TransactionStatus, created_at: u64) -> TransactionRecord {
		TransactionRecord {
			sender: sender.to_string(),
			raw_transaction: format!("0x{:02x}", created_at),
			status,
			error: None,
			created_at,
		}
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_query_filters_and_orders() {
		let storage = service();
		let sender = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
		for (status, at) in [
			(TransactionStatus::Sent, 100),
			(TransactionStatus::Error, 200),
			(TransactionStatus::Sent, 300),
			(TransactionStatus::Discarded, 400),
			(TransactionStatus::Sent, 500),
		] {
			storage.append_record(&record(sender, status, at)).await.unwrap();
		}

		let query = HistoryQuery {
			statuses: vec![TransactionStatus::Sent, TransactionStatus::Error],
			before: 500,
			limit: 10,
		};
		let found = storage.query_records(sender, &query).await.unwrap();
		let times: Vec<u64> = found.iter().map(|r| r.created_at).collect();
		assert_eq!(times, vec![300, 200, 100]);

		let query = HistoryQuery { limit: 2, ..query };
		let found = storage.query_records(sender, &query).await.unwrap();
		assert_eq!(found.len(), 2);
		assert_eq!(found[0].created_at, 300);
	}

	#[tokio::test]
	async fn test_sender_keys_are_case_insensitive() {
		let storage = service();
		storage
			.append_record(&record(
				"0xAbCdEf0000000000000000000000000000000000",
				TransactionStatus::Sent,
				1,
			))
			.await
			.unwrap();

		let query = HistoryQuery {
			statuses: TransactionStatus::all().collect(),
			before: u64::MAX,
			limit: 10,
		};
		let found = storage
			.query_records("0xabcdef0000000000000000000000000000000000", &query)
			.await
			.unwrap();
		assert_eq!(found.len(), 1);
	}

	#[tokio::test]
	async fn test_unknown_sender_has_empty_history() {
		let storage = service();
		let query = HistoryQuery {
			statuses: TransactionStatus::all().collect(),
			before: u64::MAX,
			limit: 10,
		};
		assert!(storage.query_records("0x01", &query).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_concurrent_increments_are_not_lost() {
		let storage = Arc::new(service());
		let mut handles = Vec::new();
		for _ in 0..50 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				storage.increment_counter("0xBEEF").await.unwrap()
			}));
		}
		let mut seen = Vec::new();
		for handle in handles {
			seen.push(handle.await.unwrap());
		}
		seen.sort_unstable();
		assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
		assert_eq!(storage.get_counter("0xbeef").await.unwrap(), 50);
	}

	fn all_statuses() -> HistoryQuery {
		HistoryQuery {
			statuses: TransactionStatus::all().collect(),
			before: u64::MAX,
			limit: 10,
		}
	}

	#[tokio::test]
	async fn test_records_are_stored_one_per_key() {
		let backend = Arc::new(MemoryStorage::new());
		let storage = StorageService::new(Box::new(SharedBackend(backend.clone())));
		let sender = "0xCAFE";
		for at in 1..=3 {
			storage
				.append_record(&record(sender, TransactionStatus::Sent, at))
				.await
				.unwrap();
		}

		assert!(backend.exists(&record_key("0xcafe", 0)).await.unwrap());
		assert!(backend.exists(&record_key("0xcafe", 2)).await.unwrap());
		assert!(!backend.exists(&record_key("0xcafe", 3)).await.unwrap());
		let count = backend.get_bytes(&record_count_key(sender)).await.unwrap();
		assert_eq!(count, b"3");
	}

	#[tokio::test]
	async fn test_corrupt_record_does_not_block_appends() {
		let backend = Arc::new(MemoryStorage::new());
		let storage = StorageService::new(Box::new(SharedBackend(backend.clone())));
		let sender = "0xcafe";
		storage
			.append_record(&record(sender, TransactionStatus::Sent, 1))
			.await
			.unwrap();
		backend
			.set_bytes(&record_key(sender, 0), b"{not json".to_vec())
			.await
			.unwrap();

		storage
			.append_record(&record(sender, TransactionStatus::Error, 2))
			.await
			.unwrap();
		let found = storage.query_records(sender, &all_statuses()).await.unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].created_at, 2);
	}

	#[tokio::test]
	async fn test_corrupt_counter_is_rebuilt() {
		let backend = Arc::new(MemoryStorage::new());
		let storage = StorageService::new(Box::new(SharedBackend(backend.clone())));
		let sender = "0xcafe";
		for at in 1..=2 {
			storage
				.append_record(&record(sender, TransactionStatus::Sent, at))
				.await
				.unwrap();
		}
		backend
			.set_bytes(&record_count_key(sender), b"garbage".to_vec())
			.await
			.unwrap();

		storage
			.append_record(&record(sender, TransactionStatus::Sent, 3))
			.await
			.unwrap();
		let found = storage.query_records(sender, &all_statuses()).await.unwrap();
		let times: Vec<u64> = found.iter().map(|r| r.created_at).collect();
		assert_eq!(times, vec![3, 2, 1]);
	}

	/// Lets a test inspect the backend the service writes to.
	struct SharedBackend(Arc<MemoryStorage>);

	#[async_trait]
	impl StorageInterface for SharedBackend {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.0.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.0.set_bytes(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.0.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.0.exists(key).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.0.config_schema()
		}
	}
}
