//! Common types module for the fee relay.
//!
//! This module defines the core data types and structures shared by every
//! relay component: the decoded transaction view, pipeline verdicts, persisted
//! records, API payloads and configuration validation helpers.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Ledger-facing types such as access hints and receipts.
pub mod ledger;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Pipeline verdicts and outcomes.
pub mod relay;
/// Secret string wrapper for private keys and tokens.
pub mod secret_string;
/// Storage types for managing persistent data.
pub mod storage;
/// Decoded transactions, statuses and persisted records.
pub mod transaction;
/// Utility functions for common type conversions.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use ledger::*;
pub use registry::ImplementationRegistry;
pub use relay::*;
pub use secret_string::SecretString;
pub use storage::*;
pub use transaction::*;
pub use utils::{
	current_timestamp_millis, is_address, is_hex_bytes, is_hex_quantity, without_0x_prefix,
};
pub use validation::*;
