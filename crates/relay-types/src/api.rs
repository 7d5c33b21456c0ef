//! API types for the relay HTTP API.
//!
//! Request and response bodies for the relay, balance and history endpoints,
//! and the structured error type every handler returns.

use crate::{DecodedTransaction, TransactionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /api/relay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
	/// Hex-encoded signed transaction.
	pub raw_transaction: String,
}

/// Response of `POST /api/relay`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
	/// Whether the transaction decoded and passed the schema check.
	pub schema_valid: bool,
	/// Whether the relayer submitted and confirmed it.
	pub sponsored: bool,
	/// Nonce consistency of the submission, `null` if nothing was submitted.
	pub nonce_consistent: Option<bool>,
}

/// Response of `GET /api/balance/{address}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
	/// Queried address.
	pub address: String,
	/// Native balance formatted in ether.
	pub balance: String,
}

/// Query string of `GET /api/transactions/{address}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryParams {
	/// Comma-separated status filter, e.g. `SENT,ERROR`.
	#[serde(default)]
	pub status: String,
	/// Upper bound (exclusive) in UNIX milliseconds; 0 means now.
	#[serde(default)]
	pub before: u64,
	/// Maximum number of entries.
	pub limit: Option<usize>,
}

/// One entry of a sender's transaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
	/// The stored raw transaction, decoded again.
	pub tx: DecodedTransaction,
	/// Terminal status of the attempt.
	pub status: TransactionStatus,
	/// Error detail of the attempt.
	pub error: Option<String>,
	/// Creation time in UNIX milliseconds.
	pub created_at: u64,
}

/// Response of `GET /api/transactions/{address}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
	/// Entries, newest first.
	pub transactions: Vec<HistoryEntry>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// Upstream ledger or storage unavailable (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				retry_after: None,
			},
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				retry_after: *retry_after,
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
