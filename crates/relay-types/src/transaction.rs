//! Transaction types for the relay.
//!
//! Defines the structured view of a decoded raw transaction, the terminal
//! statuses a relay attempt can end in, and the append-only record persisted
//! for every processed attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Structured view of a raw signed transaction.
///
/// Quantities are kept as `0x`-prefixed hex strings so the view can be
/// validated field by field and handed back to API callers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTransaction {
	/// Sender sequence number.
	pub nonce: u64,
	/// Gas price for legacy and access-list transactions, absent otherwise.
	pub gas_price: Option<String>,
	/// Gas limit as a hex quantity.
	pub gas_limit: String,
	/// Destination address, absent for contract creation.
	pub to: Option<String>,
	/// Transferred native value as a hex quantity.
	pub value: String,
	/// Call data as hex bytes (`0x` when empty).
	pub data: String,
	/// Chain identifier, absent for pre-EIP-155 legacy transactions.
	pub chain_id: Option<u64>,
	/// Signature `v`; EIP-155 encoded for legacy transactions, y-parity otherwise.
	pub v: u64,
	/// Signature `r` as a hex quantity.
	pub r: String,
	/// Signature `s` as a hex quantity.
	pub s: String,
	/// Recovered sender, absent if recovery failed.
	pub from: Option<String>,
	/// Transaction hash.
	pub hash: String,
}

/// Terminal status of a relay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
	/// Submitted and confirmed.
	Sent,
	/// Well-formed but not eligible for sponsorship.
	Discarded,
	/// Malformed, simulation infrastructure failure or submission failure.
	Error,
}

impl TransactionStatus {
	/// Returns the persisted representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			TransactionStatus::Sent => "SENT",
			TransactionStatus::Discarded => "DISCARDED",
			TransactionStatus::Error => "ERROR",
		}
	}

	/// Returns an iterator over all statuses.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Sent, Self::Discarded, Self::Error].into_iter()
	}

	/// Parses a comma-separated status filter such as `"SENT,ERROR"`.
	///
	/// Tokens are trimmed and matched case-insensitively. An empty filter
	/// selects every status.
	pub fn parse_filter(filter: &str) -> Result<Vec<Self>, String> {
		let mut statuses = Vec::new();
		for token in filter.split(',').map(str::trim).filter(|t| !t.is_empty()) {
			let status = token.parse::<Self>()?;
			if !statuses.contains(&status) {
				statuses.push(status);
			}
		}
		if statuses.is_empty() {
			statuses.extend(Self::all());
		}
		Ok(statuses)
	}
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TransactionStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"SENT" => Ok(Self::Sent),
			"DISCARDED" => Ok(Self::Discarded),
			"ERROR" => Ok(Self::Error),
			other => Err(format!("Unknown transaction status: {}", other)),
		}
	}
}

/// Persisted record of one relay attempt.
///
/// Records are append-only: a resubmission of the same raw transaction
/// produces a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	/// Lower-cased sender address, used as the lookup key.
	pub sender: String,
	/// Raw transaction exactly as received.
	pub raw_transaction: String,
	/// Terminal status.
	pub status: TransactionStatus,
	/// Error detail for `DISCARDED` and `ERROR` outcomes.
	pub error: Option<String>,
	/// Creation time in UNIX milliseconds.
	pub created_at: u64,
}

/// Query parameters for the transaction history of a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
	/// Statuses to include.
	pub statuses: Vec<TransactionStatus>,
	/// Only records created strictly before this UNIX millisecond timestamp.
	pub before: u64,
	/// Maximum number of records to return.
	pub limit: usize,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_serialization() {
		assert_eq!(
			serde_json::to_string(&TransactionStatus::Discarded).unwrap(),
			"\"DISCARDED\""
		);
		let parsed: TransactionStatus = serde_json::from_str("\"SENT\"").unwrap();
		assert_eq!(parsed, TransactionStatus::Sent);
	}

	#[test]
	fn test_parse_filter() {
		assert_eq!(
			TransactionStatus::parse_filter("sent, ERROR,SENT").unwrap(),
			vec![TransactionStatus::Sent, TransactionStatus::Error]
		);
		assert_eq!(TransactionStatus::parse_filter("").unwrap().len(), 3);
		assert!(TransactionStatus::parse_filter("SENT,PENDING").is_err());
	}

	#[test]
	fn test_decoded_transaction_uses_camel_case() {
		let tx = DecodedTransaction {
			nonce: 5,
			gas_price: None,
			gas_limit: "0x5208".into(),
			to: Some("0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead".into()),
			value: "0x0".into(),
			data: "0x".into(),
			chain_id: Some(1),
			v: 0,
			r: "0x1".into(),
			s: "0x2".into(),
			from: None,
			hash: format!("0x{}", "00".repeat(32)),
		};
		let json = serde_json::to_value(&tx).unwrap();
		assert_eq!(json["gasLimit"], "0x5208");
		assert_eq!(json["chainId"], 1);
		assert!(json["gasPrice"].is_null());
	}
}
