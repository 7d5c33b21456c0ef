//! Ledger-facing types.

use serde::{Deserialize, Serialize};

/// One entry of the access hint passed to dry runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessListEntry {
	/// Address expected to be touched.
	pub address: String,
	/// Storage slots expected to be touched, as 32-byte hex strings.
	#[serde(default)]
	pub storage_keys: Vec<String>,
}

impl AccessListEntry {
	/// The fixed hint warmed by the sponsor entry point's log precompile.
	pub fn default_hint() -> Vec<Self> {
		vec![Self {
			address: "0x5555555555555555555555555555555555555555".to_string(),
			storage_keys: vec![
				"0x5555555555555555555555555555555555555555555555555555555555555555".to_string(),
			],
		}]
	}
}

/// Receipt of a confirmed relayer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
	/// Transaction hash.
	pub tx_hash: String,
	/// Block the transaction was included in.
	pub block_number: u64,
	/// Whether execution succeeded.
	pub success: bool,
}
