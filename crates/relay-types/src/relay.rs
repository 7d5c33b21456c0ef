//! Pipeline verdicts and outcomes.
//!
//! Every relay attempt resolves into one of these values; no failure crosses
//! the pipeline boundary as an error.

use crate::TransactionStatus;
use serde::{Deserialize, Serialize};

/// Result of the dry-run eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityVerdict {
	/// The sponsor entry point accepted the transaction.
	Eligible,
	/// The sponsor entry point declined; carries the raw revert payload.
	Ineligible(String),
	/// The dry run could not be evaluated; carries the raw failure.
	InfrastructureError(String),
}

/// Result of an on-chain submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
	/// Sender of the sponsored transaction.
	pub sender: String,
	/// Whether the node accepted the sponsor call.
	pub attempted: bool,
	/// Whether the relayer nonce advanced by exactly one.
	pub nonce_consistent: bool,
	/// Hash of the relayer's sponsor transaction, once known.
	pub tx_hash: Option<String>,
	/// Failure detail, `None` when confirmed.
	pub error: Option<String>,
	/// Whether a failed submission may still have been applied on-chain.
	pub possibly_applied: bool,
}

impl SubmissionOutcome {
	/// Returns true when the sponsor call was confirmed on-chain.
	pub fn is_confirmed(&self) -> bool {
		self.attempted && self.error.is_none()
	}
}

/// Terminal answer returned for every relay call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOutcome {
	/// Whether the transaction decoded and passed the schema check.
	pub schema_valid: bool,
	/// Whether the transaction was submitted and confirmed.
	pub sponsored: bool,
	/// Terminal status.
	pub status: TransactionStatus,
	/// Nonce consistency of the submission, when one happened.
	pub nonce_consistent: Option<bool>,
	/// Error detail for non-`SENT` outcomes.
	pub error: Option<String>,
}
