//! Relay pipeline for sponsored transactions.
//!
//! A raw signed transaction flows through decoding, schema validation, a dry
//! run against the sponsor entry point and, when eligible, a guarded on-chain
//! submission by the relayer. The terminal outcome is recorded per sender and
//! feeds the relayer's low-balance alerting.
//!
//! [`RelayEngine::relay`] never fails: every path resolves into a
//! [`relay_types::RelayOutcome`].

pub mod alerts;
pub mod builder;
pub mod decoder;
pub mod engine;
pub mod recorder;
pub mod simulator;
pub mod submission;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use alerts::{AlertThrottler, BalanceAlertThrottler, NoopThrottler};
pub use builder::{BuilderError, RelayBuilder, RelayFactories};
pub use decoder::{DecodeError, SchemaError};
pub use engine::{EngineError, EngineSettings, QueryError, RelayEngine};
pub use recorder::{NoopRecorder, OutcomeRecorder, StorageRecorder};
pub use simulator::EligibilitySimulator;
pub use submission::SubmissionGuard;

use relay_types::TransactionStatus;
use thiserror::Error;

/// Why a relay attempt did not end in a confirmed sponsorship.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
	#[error("Failed to decode transaction: {0}")]
	Decode(#[from] DecodeError),
	#[error("{0}")]
	Schema(#[from] SchemaError),
	/// Carries the raw revert payload.
	#[error("{0}")]
	Ineligible(String),
	#[error("Simulation failed: {0}")]
	SimulationInfrastructure(String),
	#[error("Submission failed: {detail}")]
	Submission {
		detail: String,
		possibly_applied: bool,
	},
}

impl RelayError {
	/// Persisted status for this failure.
	pub fn status(&self) -> TransactionStatus {
		match self {
			RelayError::Ineligible(_) => TransactionStatus::Discarded,
			_ => TransactionStatus::Error,
		}
	}

	/// Whether the decoded transaction passed the schema check.
	pub fn schema_valid(&self) -> bool {
		!matches!(self, RelayError::Decode(_) | RelayError::Schema(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		assert_eq!(
			RelayError::Ineligible("{}".into()).status(),
			TransactionStatus::Discarded
		);
		let failures = [
			RelayError::Decode(DecodeError::InvalidHex("odd length".into())),
			RelayError::Schema(SchemaError { fields: vec!["to"] }),
			RelayError::SimulationInfrastructure("timeout".into()),
			RelayError::Submission {
				detail: "rejected".into(),
				possibly_applied: false,
			},
		];
		for failure in failures {
			assert_eq!(failure.status(), TransactionStatus::Error);
		}
	}

	#[test]
	fn test_ineligible_message_is_raw_reason() {
		let reason = r#"{"err":true}"#;
		assert_eq!(RelayError::Ineligible(reason.into()).to_string(), reason);
		assert!(!RelayError::Schema(SchemaError { fields: vec!["from"] }).schema_valid());
		assert!(RelayError::SimulationInfrastructure("x".into()).schema_valid());
	}
}
