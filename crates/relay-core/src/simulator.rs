//! Dry-run eligibility check against the sponsor entry point.
//!
//! The sponsor contract reverts with a JSON payload `{err?, logs?}` when it
//! declines. A clean return is taken as acceptance without inspecting logs.

use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, LogData, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use relay_ledger::{CallFailure, LedgerService};
use relay_types::EligibilityVerdict;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

sol! {
	/// Sponsor entry point executing a user's signed transaction.
	function sponsor(bytes rawTx);

	/// ERC-20 transfer event.
	event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Calldata for `sponsor(rawTx)`.
pub fn sponsor_calldata(raw_tx: &Bytes) -> Bytes {
	sponsorCall {
		rawTx: raw_tx.clone(),
	}
	.abi_encode()
	.into()
}

#[derive(Deserialize)]
struct SimulatedLog {
	address: Address,
	#[serde(default)]
	topics: Vec<B256>,
	#[serde(default)]
	data: Bytes,
}

/// JavaScript-style truthiness of a JSON value.
fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}

/// Whether `log` is a positive `Transfer` emitted by `asset`.
///
/// Address comparison is on parsed values, so hex case does not matter.
fn is_qualifying_transfer(log: &Value, asset: Address) -> bool {
	let Ok(log) = serde_json::from_value::<SimulatedLog>(log.clone()) else {
		return false;
	};
	if log.address != asset {
		return false;
	}
	let Some(data) = LogData::new(log.topics, log.data) else {
		return false;
	};
	Transfer::decode_log_data(&data)
		.map(|transfer| transfer.value > U256::ZERO)
		.unwrap_or(false)
}

/// Classifies a revert reason from the sponsor entry point.
pub fn classify_revert(reason: &str, asset: Address) -> EligibilityVerdict {
	let payload = match serde_json::from_str::<Value>(reason) {
		Ok(Value::Object(payload)) => payload,
		_ => {
			return EligibilityVerdict::InfrastructureError(format!(
				"Unrecognized revert payload: {}",
				reason
			))
		},
	};

	let declined = payload.get("err").is_some_and(is_truthy);
	let qualifies = match payload.get("logs") {
		Some(Value::Array(logs)) => logs.iter().any(|log| is_qualifying_transfer(log, asset)),
		_ => false,
	};

	if declined || !qualifies {
		EligibilityVerdict::Ineligible(reason.to_string())
	} else {
		EligibilityVerdict::Eligible
	}
}

/// Runs the sponsor call as a dry run and classifies the outcome.
pub struct EligibilitySimulator {
	ledger: Arc<LedgerService>,
	sponsor: Address,
	asset: Address,
	access_list: AccessList,
	timeout: Duration,
}

impl EligibilitySimulator {
	pub fn new(
		ledger: Arc<LedgerService>,
		sponsor: Address,
		asset: Address,
		access_list: AccessList,
		timeout: Duration,
	) -> Self {
		Self {
			ledger,
			sponsor,
			asset,
			access_list,
			timeout,
		}
	}

	pub async fn evaluate(&self, raw_tx: &Bytes) -> EligibilityVerdict {
		let call = self.ledger.simulate_call(
			self.sponsor,
			sponsor_calldata(raw_tx),
			self.access_list.clone(),
		);

		let verdict = match tokio::time::timeout(self.timeout, call).await {
			Ok(Ok(())) => EligibilityVerdict::Eligible,
			Ok(Err(CallFailure::Reverted(reason))) => classify_revert(&reason, self.asset),
			Ok(Err(CallFailure::Transport(detail))) => {
				EligibilityVerdict::InfrastructureError(detail)
			},
			Err(_) => EligibilityVerdict::InfrastructureError(format!(
				"Simulation timed out after {}s",
				self.timeout.as_secs()
			)),
		};

		match &verdict {
			EligibilityVerdict::Eligible => tracing::info!("Simulation passed"),
			EligibilityVerdict::Ineligible(reason) => {
				tracing::info!(reason = %reason, "Simulation declined")
			},
			EligibilityVerdict::InfrastructureError(detail) => {
				tracing::error!(error = %detail, "Simulation failed")
			},
		}
		verdict
	}
}
