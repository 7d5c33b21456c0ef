//! Raw transaction decoding and schema validation.
//!
//! Decoding turns a hex blob into a [`DecodedTransaction`] with every field
//! rendered the way a JSON-RPC client would show it. Validation then checks
//! each field against its shape predicate and fails closed.

use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::Bytes;
use relay_types::{
	is_address, is_hex_bytes, is_hex_quantity, without_0x_prefix, DecodedTransaction,
};
use thiserror::Error;

/// The raw input is not a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("Invalid hex encoding: {0}")]
	InvalidHex(String),
	#[error("Invalid transaction encoding: {0}")]
	InvalidEncoding(String),
}

/// One or more decoded fields failed their shape check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe_violations(.fields))]
pub struct SchemaError {
	/// Offending field names, in schema order.
	pub fields: Vec<&'static str>,
}

fn describe_violations(fields: &[&'static str]) -> String {
	fields
		.iter()
		.map(|field| format!("{} is invalid.", field))
		.collect::<Vec<_>>()
		.join("\n")
}

/// Hex-decodes a raw transaction; the `0x` prefix is optional.
pub fn raw_bytes(raw: &str) -> Result<Bytes, DecodeError> {
	hex::decode(without_0x_prefix(raw.trim()))
		.map(Bytes::from)
		.map_err(|e| DecodeError::InvalidHex(e.to_string()))
}

/// Decodes a hex-encoded signed transaction, legacy or EIP-2718 typed.
///
/// Signer recovery failure leaves `from` empty rather than failing; the
/// validator reports it.
pub fn decode(raw: &str) -> Result<DecodedTransaction, DecodeError> {
	let bytes = raw_bytes(raw)?;
	if bytes.is_empty() {
		return Err(DecodeError::InvalidEncoding("empty input".to_string()));
	}

	let mut buf: &[u8] = &bytes[..];
	let envelope = TxEnvelope::decode_2718(&mut buf)
		.map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
	if !buf.is_empty() {
		return Err(DecodeError::InvalidEncoding(format!(
			"{} trailing bytes after transaction",
			buf.len()
		)));
	}

	Ok(describe(&envelope))
}

/// Legacy `v` as carried on the wire: EIP-155 encoded when a chain id is set.
fn legacy_v(y_parity: bool, chain_id: Option<u64>) -> u64 {
	let parity = y_parity as u64;
	match chain_id {
		Some(id) => id.saturating_mul(2).saturating_add(35 + parity),
		None => 27 + parity,
	}
}

fn describe(envelope: &TxEnvelope) -> DecodedTransaction {
	let signature = envelope.signature();
	let chain_id = envelope.chain_id();
	let v = match envelope {
		TxEnvelope::Legacy(_) => legacy_v(signature.v(), chain_id),
		_ => signature.v() as u64,
	};

	DecodedTransaction {
		nonce: envelope.nonce(),
		gas_price: envelope.gas_price().map(|price| format!("{:#x}", price)),
		gas_limit: format!("{:#x}", envelope.gas_limit()),
		to: envelope.to().map(|to| to.to_checksum(None)),
		value: format!("{:#x}", envelope.value()),
		data: envelope.input().to_string(),
		chain_id,
		v,
		r: format!("{:#x}", signature.r()),
		s: format!("{:#x}", signature.s()),
		from: envelope
			.recover_signer()
			.ok()
			.map(|from| from.to_checksum(None)),
		hash: format!("{:#x}", envelope.tx_hash()),
	}
}

/// Checks every field of a decoded transaction.
///
/// All violations are collected before failing.
pub fn validate(tx: &DecodedTransaction) -> Result<(), SchemaError> {
	let address = |value: &Option<String>| value.as_deref().is_some_and(is_address);

	// nonce and v are unsigned integers by type
	let checks: [(&'static str, bool); 12] = [
		("nonce", true),
		(
			"gasPrice",
			tx.gas_price.as_deref().is_none_or(is_hex_quantity),
		),
		("gasLimit", is_hex_quantity(&tx.gas_limit)),
		("to", address(&tx.to)),
		("value", is_hex_quantity(&tx.value)),
		("data", is_hex_bytes(&tx.data)),
		("chainId", tx.chain_id.is_some()),
		("v", true),
		("r", is_hex_quantity(&tx.r)),
		("s", is_hex_quantity(&tx.s)),
		("from", address(&tx.from)),
		("hash", is_hex_bytes(&tx.hash) && tx.hash.len() == 66),
	];

	let fields: Vec<&'static str> = checks
		.into_iter()
		.filter(|(_, ok)| !ok)
		.map(|(field, _)| field)
		.collect();

	if fields.is_empty() {
		Ok(())
	} else {
		Err(SchemaError { fields })
	}
}

/// Lower-cased sender address, when it was recovered and is well-formed.
pub fn sender_of(tx: &DecodedTransaction) -> Option<String> {
	tx.from
		.as_deref()
		.filter(|from| is_address(from))
		.map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{dead_address, sign_eip1559, sign_legacy, signer};

	#[test]
	fn test_decode_legacy_eip155() {
		let raw = sign_legacy(&signer(), 5, Some(43114), Some(dead_address()));
		let tx = decode(&raw).unwrap();

		assert_eq!(tx.nonce, 5);
		assert_eq!(tx.to.as_deref(), Some("0x000000000000000000000000000000000000dEaD"));
		assert_eq!(tx.value, "0x0");
		assert_eq!(tx.data, "0x");
		assert_eq!(tx.chain_id, Some(43114));
		assert!(tx.v == 43114 * 2 + 35 || tx.v == 43114 * 2 + 36);
		assert_eq!(tx.gas_price.as_deref(), Some("0x5d21dba00"));
		assert_eq!(
			tx.from.as_deref(),
			Some(signer().address().to_checksum(None).as_str())
		);
		assert!(validate(&tx).is_ok());
	}

	#[test]
	fn test_decode_without_prefix_matches() {
		let raw = sign_legacy(&signer(), 1, Some(1), Some(dead_address()));
		let bare = raw.trim_start_matches("0x");
		assert_eq!(decode(&raw).unwrap(), decode(bare).unwrap());
	}

	#[test]
	fn test_decode_is_deterministic() {
		let raw = sign_eip1559(&signer(), 9, 43114);
		assert_eq!(decode(&raw).unwrap(), decode(&raw).unwrap());
	}

	#[test]
	fn test_decode_eip1559_has_no_gas_price() {
		let tx = decode(&sign_eip1559(&signer(), 9, 43114)).unwrap();
		assert_eq!(tx.gas_price, None);
		assert!(tx.v <= 1);
		assert!(validate(&tx).is_ok());
	}

	#[test]
	fn test_decode_rejects_garbage() {
		assert!(matches!(decode("0xzz"), Err(DecodeError::InvalidHex(_))));
		assert!(matches!(decode("0x"), Err(DecodeError::InvalidEncoding(_))));
		assert!(matches!(
			decode("0xdeadbeef"),
			Err(DecodeError::InvalidEncoding(_))
		));

		let raw = sign_legacy(&signer(), 1, Some(1), Some(dead_address()));
		let padded = format!("{}00", raw);
		assert!(matches!(
			decode(&padded),
			Err(DecodeError::InvalidEncoding(_))
		));
	}

	#[test]
	fn test_contract_creation_and_pre_eip155_fail_schema() {
		let creation = decode(&sign_legacy(&signer(), 0, Some(1), None)).unwrap();
		assert_eq!(validate(&creation).unwrap_err().fields, vec!["to"]);

		let unprotected = decode(&sign_legacy(&signer(), 0, None, Some(dead_address()))).unwrap();
		assert!(unprotected.v == 27 || unprotected.v == 28);
		assert_eq!(validate(&unprotected).unwrap_err().fields, vec!["chainId"]);
	}

	#[test]
	fn test_every_violation_is_reported() {
		let mut tx = decode(&sign_legacy(&signer(), 3, Some(1), Some(dead_address()))).unwrap();
		tx.gas_price = Some("12".into());
		tx.data = "0xabc".into();
		tx.from = None;
		tx.hash = "0x1234".into();

		let err = validate(&tx).unwrap_err();
		assert_eq!(err.fields, vec!["gasPrice", "data", "from", "hash"]);
		assert_eq!(
			err.to_string(),
			"gasPrice is invalid.\ndata is invalid.\nfrom is invalid.\nhash is invalid."
		);
	}

	#[test]
	fn test_bad_checksum_address_rejected() {
		let mut tx = decode(&sign_legacy(&signer(), 3, Some(1), Some(dead_address()))).unwrap();
		tx.to = Some("0x000000000000000000000000000000000000DeaD".into());
		assert_eq!(validate(&tx).unwrap_err().fields, vec!["to"]);
		assert!(sender_of(&tx).is_some());
	}

	#[test]
	fn test_sender_is_lowercased() {
		let tx = decode(&sign_legacy(&signer(), 3, Some(1), Some(dead_address()))).unwrap();
		let sender = sender_of(&tx).unwrap();
		assert_eq!(sender, sender.to_lowercase());
	}
}
