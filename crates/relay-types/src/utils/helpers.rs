//! Shape predicates and time helpers.
//!
//! The predicates mirror what a JSON-RPC client accepts for each transaction
//! field and are used by the schema validator on decoded transactions.

use alloy_primitives::Address;

use super::formatting::without_0x_prefix;

/// Current UNIX time in milliseconds, 0 if the clock is before the epoch.
pub fn current_timestamp_millis() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

/// Returns true for a `0x`-prefixed string of hex digits encoding whole bytes.
///
/// `0x` alone is the empty byte string and is accepted.
pub fn is_hex_bytes(value: &str) -> bool {
	match value.strip_prefix("0x") {
		Some(digits) => digits.len() % 2 == 0 && digits.bytes().all(|b| b.is_ascii_hexdigit()),
		None => false,
	}
}

/// Returns true for a `0x`-prefixed, non-empty hex quantity.
///
/// Quantities are unsigned, so any digit string is non-negative by
/// construction; odd lengths are allowed (`0x0`, `0x5208`).
pub fn is_hex_quantity(value: &str) -> bool {
	match value.strip_prefix("0x") {
		Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()),
		None => false,
	}
}

/// Returns true when the value parses as a 20-byte account address.
///
/// Mixed-case input must carry a valid EIP-55 checksum.
pub fn is_address(value: &str) -> bool {
	let digits = without_0x_prefix(value);
	if digits.len() != 40 || !value.starts_with("0x") {
		return false;
	}
	let is_mixed_case = digits.chars().any(|c| c.is_ascii_uppercase())
		&& digits.chars().any(|c| c.is_ascii_lowercase());
	if is_mixed_case {
		Address::parse_checksummed(value, None).is_ok()
	} else {
		value.parse::<Address>().is_ok()
	}
}
