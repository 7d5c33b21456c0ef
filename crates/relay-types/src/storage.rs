//! Storage-related types for the relay.

/// Storage namespaces.
///
/// Keys start with `<namespace>:<sender>`, the sender lower-cased. Alert
/// counters use that key as is; transaction records add `:<seq>` and a
/// `:count` entry per sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Append-only transaction records, one key each
	Transactions,
	/// Balance alert attempt counters per sender
	AlertCounters,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Transactions => "transactions",
			StorageKey::AlertCounters => "alerts",
		}
	}
}
