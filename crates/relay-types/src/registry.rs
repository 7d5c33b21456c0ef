//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage, ledger, account, notification) provides a
/// `Registry` struct that declares its configuration name and factory.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `memory` for
	/// `storage.implementations.memory`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
