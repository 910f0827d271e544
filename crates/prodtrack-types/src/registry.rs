//! Registry trait for self-registering implementations.
//!
//! Pluggable backends (currently the storage backends) expose a `Registry`
//! struct naming the configuration key they answer to and the factory that
//! builds them from their TOML table.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// Key used under `[storage.implementations.<NAME>]`, e.g. `"file"`.
	const NAME: &'static str;

	/// Factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds the implementation from its config table.
	fn factory() -> Self::Factory;
}
