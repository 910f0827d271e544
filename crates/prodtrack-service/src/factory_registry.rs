//! Registry of storage factories available to the binary.
//!
//! Implementations self-register through their crate's
//! `get_all_implementations`; configuration picks among them by name.

use prodtrack_config::Config;
use prodtrack_core::{EngineBuilder, EngineFactories, ProductionEngine};
use prodtrack_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();
		for (name, factory) in prodtrack_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}
		registry
	})
}

/// Builds the engine over the configured storage implementations.
///
/// Every configured implementation must be known to the registry, even
/// though only the primary one is opened.
pub async fn build_engine_from_config(
	config: Config,
) -> Result<ProductionEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let mut storage_factories = HashMap::new();
	for name in config.storage.implementations.keys() {
		let Some(factory) = registry.storage.get(name) else {
			let mut available: Vec<_> = registry.storage.keys().cloned().collect();
			available.sort();
			return Err(format!(
				"Unknown storage implementation '{}'. Available: [{}]",
				name,
				available.join(", ")
			)
			.into());
		};
		storage_factories.insert(name.clone(), *factory);
	}

	Ok(EngineBuilder::new(config)
		.build(EngineFactories { storage_factories })
		.await?)
}
