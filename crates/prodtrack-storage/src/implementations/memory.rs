//! In-memory storage backend implementation for the prodtrack service.
//!
//! This module provides a memory-based implementation of the StorageInterface trait,
//! useful for testing and for one-shot runs where persistence is not required.

use crate::{StorageError, StorageInterface, StorageRegistry, Tables};
use async_trait::async_trait;
use prodtrack_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

/// In-memory storage implementation.
///
/// The [`StorageService`](crate::StorageService) already keeps the live
/// tables in memory, so this backend starts empty and discards snapshots.
#[derive(Debug, Default)]
pub struct MemoryStorage;

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn load(&self) -> Result<Option<Tables>, StorageError> {
		Ok(None)
	}

	async fn persist(&self, _tables: &Tables) -> Result<(), StorageError> {
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage accepts no options
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters:
/// - None
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
