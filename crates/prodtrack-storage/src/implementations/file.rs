//! File-based storage backend for the prodtrack service.
//!
//! The whole store is kept as one JSON snapshot inside the configured data
//! directory. Snapshots are written to a temporary file and renamed into
//! place, so a crash mid-write leaves the previous snapshot intact. An
//! exclusive lock file keeps two processes from sharing one directory.

use crate::{StorageError, StorageInterface, StorageRegistry, Tables};
use async_trait::async_trait;
use prodtrack_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::fs;

const SNAPSHOT_FILE: &str = "prodtrack.json";
const LOCK_FILE: &str = "prodtrack.lock";

/// File-based storage implementation.
///
/// Holds the directory lock for as long as the instance lives.
pub struct FileStorage {
	/// Base directory path for the snapshot and lock file.
	base_path: PathBuf,
	lock_file: File,
}

impl FileStorage {
	/// Opens (creating if needed) the data directory and takes its lock.
	pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
		std::fs::create_dir_all(&base_path).map_err(|e| {
			StorageError::Backend(format!("Cannot create {}: {}", base_path.display(), e))
		})?;

		let lock_path = base_path.join(LOCK_FILE);
		let lock_file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&lock_path)
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
			StorageError::Backend(format!(
				"Data directory {} is locked by another process",
				base_path.display()
			))
		})?;

		Ok(Self {
			base_path,
			lock_file,
		})
	}

	pub fn base_path(&self) -> &Path {
		&self.base_path
	}

	fn snapshot_path(&self) -> PathBuf {
		self.base_path.join(SNAPSHOT_FILE)
	}
}

impl Drop for FileStorage {
	fn drop(&mut self) {
		if let Err(e) = fs2::FileExt::unlock(&self.lock_file) {
			tracing::warn!(path = %self.base_path.display(), "Failed to release data lock: {}", e);
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn load(&self) -> Result<Option<Tables>, StorageError> {
		let path = self.snapshot_path();
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let tables = serde_json::from_slice(&data).map_err(|e| {
			StorageError::Serialization(format!("{}: {}", path.display(), e))
		})?;
		tracing::info!(path = %path.display(), bytes = data.len(), "Loaded snapshot");
		Ok(Some(tables))
	}

	async fn persist(&self, tables: &Tables) -> Result<(), StorageError> {
		let path = self.snapshot_path();
		let bytes =
			serde_json::to_vec(tables).map_err(|e| StorageError::Serialization(e.to_string()))?;

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(s) if !s.trim().is_empty() => Ok(()),
					_ => Err("storage_path must not be empty".into()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Data directory (default: "./data/prodtrack")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/prodtrack");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
