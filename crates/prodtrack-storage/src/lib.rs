//! Storage module for the prodtrack system.
//!
//! This module provides the transactional store behind the production engine.
//! Backends implement [`StorageInterface`] and only know how to load and
//! persist a whole [`Tables`] snapshot; [`StorageService`] layers serialized
//! write transactions and read snapshots on top of any backend.

use async_trait::async_trait;
use prodtrack_types::{ConfigSchema, ImplementationRegistry};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

mod clock;
mod tables;
mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use tables::Tables;
pub use transaction::Transaction;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Default time to wait for the writer lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The store lock could not be acquired in time. The caller may retry.
	#[error("Timed out after {0:?} waiting for the storage lock")]
	LockTimeout(Duration),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends persist the complete table snapshot on every commit and hand it
/// back when the store is opened.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Loads the last persisted snapshot, or `None` for a fresh store.
	async fn load(&self) -> Result<Option<Tables>, StorageError>;

	/// Durably stores a snapshot. Called with the writer lock held.
	async fn persist(&self, tables: &Tables) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must provide
/// to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Transactional store shared by every engine component.
///
/// Writers are serialized through a single lock: at most one
/// [`Transaction`] is open at a time, and readers see only committed state.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
	tables: RwLock<Tables>,
	lock_timeout: Duration,
	clock: Arc<dyn Clock>,
}

impl StorageService {
	/// Opens a store over `backend`, loading its last persisted snapshot.
	pub async fn open(backend: Box<dyn StorageInterface>) -> Result<Self, StorageError> {
		let tables = backend.load().await?.unwrap_or_default();
		tracing::debug!(
			orders = tables.orders.len(),
			stages = tables.stages.len(),
			history = tables.history.len(),
			"Opened store"
		);
		Ok(Self {
			backend,
			tables: RwLock::new(tables),
			lock_timeout: DEFAULT_LOCK_TIMEOUT,
			clock: Arc::new(SystemClock),
		})
	}

	pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
		self.lock_timeout = lock_timeout;
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn lock_timeout(&self) -> Duration {
		self.lock_timeout
	}

	/// Current time according to the store's clock.
	pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
		self.clock.now()
	}

	/// Opens an exclusive write transaction.
	///
	/// Returns [`StorageError::LockTimeout`] if another transaction holds the
	/// lock for longer than the configured timeout.
	pub async fn begin(&self) -> Result<Transaction<'_>, StorageError> {
		let guard = tokio::time::timeout(self.lock_timeout, self.tables.write())
			.await
			.map_err(|_| StorageError::LockTimeout(self.lock_timeout))?;
		Ok(Transaction::new(guard, self.backend.as_ref(), self.clock.now()))
	}

	/// Runs `f` against a consistent snapshot of the committed tables.
	pub async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StorageError> {
		let guard = tokio::time::timeout(self.lock_timeout, self.tables.read())
			.await
			.map_err(|_| StorageError::LockTimeout(self.lock_timeout))?;
		Ok(f(&*guard))
	}
}
