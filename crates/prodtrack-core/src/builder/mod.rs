//! Builder pattern for constructing production engines.
//!
//! Composes a [`ProductionEngine`] from configuration, a storage factory map
//! and optional overrides for the reference directory and clock.

use crate::audit::AuditRecorder;
use crate::directory::{InMemoryDirectory, ReferenceDirectory};
use crate::engine::{event_bus::EventBus, ProductionEngine};
use crate::reconcile::CounterReconciler;
use crate::state::{OrderLifecycle, StageWorkflow, WorkflowPolicy};
use prodtrack_config::Config;
use prodtrack_storage::{Clock, StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Buffered events per subscriber before slow subscribers start lagging.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions needed to build a ProductionEngine.
pub struct EngineFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing a ProductionEngine with pluggable implementations.
pub struct EngineBuilder {
	config: Config,
	directory: Option<Arc<dyn ReferenceDirectory>>,
	clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			directory: None,
			clock: None,
		}
	}

	/// Replaces the directory built from the `[directory]` config section.
	pub fn with_directory(mut self, directory: Arc<dyn ReferenceDirectory>) -> Self {
		self.directory = Some(directory);
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Builds the ProductionEngine using the primary storage implementation.
	pub async fn build<SF>(self, factories: EngineFactories<SF>) -> Result<ProductionEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		// Only the primary backend is opened; the file backend locks its directory.
		let primary = &self.config.storage.primary;
		let storage_config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' has no configuration section",
				primary
			))
		})?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;

		let backend = match factory(storage_config) {
			Ok(backend) => {
				// Validate the configuration using the backend's schema
				if let Err(e) = backend.config_schema().validate(storage_config) {
					tracing::error!(
						component = "storage",
						implementation = %primary,
						error = %e,
						"Invalid configuration for storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Invalid configuration for storage implementation '{}': {}",
						primary, e
					)));
				}
				tracing::info!(component = "storage", implementation = %primary, "Loaded");
				backend
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)));
			},
		};

		let mut storage = StorageService::open(backend)
			.await
			.map_err(|e| BuilderError::Config(format!("Failed to open storage: {}", e)))?
			.with_lock_timeout(self.config.storage.lock_timeout());
		if let Some(clock) = self.clock {
			storage = storage.with_clock(clock);
		}
		let storage = Arc::new(storage);

		let directory: Arc<dyn ReferenceDirectory> = match self.directory {
			Some(directory) => directory,
			None => {
				tracing::info!(
					customers = self.config.directory.customers.len(),
					users = self.config.directory.users.len(),
					stage_templates = self.config.directory.stage_templates.len(),
					"Using configured reference directory"
				);
				Arc::new(InMemoryDirectory::from_config(&self.config.directory))
			},
		};

		let policy = WorkflowPolicy::from(&self.config.workflow);
		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

		let orders = Arc::new(OrderLifecycle::new(
			storage.clone(),
			directory.clone(),
			event_bus.clone(),
			policy,
		));
		let stages = Arc::new(StageWorkflow::new(
			storage.clone(),
			directory,
			event_bus.clone(),
			policy,
		));
		let audit = Arc::new(
			AuditRecorder::new(storage.clone())
				.with_page_sizes(self.config.audit.default_page_size, self.config.audit.max_page_size),
		);
		let reconciler = Arc::new(CounterReconciler::new(storage.clone(), event_bus.clone()));

		tracing::info!(
			service_id = %self.config.service.id,
			?policy,
			"Production engine ready"
		);
		Ok(ProductionEngine::new(
			storage, orders, stages, audit, reconciler, event_bus,
		))
	}
}
