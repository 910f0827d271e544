//! Core production tracking engine for the prodtrack system.
//!
//! This crate holds the order lifecycle and stage workflow state machines,
//! year-scoped internal numbering, the audit recorder and counter
//! reconciliation. Every mutating operation runs as one transaction against
//! the shared store and publishes its lifecycle events after commit.

pub mod audit;
pub mod builder;
pub mod directory;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod sequence;
pub mod state;
pub mod utils;

pub use builder::{BuilderError, EngineBuilder, EngineFactories};
pub use directory::{DirectoryError, InMemoryDirectory, ReferenceDirectory};
pub use engine::{event_bus::EventBus, ProductionEngine};
pub use error::{EntityKind, LifecycleError};
pub use reconcile::{CounterRepair, ReconcileReport};
pub use state::{OrderProgress, WorkflowPolicy};
