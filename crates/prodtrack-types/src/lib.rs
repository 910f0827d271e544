//! Common types module for the prodtrack system.
//!
//! This module defines the core data types shared by every prodtrack component:
//! production orders and their status, stage instances attached to orders,
//! audit history records, lifecycle events and configuration validation helpers.

/// Lifecycle event types published after committed transitions.
pub mod events;
/// Audit history records, filters and pagination.
pub mod history;
/// Year-scoped internal order numbers.
pub mod numbering;
/// Production order types including the tagged lifecycle state.
pub mod order;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Stage instances and stage templates.
pub mod stage;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use events::*;
pub use history::*;
pub use numbering::{InternalNumber, InternalNumberError};
pub use order::*;
pub use registry::ImplementationRegistry;
pub use stage::*;
pub use validation::*;

/// Identifier of a customer record held by the external customer catalog.
pub type CustomerId = u64;
/// Identifier of a user (manager, assignee or acting user).
pub type UserId = u64;
/// Identifier of a stage template in the external template catalog.
pub type StageTemplateId = u64;
/// Identifier of a cancel reason in the external reference catalog.
pub type CancelReasonId = u64;
