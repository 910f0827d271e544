//! Error taxonomy shared by every engine operation.

use crate::directory::DirectoryError;
use prodtrack_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
	Order,
	Stage,
	Customer,
	Manager,
	StageTemplate,
	Assignee,
	CancelReason,
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			EntityKind::Order => "Order",
			EntityKind::Stage => "Stage",
			EntityKind::Customer => "Customer",
			EntityKind::Manager => "Manager",
			EntityKind::StageTemplate => "Stage template",
			EntityKind::Assignee => "Assignee",
			EntityKind::CancelReason => "Cancel reason",
		};
		f.write_str(name)
	}
}

/// Errors returned by lifecycle, stage and audit operations.
///
/// Every error is raised before the operation's transaction commits, so a
/// failed call never leaves partial writes.
#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error("{entity} not found: {id}")]
	NotFound { entity: EntityKind, id: String },
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Invalid state: {0}")]
	InvalidState(String),
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Directory error: {0}")]
	Directory(#[from] DirectoryError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl LifecycleError {
	pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
		LifecycleError::NotFound {
			entity,
			id: id.to_string(),
		}
	}

	/// True for failures a caller may simply retry, such as a lock timeout.
	pub fn is_retryable(&self) -> bool {
		matches!(self, LifecycleError::Storage(StorageError::LockTimeout(_)))
	}
}

/// Serializes an audit snapshot, mapping failures into the storage taxonomy.
pub(crate) fn snapshot<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, LifecycleError> {
	serde_json::to_value(value)
		.map_err(|e| LifecycleError::Storage(StorageError::Serialization(e.to_string())))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn test_messages() {
		let err = LifecycleError::not_found(EntityKind::StageTemplate, 7);
		assert_eq!(err.to_string(), "Stage template not found: 7");
		assert!(!err.is_retryable());

		let err = LifecycleError::from(StorageError::LockTimeout(Duration::from_millis(5)));
		assert!(err.is_retryable());
	}
}
