//! State management for orders and their stages.
//!
//! [`OrderLifecycle`] owns the order status machine; [`StageWorkflow`] owns
//! the per-stage machine and keeps the parent order's counters in step. Both
//! run every operation as one storage transaction.

pub mod counters;
pub mod order;
pub mod stage;

pub use order::{OrderLifecycle, OrderProgress};
pub use stage::StageWorkflow;

use crate::error::{EntityKind, LifecycleError};
use prodtrack_config::WorkflowConfig;
use prodtrack_storage::Tables;
use prodtrack_types::{Order, OrderId, OrderState};

/// Lifecycle decisions left to deployment configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowPolicy {
	/// Completed orders may still be cancelled.
	pub allow_cancel_completed: bool,
	/// Completed or Skipped stages may be removed.
	pub allow_terminal_stage_removal: bool,
}

impl From<&WorkflowConfig> for WorkflowPolicy {
	fn from(config: &WorkflowConfig) -> Self {
		Self {
			allow_cancel_completed: config.allow_cancel_completed,
			allow_terminal_stage_removal: config.allow_terminal_stage_removal,
		}
	}
}

/// Clones the committed order row, or fails with NotFound.
pub(crate) fn load_order(tables: &Tables, id: &OrderId) -> Result<Order, LifecycleError> {
	tables
		.order(id)
		.cloned()
		.ok_or_else(|| LifecycleError::not_found(EntityKind::Order, id))
}

/// Stage set changes are refused once an order is cancelled or completed.
pub(crate) fn ensure_open(order: &Order) -> Result<(), LifecycleError> {
	match order.state {
		OrderState::Cancelled { .. } | OrderState::Completed => Err(LifecycleError::InvalidState(
			format!("Order {} is {}", order.internal_number, order.status()),
		)),
		_ => Ok(()),
	}
}

/// Stage work (start, complete, skip) needs a New or running order.
pub(crate) fn ensure_workable(order: &Order) -> Result<(), LifecycleError> {
	match order.state {
		OrderState::New | OrderState::InProgress { paused: None } => Ok(()),
		_ => Err(LifecycleError::InvalidState(format!(
			"Order {} is {}; stage work is not allowed",
			order.internal_number,
			order.status()
		))),
	}
}
