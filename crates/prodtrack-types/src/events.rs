//! Lifecycle events for downstream collaborators.
//!
//! Events are published only after the transaction that produced them has
//! committed. Notification dispatch (email, SMS, chat) subscribes to these
//! events; delivery failures never affect the committed transition.

use crate::{OrderId, OrderStatus, StageId, StageStatus, UserId};
use serde::{Deserialize, Serialize};

/// Events emitted by the order lifecycle and stage workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
	/// A new order was created and numbered.
	OrderCreated {
		order_id: OrderId,
		internal_number: String,
	},
	/// Descriptive or financial fields of an order changed.
	OrderUpdated { order_id: OrderId },
	/// The order moved between lifecycle statuses.
	OrderStatusChanged {
		order_id: OrderId,
		from: OrderStatus,
		to: OrderStatus,
	},
	/// The order was physically removed.
	OrderRemoved { order_id: OrderId },
	/// A stage was attached to an order.
	StageAdded { order_id: OrderId, stage_id: StageId },
	/// A stage moved between statuses.
	StageStatusChanged {
		order_id: OrderId,
		stage_id: StageId,
		from: StageStatus,
		to: StageStatus,
	},
	/// A stage's assignee or comment changed.
	StageAssigned {
		order_id: OrderId,
		stage_id: StageId,
		assignee_id: UserId,
	},
	/// A stage was detached from its order.
	StageRemoved { order_id: OrderId, stage_id: StageId },
}

impl LifecycleEvent {
	/// Order the event belongs to.
	pub fn order_id(&self) -> OrderId {
		match self {
			LifecycleEvent::OrderCreated { order_id, .. }
			| LifecycleEvent::OrderUpdated { order_id }
			| LifecycleEvent::OrderStatusChanged { order_id, .. }
			| LifecycleEvent::OrderRemoved { order_id }
			| LifecycleEvent::StageAdded { order_id, .. }
			| LifecycleEvent::StageStatusChanged { order_id, .. }
			| LifecycleEvent::StageAssigned { order_id, .. }
			| LifecycleEvent::StageRemoved { order_id, .. } => *order_id,
		}
	}
}
