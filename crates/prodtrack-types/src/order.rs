//! Production order types.
//!
//! An order is one customer production request tracked from intake to delivery.
//! Its lifecycle is a single tagged [`OrderState`] so that contradictory
//! combinations (paused and cancelled at once, for example) cannot be represented.

use crate::{CancelReasonId, CustomerId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identity of an order row.
pub type OrderId = Uuid;

/// Represents one production order with its denormalized progress counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: OrderId,
	/// System-generated number (`YYYY-NNNN`), immutable after creation.
	///
	/// Kept as the stored string so that a corrupted value can still be loaded
	/// and reported instead of poisoning the whole snapshot.
	pub internal_number: String,
	/// Optional externally supplied order number, unique when present.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub main_number: Option<String>,
	pub customer_id: CustomerId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub manager_id: Option<UserId>,
	/// Current lifecycle state.
	pub state: OrderState,
	pub planned_completion_date: Option<NaiveDate>,
	/// Stamped when the order reaches Completed.
	pub completion_date: Option<DateTime<Utc>>,
	pub planned_delivery_date: Option<NaiveDate>,
	pub delivery_date: Option<NaiveDate>,
	pub total_amount: Decimal,
	pub paid_amount: Decimal,
	pub is_paid: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	/// Number of stage instances attached to this order.
	pub stages_count: u32,
	/// Number of attached stages in Completed status.
	pub completed_stages_count: u32,
	pub files_count: u32,
	pub comments_count: u32,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Builds a freshly created order in the New state with zeroed counters.
	pub fn new(
		id: OrderId,
		internal_number: String,
		details: OrderDetails,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			id,
			internal_number,
			main_number: details.main_number,
			customer_id: details.customer_id,
			manager_id: details.manager_id,
			state: OrderState::New,
			planned_completion_date: details.planned_completion_date,
			completion_date: None,
			planned_delivery_date: details.planned_delivery_date,
			delivery_date: None,
			total_amount: details.total_amount,
			paid_amount: details.paid_amount,
			is_paid: details.is_paid,
			notes: details.notes,
			stages_count: 0,
			completed_stages_count: 0,
			files_count: 0,
			comments_count: 0,
			created_at: now,
			updated_at: now,
		}
	}

	/// Flat status derived from the tagged state.
	pub fn status(&self) -> OrderStatus {
		self.state.status()
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self.state, OrderState::Cancelled { .. })
	}

	pub fn is_paused(&self) -> bool {
		matches!(self.state, OrderState::InProgress { paused: Some(_) })
	}

	pub fn is_completed(&self) -> bool {
		matches!(self.state, OrderState::Completed)
	}

	pub fn cancel_reason(&self) -> Option<CancelReasonId> {
		match &self.state {
			OrderState::Cancelled { reason, .. } => *reason,
			_ => None,
		}
	}

	pub fn pause_reason(&self) -> Option<&str> {
		match &self.state {
			OrderState::InProgress { paused: Some(pause) } => Some(pause.reason.as_str()),
			_ => None,
		}
	}

	/// `completed_stages_count / stages_count` as a percentage, for display only.
	pub fn completion_percentage(&self) -> f64 {
		if self.stages_count == 0 {
			return 0.0;
		}
		f64::from(self.completed_stages_count) * 100.0 / f64::from(self.stages_count)
	}

	/// True when every attached stage is completed and at least one exists.
	pub fn stages_all_completed(&self) -> bool {
		self.stages_count > 0 && self.completed_stages_count == self.stages_count
	}
}

/// Pause marker carried by an in-progress order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pause {
	pub reason: String,
	pub since: DateTime<Utc>,
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderState {
	/// Created, no stage work started yet.
	New,
	/// Stage work has started; optionally paused.
	InProgress {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		paused: Option<Pause>,
	},
	/// Terminal cancellation with an optional reference to a cancel reason.
	Cancelled {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reason: Option<CancelReasonId>,
		cancelled_at: DateTime<Utc>,
	},
	/// Terminal completion; the order's `completion_date` is stamped.
	Completed,
}

impl OrderState {
	pub fn status(&self) -> OrderStatus {
		match self {
			OrderState::New => OrderStatus::New,
			OrderState::InProgress { paused: None } => OrderStatus::InProgress,
			OrderState::InProgress { paused: Some(_) } => OrderStatus::Paused,
			OrderState::Cancelled { .. } => OrderStatus::Cancelled,
			OrderState::Completed => OrderStatus::Completed,
		}
	}

	/// Active (unpaused) in-progress state.
	pub fn in_progress() -> Self {
		OrderState::InProgress { paused: None }
	}
}

/// Flat order status as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	New,
	InProgress,
	Paused,
	Cancelled,
	Completed,
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::New => write!(f, "New"),
			OrderStatus::InProgress => write!(f, "InProgress"),
			OrderStatus::Paused => write!(f, "Paused"),
			OrderStatus::Cancelled => write!(f, "Cancelled"),
			OrderStatus::Completed => write!(f, "Completed"),
		}
	}
}

/// Caller-supplied details for a new order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDetails {
	pub customer_id: CustomerId,
	#[serde(default)]
	pub manager_id: Option<UserId>,
	#[serde(default)]
	pub main_number: Option<String>,
	#[serde(default)]
	pub planned_completion_date: Option<NaiveDate>,
	#[serde(default)]
	pub planned_delivery_date: Option<NaiveDate>,
	#[serde(default)]
	pub total_amount: Decimal,
	#[serde(default)]
	pub paid_amount: Decimal,
	#[serde(default)]
	pub is_paid: bool,
	#[serde(default)]
	pub notes: Option<String>,
}

/// Partial update of an order's descriptive and financial fields.
///
/// `None` leaves a field untouched. Lifecycle state and counters are never
/// patched directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
	pub main_number: Option<String>,
	pub customer_id: Option<CustomerId>,
	pub manager_id: Option<UserId>,
	pub planned_completion_date: Option<NaiveDate>,
	pub planned_delivery_date: Option<NaiveDate>,
	pub delivery_date: Option<NaiveDate>,
	pub total_amount: Option<Decimal>,
	pub paid_amount: Option<Decimal>,
	pub is_paid: Option<bool>,
	pub notes: Option<String>,
}

impl OrderPatch {
	pub fn is_empty(&self) -> bool {
		self.main_number.is_none()
			&& self.customer_id.is_none()
			&& self.manager_id.is_none()
			&& self.planned_completion_date.is_none()
			&& self.planned_delivery_date.is_none()
			&& self.delivery_date.is_none()
			&& self.total_amount.is_none()
			&& self.paid_amount.is_none()
			&& self.is_paid.is_none()
			&& self.notes.is_none()
	}
}

/// Denormalized attachment counters maintained on the order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentCounter {
	Files,
	Comments,
}

impl fmt::Display for AttachmentCounter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AttachmentCounter::Files => write!(f, "files_count"),
			AttachmentCounter::Comments => write!(f, "comments_count"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_order() -> Order {
		Order::new(
			Uuid::new_v4(),
			"2026-0001".into(),
			OrderDetails {
				customer_id: 1,
				..Default::default()
			},
			Utc::now(),
		)
	}

	#[test]
	fn test_new_order_starts_clean() {
		let order = sample_order();
		assert_eq!(order.status(), OrderStatus::New);
		assert_eq!(order.stages_count, 0);
		assert_eq!(order.completed_stages_count, 0);
		assert!(!order.is_cancelled());
		assert!(!order.is_paused());
		assert!(!order.stages_all_completed());
		assert_eq!(order.completion_percentage(), 0.0);
	}

	#[test]
	fn test_flags_follow_state() {
		let mut order = sample_order();
		order.state = OrderState::InProgress {
			paused: Some(Pause {
				reason: "waiting for glass".into(),
				since: Utc::now(),
			}),
		};
		assert_eq!(order.status(), OrderStatus::Paused);
		assert!(order.is_paused());
		assert_eq!(order.pause_reason(), Some("waiting for glass"));

		order.state = OrderState::Cancelled {
			reason: Some(4),
			cancelled_at: Utc::now(),
		};
		assert!(order.is_cancelled());
		assert!(!order.is_paused());
		assert_eq!(order.cancel_reason(), Some(4));
	}

	#[test]
	fn test_state_serializes_with_status_tag() {
		let value = serde_json::to_value(OrderState::in_progress()).unwrap();
		assert_eq!(value, serde_json::json!({ "status": "in_progress" }));

		let parsed: OrderState = serde_json::from_value(serde_json::json!({ "status": "completed" })).unwrap();
		assert_eq!(parsed, OrderState::Completed);
	}

	#[test]
	fn test_completion_percentage() {
		let mut order = sample_order();
		order.stages_count = 4;
		order.completed_stages_count = 1;
		assert_eq!(order.completion_percentage(), 25.0);
		order.completed_stages_count = 4;
		assert!(order.stages_all_completed());
	}
}
