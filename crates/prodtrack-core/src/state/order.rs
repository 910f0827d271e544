//! Order lifecycle state machine.
//!
//! Orders move New -> InProgress -> Completed, may be paused and resumed
//! while in progress, and may be cancelled from any non-terminal state.
//! Every operation checks its preconditions, mutates the order, and writes
//! its audit record in one transaction; events go out only after commit.

use super::{counters, load_order, WorkflowPolicy};
use crate::audit::{changed_fields, AuditRecorder};
use crate::directory::{self, ReferenceDirectory};
use crate::engine::event_bus::EventBus;
use crate::error::{snapshot, EntityKind, LifecycleError};
use crate::sequence::SequenceGenerator;
use crate::utils::truncate_id;
use chrono::Datelike;
use once_cell::sync::Lazy;
use prodtrack_storage::{StorageService, Transaction};
use prodtrack_types::{
	Actor, AttachmentCounter, CancelReasonId, EntityType, HistoryAction, LifecycleEvent,
	NewHistoryEntry, Order, OrderDetails, OrderId, OrderPatch, OrderState, OrderStatus, Pause,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Completion progress of one order, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderProgress {
	pub order_id: OrderId,
	pub status: OrderStatus,
	pub stages_count: u32,
	pub completed_stages_count: u32,
	pub completion_percentage: f64,
}

/// Manages order status transitions and the order row itself.
pub struct OrderLifecycle {
	storage: Arc<StorageService>,
	directory: Arc<dyn ReferenceDirectory>,
	events: EventBus,
	policy: WorkflowPolicy,
}

impl OrderLifecycle {
	pub fn new(
		storage: Arc<StorageService>,
		directory: Arc<dyn ReferenceDirectory>,
		events: EventBus,
		policy: WorkflowPolicy,
	) -> Self {
		Self {
			storage,
			directory,
			events,
			policy,
		}
	}

	/// Checks a status move against the transition table and policy.
	fn ensure_transition(
		policy: WorkflowPolicy,
		from: OrderStatus,
		to: OrderStatus,
	) -> Result<(), LifecycleError> {
		// Static transition table - each status maps to allowed next statuses
		static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(
				OrderStatus::New,
				HashSet::from([
					OrderStatus::InProgress,
					OrderStatus::Cancelled,
					OrderStatus::Completed,
				]),
			);
			m.insert(
				OrderStatus::InProgress,
				HashSet::from([
					OrderStatus::Paused,
					OrderStatus::Cancelled,
					OrderStatus::Completed,
				]),
			);
			m.insert(
				OrderStatus::Paused,
				HashSet::from([OrderStatus::InProgress, OrderStatus::Cancelled]),
			);
			m.insert(OrderStatus::Completed, HashSet::from([OrderStatus::Cancelled]));
			m.insert(OrderStatus::Cancelled, HashSet::new()); // terminal
			m
		});

		if from == to {
			return Err(LifecycleError::InvalidState(format!(
				"Order is already {}",
				from
			)));
		}
		let allowed = TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to));
		let by_policy = from != OrderStatus::Completed || policy.allow_cancel_completed;
		if !allowed || !by_policy {
			return Err(LifecycleError::InvalidState(format!(
				"Cannot move order from {} to {}",
				from, to
			)));
		}
		Ok(())
	}

	/// Moves `order` to `state`, writing the StatusChange record.
	///
	/// The caller stores the order row afterwards.
	fn transition(
		tx: &mut Transaction<'_>,
		policy: WorkflowPolicy,
		actor: Actor,
		order: &mut Order,
		state: OrderState,
		description: &str,
	) -> Result<LifecycleEvent, LifecycleError> {
		let from = order.status();
		let to = state.status();
		Self::ensure_transition(policy, from, to)?;

		let old_values = snapshot(&order.state)?;
		order.state = state;
		if to == OrderStatus::Completed {
			order.completion_date = Some(tx.now());
		}
		order.updated_at = tx.now();

		AuditRecorder::record(
			tx,
			NewHistoryEntry::new(actor, HistoryAction::StatusChange, EntityType::Order, order.id)
				.old_values(old_values)
				.new_values(snapshot(&order.state)?)
				.description(format!("{} -> {}: {}", from, to, description)),
		);
		tracing::info!(
			order_id = %truncate_id(&order.id),
			internal_number = %order.internal_number,
			%from,
			%to,
			"Order status changed"
		);

		Ok(LifecycleEvent::OrderStatusChanged {
			order_id: order.id,
			from,
			to,
		})
	}

	/// Promotes a New order to InProgress when stage work begins.
	pub(crate) fn promote_if_new(
		tx: &mut Transaction<'_>,
		actor: Actor,
		order: &mut Order,
	) -> Result<Option<LifecycleEvent>, LifecycleError> {
		if order.state != OrderState::New {
			return Ok(None);
		}
		Self::transition(
			tx,
			WorkflowPolicy::default(),
			actor,
			order,
			OrderState::in_progress(),
			"stage work started",
		)
		.map(Some)
	}

	/// Completes the order once every attached stage is completed.
	///
	/// Applies only to New or running orders; a paused order is completed
	/// when it resumes.
	pub(crate) fn auto_complete_if_ready(
		tx: &mut Transaction<'_>,
		order: &mut Order,
	) -> Result<Option<LifecycleEvent>, LifecycleError> {
		let eligible = matches!(
			order.state,
			OrderState::New | OrderState::InProgress { paused: None }
		);
		if !eligible || !order.stages_all_completed() {
			return Ok(None);
		}
		Self::transition(
			tx,
			WorkflowPolicy::default(),
			Actor::System,
			order,
			OrderState::Completed,
			"all stages completed",
		)
		.map(Some)
	}

	fn validate_amounts(
		total: Option<Decimal>,
		paid: Option<Decimal>,
	) -> Result<(), LifecycleError> {
		for (field, value) in [("total_amount", total), ("paid_amount", paid)] {
			if value.is_some_and(|v| v.is_sign_negative() && !v.is_zero()) {
				return Err(LifecycleError::Validation(format!(
					"{} must not be negative",
					field
				)));
			}
		}
		Ok(())
	}

	fn normalize_main_number(main_number: Option<String>) -> Result<Option<String>, LifecycleError> {
		match main_number {
			Some(number) if number.trim().is_empty() => Err(LifecycleError::Validation(
				"main_number must not be blank".into(),
			)),
			Some(number) => Ok(Some(number.trim().to_string())),
			None => Ok(None),
		}
	}

	fn ensure_main_number_free(
		tx: &Transaction<'_>,
		main_number: Option<&str>,
		owner: Option<OrderId>,
	) -> Result<(), LifecycleError> {
		let Some(main_number) = main_number else {
			return Ok(());
		};
		match tx.order_by_main_number(main_number) {
			Some(existing) if Some(existing.id) != owner => Err(LifecycleError::Conflict(format!(
				"Main number {} is already used by order {}",
				main_number, existing.internal_number
			))),
			_ => Ok(()),
		}
	}

	/// Creates a New order with a freshly allocated internal number.
	#[instrument(skip_all, fields(customer_id = details.customer_id))]
	pub async fn create(&self, actor: Actor, details: OrderDetails) -> Result<Order, LifecycleError> {
		let mut details = details;
		details.main_number = Self::normalize_main_number(details.main_number)?;
		Self::validate_amounts(Some(details.total_amount), Some(details.paid_amount))?;
		directory::require_customer(self.directory.as_ref(), details.customer_id).await?;
		if let Some(manager_id) = details.manager_id {
			directory::require_user(self.directory.as_ref(), manager_id, EntityKind::Manager)
				.await?;
		}

		let mut tx = self.storage.begin().await?;
		Self::ensure_main_number_free(&tx, details.main_number.as_deref(), None)?;

		let now = tx.now();
		let number = SequenceGenerator::allocate(&mut tx, now.year())?;
		let order = Order::new(Uuid::new_v4(), number.to_string(), details, now);
		tx.put_order(order.clone());
		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::Create, EntityType::Order, order.id)
				.new_values(snapshot(&order)?)
				.description(format!("Order {} created", order.internal_number)),
		);
		tx.commit().await?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			internal_number = %order.internal_number,
			"Order created"
		);
		self.events
			.publish(LifecycleEvent::OrderCreated {
				order_id: order.id,
				internal_number: order.internal_number.clone(),
			})
			.ok();
		Ok(order)
	}

	/// Applies a patch to descriptive and financial fields.
	///
	/// Only changed fields are audited; a patch that changes nothing writes
	/// nothing and returns the current order.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id)))]
	pub async fn update(
		&self,
		actor: Actor,
		id: OrderId,
		patch: OrderPatch,
	) -> Result<Order, LifecycleError> {
		let mut patch = patch;
		patch.main_number = Self::normalize_main_number(patch.main_number)?;
		Self::validate_amounts(patch.total_amount, patch.paid_amount)?;
		if let Some(customer_id) = patch.customer_id {
			directory::require_customer(self.directory.as_ref(), customer_id).await?;
		}
		if let Some(manager_id) = patch.manager_id {
			directory::require_user(self.directory.as_ref(), manager_id, EntityKind::Manager)
				.await?;
		}

		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &id)?;
		if patch.is_empty() {
			return Ok(order);
		}
		Self::ensure_main_number_free(&tx, patch.main_number.as_deref(), Some(id))?;

		let before = snapshot(&order)?;
		let OrderPatch {
			main_number,
			customer_id,
			manager_id,
			planned_completion_date,
			planned_delivery_date,
			delivery_date,
			total_amount,
			paid_amount,
			is_paid,
			notes,
		} = patch;
		if main_number.is_some() {
			order.main_number = main_number;
		}
		if let Some(customer_id) = customer_id {
			order.customer_id = customer_id;
		}
		if manager_id.is_some() {
			order.manager_id = manager_id;
		}
		if planned_completion_date.is_some() {
			order.planned_completion_date = planned_completion_date;
		}
		if planned_delivery_date.is_some() {
			order.planned_delivery_date = planned_delivery_date;
		}
		if delivery_date.is_some() {
			order.delivery_date = delivery_date;
		}
		if let Some(total_amount) = total_amount {
			order.total_amount = total_amount;
		}
		if let Some(paid_amount) = paid_amount {
			order.paid_amount = paid_amount;
		}
		if let Some(is_paid) = is_paid {
			order.is_paid = is_paid;
		}
		if notes.is_some() {
			order.notes = notes;
		}

		let Some((old_values, new_values)) =
			changed_fields(&before, &snapshot(&order)?, &["updated_at"])
		else {
			return Ok(order);
		};
		order.updated_at = tx.now();
		tx.put_order(order.clone());
		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::Update, EntityType::Order, id)
				.old_values(old_values)
				.new_values(new_values),
		);
		tx.commit().await?;

		self.events
			.publish(LifecycleEvent::OrderUpdated { order_id: id })
			.ok();
		Ok(order)
	}

	/// Cancels an order with an optional reference to a cancel reason.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id)))]
	pub async fn cancel(
		&self,
		actor: Actor,
		id: OrderId,
		reason: Option<CancelReasonId>,
	) -> Result<Order, LifecycleError> {
		if let Some(reason) = reason {
			directory::require_cancel_reason(self.directory.as_ref(), reason).await?;
		}

		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &id)?;
		let cancelled_at = tx.now();
		let event = Self::transition(
			&mut tx,
			self.policy,
			actor,
			&mut order,
			OrderState::Cancelled {
				reason,
				cancelled_at,
			},
			"cancelled",
		)?;
		tx.put_order(order.clone());
		tx.commit().await?;

		self.events.publish(event).ok();
		Ok(order)
	}

	/// Pauses a running order.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id)))]
	pub async fn pause(&self, actor: Actor, id: OrderId, reason: &str) -> Result<Order, LifecycleError> {
		let reason = reason.trim();
		if reason.is_empty() {
			return Err(LifecycleError::Validation(
				"A pause reason is required".into(),
			));
		}

		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &id)?;
		let since = tx.now();
		let event = Self::transition(
			&mut tx,
			self.policy,
			actor,
			&mut order,
			OrderState::InProgress {
				paused: Some(Pause {
					reason: reason.to_string(),
					since,
				}),
			},
			reason,
		)?;
		tx.put_order(order.clone());
		tx.commit().await?;

		self.events.publish(event).ok();
		Ok(order)
	}

	/// Resumes a paused order, completing it if its stages finished meanwhile.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id)))]
	pub async fn resume(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &id)?;
		if !order.is_paused() {
			return Err(LifecycleError::InvalidState(format!(
				"Order {} is not paused ({})",
				order.internal_number,
				order.status()
			)));
		}

		let mut events = vec![Self::transition(
			&mut tx,
			self.policy,
			actor,
			&mut order,
			OrderState::in_progress(),
			"resumed",
		)?];
		events.extend(Self::auto_complete_if_ready(&mut tx, &mut order)?);
		tx.put_order(order.clone());
		tx.commit().await?;

		self.events.publish_all(events);
		Ok(order)
	}

	/// Explicitly completes a New or running order.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id)))]
	pub async fn complete(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &id)?;
		let event = Self::transition(
			&mut tx,
			self.policy,
			actor,
			&mut order,
			OrderState::Completed,
			"completed explicitly",
		)?;
		tx.put_order(order.clone());
		tx.commit().await?;

		self.events.publish(event).ok();
		Ok(order)
	}

	/// Physically removes an order and its stages.
	///
	/// Idempotent: returns `false` without writing anything when the order
	/// does not exist.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id)))]
	pub async fn remove(&self, actor: Actor, id: OrderId) -> Result<bool, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let Some(order) = tx.order(&id).cloned() else {
			tracing::debug!("Order already absent");
			return Ok(false);
		};

		let stage_ids: Vec<_> = tx.stages_of(&id).iter().map(|s| s.id).collect();
		for stage_id in &stage_ids {
			tx.delete_stage(stage_id);
		}
		tx.delete_order(&id);
		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::Delete, EntityType::Order, id)
				.old_values(snapshot(&order)?)
				.description(format!(
					"Order {} removed with {} stage(s)",
					order.internal_number,
					stage_ids.len()
				)),
		);
		tx.commit().await?;

		tracing::info!(internal_number = %order.internal_number, "Order removed");
		self.events
			.publish(LifecycleEvent::OrderRemoved { order_id: id })
			.ok();
		Ok(true)
	}

	pub async fn get(&self, id: OrderId) -> Result<Order, LifecycleError> {
		self.storage.read(|tables| load_order(tables, &id)).await?
	}

	pub async fn progress(&self, id: OrderId) -> Result<OrderProgress, LifecycleError> {
		let order = self.get(id).await?;
		Ok(OrderProgress {
			order_id: order.id,
			status: order.status(),
			stages_count: order.stages_count,
			completed_stages_count: order.completed_stages_count,
			completion_percentage: order.completion_percentage(),
		})
	}

	/// Adjusts the file or comment counter by `delta`.
	#[instrument(skip_all, fields(order_id = %truncate_id(&id), %counter))]
	pub async fn record_attachment(
		&self,
		actor: Actor,
		id: OrderId,
		counter: AttachmentCounter,
		delta: i32,
	) -> Result<Order, LifecycleError> {
		if delta == 0 {
			return Err(LifecycleError::Validation(
				"Attachment delta must not be zero".into(),
			));
		}

		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &id)?;
		let (old, new) = counters::adjust_attachment(&mut order, counter, delta)?;
		order.updated_at = tx.now();
		tx.put_order(order.clone());
		let field = counter.to_string();
		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::CounterAdjust, EntityType::Order, id)
				.old_values(json!({ field.as_str(): old }))
				.new_values(json!({ field.as_str(): new })),
		);
		tx.commit().await?;

		self.events
			.publish(LifecycleEvent::OrderUpdated { order_id: id })
			.ok();
		Ok(order)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transition_table() {
		let policy = WorkflowPolicy::default();
		let ok = |from, to| OrderLifecycle::ensure_transition(policy, from, to).is_ok();

		assert!(ok(OrderStatus::New, OrderStatus::InProgress));
		assert!(ok(OrderStatus::New, OrderStatus::Completed));
		assert!(ok(OrderStatus::InProgress, OrderStatus::Paused));
		assert!(ok(OrderStatus::Paused, OrderStatus::InProgress));
		assert!(ok(OrderStatus::Paused, OrderStatus::Cancelled));
		assert!(!ok(OrderStatus::New, OrderStatus::Paused));
		assert!(!ok(OrderStatus::Paused, OrderStatus::Completed));
		assert!(!ok(OrderStatus::Cancelled, OrderStatus::Paused));
		assert!(!ok(OrderStatus::Cancelled, OrderStatus::Cancelled));
		assert!(!ok(OrderStatus::Completed, OrderStatus::Cancelled));
	}

	#[test]
	fn test_cancel_completed_is_a_policy() {
		let policy = WorkflowPolicy {
			allow_cancel_completed: true,
			..Default::default()
		};
		assert!(
			OrderLifecycle::ensure_transition(policy, OrderStatus::Completed, OrderStatus::Cancelled)
				.is_ok()
		);
		assert!(
			OrderLifecycle::ensure_transition(policy, OrderStatus::Completed, OrderStatus::InProgress)
				.is_err()
		);
	}

	#[test]
	fn test_amount_validation() {
		assert!(OrderLifecycle::validate_amounts(Some(Decimal::new(-1, 2)), None).is_err());
		assert!(OrderLifecycle::validate_amounts(Some(Decimal::ZERO), Some(Decimal::new(5, 0))).is_ok());
	}
}
