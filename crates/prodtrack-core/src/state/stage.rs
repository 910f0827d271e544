//! Stage workflow engine.
//!
//! Stage instances follow Pending -> InProgress -> {Completed | Skipped}.
//! Every stage mutation updates the parent order's counters in the same
//! transaction and, where it can change the outcome, runs the order's
//! auto-completion check before committing.

use super::{counters, ensure_open, ensure_workable, load_order, OrderLifecycle, WorkflowPolicy};
use crate::audit::AuditRecorder;
use crate::directory::{self, ReferenceDirectory};
use crate::engine::event_bus::EventBus;
use crate::error::{snapshot, EntityKind, LifecycleError};
use crate::utils::truncate_id;
use once_cell::sync::Lazy;
use prodtrack_storage::{StorageService, Tables, Transaction};
use prodtrack_types::{
	elapsed_hours, is_valid_duration_hours, Actor, EntityType, HistoryAction, LifecycleEvent,
	NewHistoryEntry, NewStage, Order, OrderId, OrderStage, StageId, StageStatus, UserId,
	MAX_STAGE_DURATION_HOURS,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Manages stage instances and their effect on the parent order.
pub struct StageWorkflow {
	storage: Arc<StorageService>,
	directory: Arc<dyn ReferenceDirectory>,
	events: EventBus,
	policy: WorkflowPolicy,
}

/// Checks if a stage status move is valid.
fn is_valid_transition(from: StageStatus, to: StageStatus) -> bool {
	static TRANSITIONS: Lazy<HashMap<StageStatus, HashSet<StageStatus>>> = Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(
			StageStatus::Pending,
			HashSet::from([
				StageStatus::InProgress,
				StageStatus::Completed,
				StageStatus::Skipped,
			]),
		);
		m.insert(
			StageStatus::InProgress,
			HashSet::from([StageStatus::Completed, StageStatus::Skipped]),
		);
		m.insert(StageStatus::Completed, HashSet::new()); // terminal
		m.insert(StageStatus::Skipped, HashSet::new()); // terminal
		m
	});

	TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
}

fn ensure_stage_transition(stage: &OrderStage, to: StageStatus) -> Result<(), LifecycleError> {
	if is_valid_transition(stage.status, to) {
		return Ok(());
	}
	let message = if stage.status.is_terminal() {
		format!("Stage {} is already {}", stage.name, stage.status)
	} else {
		format!("Cannot move stage {} from {} to {}", stage.name, stage.status, to)
	};
	Err(LifecycleError::InvalidState(message))
}

/// Loads a stage, failing with NotFound if it is absent or belongs to another order.
fn load_stage(
	tables: &Tables,
	order_id: &OrderId,
	stage_id: &StageId,
) -> Result<OrderStage, LifecycleError> {
	tables
		.stage(stage_id)
		.filter(|s| &s.order_id == order_id)
		.cloned()
		.ok_or_else(|| LifecycleError::not_found(EntityKind::Stage, stage_id))
}

fn blank_to_none(text: Option<String>) -> Option<String> {
	text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

impl StageWorkflow {
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

	/// Moves a stage to `to`, stamps it, and writes its history row.
	fn apply(
		tx: &mut Transaction<'_>,
		actor: Actor,
		stage: &mut OrderStage,
		to: StageStatus,
		action: HistoryAction,
		extra: serde_json::Value,
	) -> Result<LifecycleEvent, LifecycleError> {
		ensure_stage_transition(stage, to)?;
		let from = stage.status;
		let now = tx.now();
		stage.status = to;
		stage.updated_at = now;

		let mut new_values = json!({ "status": to });
		if let (Some(target), Some(extra)) = (new_values.as_object_mut(), extra.as_object()) {
			for (key, value) in extra {
				target.insert(key.clone(), value.clone());
			}
		}
		AuditRecorder::record(
			tx,
			NewHistoryEntry::new(actor, action, EntityType::OrderStage, stage.id)
				.old_values(json!({ "status": from }))
				.new_values(new_values)
				.description(format!("Stage {}: {} -> {}", stage.name, from, to)),
		);

		Ok(LifecycleEvent::StageStatusChanged {
			order_id: stage.order_id,
			stage_id: stage.id,
			from,
			to,
		})
	}

	/// Stores both rows, commits, then publishes.
	async fn finish(
		&self,
		mut tx: Transaction<'_>,
		order: Order,
		stage: Option<OrderStage>,
		events: Vec<LifecycleEvent>,
	) -> Result<(), LifecycleError> {
		counters::check(&order)?;
		if let Some(stage) = stage {
			tx.put_stage(stage);
		}
		tx.put_order(order);
		tx.commit().await?;
		self.events.publish_all(events);
		Ok(())
	}

	/// Attaches a stage template to an order as a new Pending stage.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order_id), template_id = new.template_id))]
	pub async fn add(
		&self,
		actor: Actor,
		order_id: OrderId,
		new: NewStage,
	) -> Result<OrderStage, LifecycleError> {
		if new
			.estimated_duration_hours
			.is_some_and(|h| !is_valid_duration_hours(h))
		{
			return Err(LifecycleError::Validation(format!(
				"estimated_duration_hours must be between 0 and {}",
				MAX_STAGE_DURATION_HOURS
			)));
		}
		let template = directory::require_template(self.directory.as_ref(), new.template_id).await?;
		if let Some(assignee_id) = new.assignee_id {
			directory::require_user(self.directory.as_ref(), assignee_id, EntityKind::Assignee)
				.await?;
		}

		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &order_id)?;
		ensure_open(&order)?;

		let now = tx.now();
		let stage = OrderStage {
			id: Uuid::new_v4(),
			order_id,
			template_id: template.id,
			name: template.name.clone(),
			position: tx.next_stage_position(&order_id),
			status: StageStatus::Pending,
			started_at: None,
			completed_at: None,
			estimated_duration_hours: new
				.estimated_duration_hours
				.or(template.default_duration_hours.filter(|h| is_valid_duration_hours(*h))),
			actual_duration_hours: None,
			assignee_id: new.assignee_id,
			comment: blank_to_none(new.comment),
			is_critical_path: new.is_critical_path.unwrap_or(template.is_critical_path),
			skip_reason: None,
			created_at: now,
			updated_at: now,
		};
		counters::stage_added(&mut order)?;
		order.updated_at = now;

		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::StageAdd, EntityType::OrderStage, stage.id)
				.new_values(snapshot(&stage)?)
				.description(format!(
					"Stage {} added to order {}",
					stage.name, order.internal_number
				)),
		);
		tracing::info!(
			stage_id = %truncate_id(&stage.id),
			name = %stage.name,
			stages_count = order.stages_count,
			"Stage added"
		);

		let event = LifecycleEvent::StageAdded {
			order_id,
			stage_id: stage.id,
		};
		self.finish(tx, order, Some(stage.clone()), vec![event])
			.await?;
		Ok(stage)
	}

	/// Starts a stage, promoting a New order to InProgress.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order_id), stage_id = %truncate_id(&stage_id)))]
	pub async fn start(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
	) -> Result<OrderStage, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &order_id)?;
		let mut stage = load_stage(&tx, &order_id, &stage_id)?;
		ensure_workable(&order)?;

		let now = tx.now();
		let mut events = vec![Self::apply(
			&mut tx,
			actor,
			&mut stage,
			StageStatus::InProgress,
			HistoryAction::StageStart,
			json!({ "started_at": now }),
		)?];
		stage.started_at = Some(now);
		events.extend(OrderLifecycle::promote_if_new(&mut tx, actor, &mut order)?);
		order.updated_at = now;

		self.finish(tx, order, Some(stage.clone()), events).await?;
		Ok(stage)
	}

	/// Completes a stage and runs the order's auto-completion check.
	///
	/// A stage that was never started completes without an actual duration.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order_id), stage_id = %truncate_id(&stage_id)))]
	pub async fn complete(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
	) -> Result<OrderStage, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &order_id)?;
		let mut stage = load_stage(&tx, &order_id, &stage_id)?;
		ensure_workable(&order)?;

		let now = tx.now();
		let actual = stage.started_at.map(|started| elapsed_hours(started, now));
		let mut events = vec![Self::apply(
			&mut tx,
			actor,
			&mut stage,
			StageStatus::Completed,
			HistoryAction::StageComplete,
			json!({ "completed_at": now, "actual_duration_hours": actual }),
		)?];
		stage.completed_at = Some(now);
		stage.actual_duration_hours = actual;

		counters::stage_completed(&mut order)?;
		order.updated_at = now;
		events.extend(OrderLifecycle::promote_if_new(&mut tx, actor, &mut order)?);
		events.extend(OrderLifecycle::auto_complete_if_ready(&mut tx, &mut order)?);
		tracing::info!(
			completed = order.completed_stages_count,
			of = order.stages_count,
			"Stage completed"
		);

		self.finish(tx, order, Some(stage.clone()), events).await?;
		Ok(stage)
	}

	/// Skips a stage. Skipped stages never count as completed.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order_id), stage_id = %truncate_id(&stage_id)))]
	pub async fn skip(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
		reason: Option<String>,
	) -> Result<OrderStage, LifecycleError> {
		let reason = blank_to_none(reason);
		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &order_id)?;
		let mut stage = load_stage(&tx, &order_id, &stage_id)?;
		ensure_workable(&order)?;

		let event = Self::apply(
			&mut tx,
			actor,
			&mut stage,
			StageStatus::Skipped,
			HistoryAction::StageSkip,
			json!({ "skip_reason": reason }),
		)?;
		stage.skip_reason = reason;
		order.updated_at = tx.now();

		self.finish(tx, order, Some(stage.clone()), vec![event])
			.await?;
		Ok(stage)
	}

	/// Sets a stage's assignee and comment without changing its status.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order_id), stage_id = %truncate_id(&stage_id), assignee_id = assignee_id))]
	pub async fn assign(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
		assignee_id: UserId,
		comment: Option<String>,
	) -> Result<OrderStage, LifecycleError> {
		directory::require_user(self.directory.as_ref(), assignee_id, EntityKind::Assignee)
			.await?;

		let mut tx = self.storage.begin().await?;
		let order = load_order(&tx, &order_id)?;
		let mut stage = load_stage(&tx, &order_id, &stage_id)?;
		ensure_open(&order)?;

		let old_values = json!({ "assignee_id": stage.assignee_id, "comment": stage.comment });
		stage.assignee_id = Some(assignee_id);
		if let Some(comment) = comment {
			stage.comment = blank_to_none(Some(comment));
		}
		stage.updated_at = tx.now();
		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::StageAssign, EntityType::OrderStage, stage_id)
				.old_values(old_values)
				.new_values(json!({ "assignee_id": stage.assignee_id, "comment": stage.comment })),
		);

		tx.put_stage(stage.clone());
		tx.commit().await?;
		self.events
			.publish(LifecycleEvent::StageAssigned {
				order_id,
				stage_id,
				assignee_id,
			})
			.ok();
		Ok(stage)
	}

	/// Detaches a stage from its order and rebalances the counters.
	///
	/// Completed and Skipped stages are only removable when the workflow
	/// policy allows it. Removing the last unfinished stage can complete
	/// the order.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order_id), stage_id = %truncate_id(&stage_id)))]
	pub async fn remove(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
	) -> Result<OrderStage, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let mut order = load_order(&tx, &order_id)?;
		let stage = load_stage(&tx, &order_id, &stage_id)?;
		ensure_open(&order)?;
		if stage.status.is_terminal() && !self.policy.allow_terminal_stage_removal {
			return Err(LifecycleError::InvalidState(format!(
				"Stage {} is {} and cannot be removed",
				stage.name, stage.status
			)));
		}

		tx.delete_stage(&stage_id);
		counters::stage_removed(&mut order, stage.status == StageStatus::Completed)?;
		order.updated_at = tx.now();
		AuditRecorder::record(
			&mut tx,
			NewHistoryEntry::new(actor, HistoryAction::StageRemove, EntityType::OrderStage, stage_id)
				.old_values(snapshot(&stage)?)
				.description(format!(
					"Stage {} removed from order {}",
					stage.name, order.internal_number
				)),
		);

		let mut events = vec![LifecycleEvent::StageRemoved { order_id, stage_id }];
		events.extend(OrderLifecycle::auto_complete_if_ready(&mut tx, &mut order)?);
		self.finish(tx, order, None, events).await?;
		Ok(stage)
	}

	/// Stages of an order in attachment order.
	pub async fn list(&self, order_id: OrderId) -> Result<Vec<OrderStage>, LifecycleError> {
		self.storage
			.read(|tables| {
				load_order(tables, &order_id)?;
				Ok(tables
					.stages_of(&order_id)
					.into_iter()
					.cloned()
					.collect())
			})
			.await?
	}

	pub async fn get(&self, order_id: OrderId, stage_id: StageId) -> Result<OrderStage, LifecycleError> {
		self.storage
			.read(|tables| load_stage(tables, &order_id, &stage_id))
			.await?
	}
}
