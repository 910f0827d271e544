//! Production tracking engine.
//!
//! [`ProductionEngine`] is the single entry point callers use. It wires the
//! order lifecycle, stage workflow, audit recorder and counter reconciler to
//! one shared store and one event bus, and exposes their operations.

use crate::audit::AuditRecorder;
use crate::reconcile::{CounterReconciler, ReconcileReport};
use crate::state::{OrderLifecycle, OrderProgress, StageWorkflow};
use crate::LifecycleError;
use chrono::{DateTime, Utc};
use prodtrack_storage::StorageService;
use prodtrack_types::{
	Actor, AttachmentCounter, CancelReasonId, EntityType, HistoryEntry, HistoryFilter,
	HistoryStats, LifecycleEvent, NewStage, Order, OrderDetails, OrderId, OrderPatch,
	OrderStage, Page, Pagination, StageId, UserId,
};
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod event_bus;

/// Facade over every production tracking operation.
#[derive(Clone)]
pub struct ProductionEngine {
	/// Transactional store shared by all components.
	pub(crate) storage: Arc<StorageService>,
	pub(crate) orders: Arc<OrderLifecycle>,
	pub(crate) stages: Arc<StageWorkflow>,
	pub(crate) audit: Arc<AuditRecorder>,
	pub(crate) reconciler: Arc<CounterReconciler>,
	/// Lifecycle events, published after each commit.
	pub(crate) event_bus: event_bus::EventBus,
}

impl ProductionEngine {
	pub fn new(
		storage: Arc<StorageService>,
		orders: Arc<OrderLifecycle>,
		stages: Arc<StageWorkflow>,
		audit: Arc<AuditRecorder>,
		reconciler: Arc<CounterReconciler>,
		event_bus: event_bus::EventBus,
	) -> Self {
		Self {
			storage,
			orders,
			stages,
			audit,
			reconciler,
			event_bus,
		}
	}

	// Orders

	pub async fn create_order(&self, actor: Actor, details: OrderDetails) -> Result<Order, LifecycleError> {
		self.orders.create(actor, details).await
	}

	pub async fn update_order(
		&self,
		actor: Actor,
		id: OrderId,
		patch: OrderPatch,
	) -> Result<Order, LifecycleError> {
		self.orders.update(actor, id, patch).await
	}

	pub async fn cancel_order(
		&self,
		actor: Actor,
		id: OrderId,
		reason: Option<CancelReasonId>,
	) -> Result<Order, LifecycleError> {
		self.orders.cancel(actor, id, reason).await
	}

	pub async fn pause_order(&self, actor: Actor, id: OrderId, reason: &str) -> Result<Order, LifecycleError> {
		self.orders.pause(actor, id, reason).await
	}

	pub async fn resume_order(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders.resume(actor, id).await
	}

	pub async fn complete_order(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders.complete(actor, id).await
	}

	/// Returns `false` when the order was already absent.
	pub async fn remove_order(&self, actor: Actor, id: OrderId) -> Result<bool, LifecycleError> {
		self.orders.remove(actor, id).await
	}

	pub async fn get_order(&self, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders.get(id).await
	}

	pub async fn order_progress(&self, id: OrderId) -> Result<OrderProgress, LifecycleError> {
		self.orders.progress(id).await
	}

	// Attachments

	pub async fn file_attached(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders
			.record_attachment(actor, id, AttachmentCounter::Files, 1)
			.await
	}

	pub async fn file_detached(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders
			.record_attachment(actor, id, AttachmentCounter::Files, -1)
			.await
	}

	pub async fn comment_added(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders
			.record_attachment(actor, id, AttachmentCounter::Comments, 1)
			.await
	}

	pub async fn comment_removed(&self, actor: Actor, id: OrderId) -> Result<Order, LifecycleError> {
		self.orders
			.record_attachment(actor, id, AttachmentCounter::Comments, -1)
			.await
	}

	// Stages

	pub async fn add_stage(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage: NewStage,
	) -> Result<OrderStage, LifecycleError> {
		self.stages.add(actor, order_id, stage).await
	}

	pub async fn start_stage(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
	) -> Result<OrderStage, LifecycleError> {
		self.stages.start(actor, order_id, stage_id).await
	}

	pub async fn complete_stage(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
	) -> Result<OrderStage, LifecycleError> {
		self.stages.complete(actor, order_id, stage_id).await
	}

	pub async fn skip_stage(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
		reason: Option<String>,
	) -> Result<OrderStage, LifecycleError> {
		self.stages.skip(actor, order_id, stage_id, reason).await
	}

	pub async fn assign_stage(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
		assignee_id: UserId,
		comment: Option<String>,
	) -> Result<OrderStage, LifecycleError> {
		self.stages
			.assign(actor, order_id, stage_id, assignee_id, comment)
			.await
	}

	pub async fn remove_stage(
		&self,
		actor: Actor,
		order_id: OrderId,
		stage_id: StageId,
	) -> Result<OrderStage, LifecycleError> {
		self.stages.remove(actor, order_id, stage_id).await
	}

	pub async fn list_stages(&self, order_id: OrderId) -> Result<Vec<OrderStage>, LifecycleError> {
		self.stages.list(order_id).await
	}

	pub async fn get_stage(&self, order_id: OrderId, stage_id: StageId) -> Result<OrderStage, LifecycleError> {
		self.stages.get(order_id, stage_id).await
	}

	// History

	pub async fn list_history(
		&self,
		filter: &HistoryFilter,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		self.audit.list(filter, pagination).await
	}

	pub async fn history_for_entity(
		&self,
		entity_type: EntityType,
		entity_id: &str,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		self.audit.for_entity(entity_type, entity_id, pagination).await
	}

	pub async fn history_by_actor(
		&self,
		actor: Actor,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		self.audit.by_actor(actor, pagination).await
	}

	pub async fn history_in_range(
		&self,
		from: DateTime<Utc>,
		to: DateTime<Utc>,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		self.audit.in_range(from, to, pagination).await
	}

	pub async fn history_stats(&self) -> Result<HistoryStats, LifecycleError> {
		self.audit.stats().await
	}

	pub async fn cleanup_history(&self, older_than_days: u32) -> Result<usize, LifecycleError> {
		self.audit.cleanup(older_than_days).await
	}

	// Maintenance

	pub async fn reconcile_counters(&self, order_id: Option<OrderId>) -> Result<ReconcileReport, LifecycleError> {
		self.reconciler.reconcile(order_id).await
	}

	/// Subscribes to lifecycle events published after each commit.
	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.event_bus.subscribe()
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}
}
