//! Repairs drift between order counters and the stage rows they summarize.
//!
//! Counters are kept in step transactionally, so drift only appears after
//! out-of-band edits to the store. Reconciliation recomputes both counters
//! from the stage rows and rewrites those that differ. It never changes an
//! order's status.

use crate::audit::AuditRecorder;
use crate::engine::event_bus::EventBus;
use crate::error::LifecycleError;
use crate::state::load_order;
use crate::utils::truncate_id;
use prodtrack_storage::{StorageService, Tables};
use prodtrack_types::{
	Actor, EntityType, HistoryAction, LifecycleEvent, NewHistoryEntry, Order, OrderId,
	StageStatus,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// One order whose counters were rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterRepair {
	pub order_id: OrderId,
	pub internal_number: String,
	/// `(stages_count, completed_stages_count)` before the repair.
	pub before: (u32, u32),
	/// Recomputed from the stage rows.
	pub after: (u32, u32),
}

/// Outcome of a reconciliation run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileReport {
	pub orders_checked: usize,
	pub repairs: Vec<CounterRepair>,
}

pub struct CounterReconciler {
	storage: Arc<StorageService>,
	events: EventBus,
}

/// Counts `(all, completed)` stage rows of an order.
fn count_stages(tables: &Tables, order_id: &OrderId) -> (u32, u32) {
	let stages = tables.stages_of(order_id);
	let completed = stages
		.iter()
		.filter(|s| s.status == StageStatus::Completed)
		.count();
	(stages.len() as u32, completed as u32)
}

impl CounterReconciler {
	pub fn new(storage: Arc<StorageService>, events: EventBus) -> Self {
		Self { storage, events }
	}

	/// Reconciles one order, or every order when `order_id` is `None`.
	#[instrument(skip_all, fields(scope = %order_id.map(|id| truncate_id(&id)).unwrap_or_else(|| "all".into())))]
	pub async fn reconcile(&self, order_id: Option<OrderId>) -> Result<ReconcileReport, LifecycleError> {
		let mut tx = self.storage.begin().await?;
		let orders: Vec<Order> = match order_id {
			Some(id) => vec![load_order(&tx, &id)?],
			None => tx.orders().cloned().collect(),
		};

		let mut report = ReconcileReport {
			orders_checked: orders.len(),
			..Default::default()
		};
		for mut order in orders {
			let before = (order.stages_count, order.completed_stages_count);
			let after = count_stages(&tx, &order.id);
			if before == after {
				continue;
			}

			tracing::warn!(
				order_id = %truncate_id(&order.id),
				internal_number = %order.internal_number,
				?before,
				?after,
				"Repairing counter drift"
			);
			order.stages_count = after.0;
			order.completed_stages_count = after.1;
			order.updated_at = tx.now();
			AuditRecorder::record(
				&mut tx,
				NewHistoryEntry::new(Actor::System, HistoryAction::CounterAdjust, EntityType::Order, order.id)
					.old_values(json!({
						"stages_count": before.0,
						"completed_stages_count": before.1,
					}))
					.new_values(json!({
						"stages_count": after.0,
						"completed_stages_count": after.1,
					}))
					.description("Counters recomputed from stage rows"),
			);
			report.repairs.push(CounterRepair {
				order_id: order.id,
				internal_number: order.internal_number.clone(),
				before,
				after,
			});
			tx.put_order(order);
		}
		tx.commit().await?;

		tracing::info!(
			checked = report.orders_checked,
			repaired = report.repairs.len(),
			"Counter reconciliation finished"
		);
		self.events.publish_all(
			report
				.repairs
				.iter()
				.map(|r| LifecycleEvent::OrderUpdated { order_id: r.order_id }),
		);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use prodtrack_storage::implementations::memory::MemoryStorage;
	use prodtrack_types::{OrderDetails, OrderStage};
	use uuid::Uuid;

	fn stage(order_id: OrderId, position: u32, status: StageStatus) -> OrderStage {
		let now = Utc::now();
		OrderStage {
			id: Uuid::new_v4(),
			order_id,
			template_id: 1,
			name: "Cutting".into(),
			position,
			status,
			started_at: None,
			completed_at: None,
			estimated_duration_hours: None,
			actual_duration_hours: None,
			assignee_id: None,
			comment: None,
			is_critical_path: false,
			skip_reason: None,
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn test_repairs_drifted_counters_only() {
		let storage = Arc::new(
			StorageService::open(Box::new(MemoryStorage::new()))
				.await
				.unwrap(),
		);
		let details = OrderDetails {
			customer_id: 1,
			..Default::default()
		};
		let drifted = Order::new(Uuid::new_v4(), "2026-0001".into(), details.clone(), Utc::now());
		let mut healthy = Order::new(Uuid::new_v4(), "2026-0002".into(), details, Utc::now());
		healthy.stages_count = 1;
		{
			let mut tx = storage.begin().await.unwrap();
			tx.put_stage(stage(drifted.id, 1, StageStatus::Completed));
			tx.put_stage(stage(drifted.id, 2, StageStatus::Skipped));
			tx.put_stage(stage(healthy.id, 1, StageStatus::Pending));
			tx.put_order(drifted.clone());
			tx.put_order(healthy.clone());
			tx.commit().await.unwrap();
		}

		let events = EventBus::new(8);
		let mut rx = events.subscribe();
		let reconciler = CounterReconciler::new(storage.clone(), events);
		let report = reconciler.reconcile(None).await.unwrap();
		assert_eq!(report.orders_checked, 2);
		assert_eq!(report.repairs.len(), 1);
		assert_eq!(report.repairs[0].before, (0, 0));
		assert_eq!(report.repairs[0].after, (2, 1));
		assert_eq!(
			rx.recv().await.unwrap(),
			LifecycleEvent::OrderUpdated { order_id: drifted.id }
		);

		let repaired = storage
			.read(|t| t.order(&drifted.id).cloned())
			.await
			.unwrap()
			.unwrap();
		assert_eq!((repaired.stages_count, repaired.completed_stages_count), (2, 1));
		assert_eq!(repaired.status(), drifted.status());

		let again = reconciler.reconcile(Some(drifted.id)).await.unwrap();
		assert!(again.repairs.is_empty());
	}

	#[tokio::test]
	async fn test_unknown_order_is_not_found() {
		let storage = Arc::new(
			StorageService::open(Box::new(MemoryStorage::new()))
				.await
				.unwrap(),
		);
		let reconciler = CounterReconciler::new(storage, EventBus::new(1));
		assert!(matches!(
			reconciler.reconcile(Some(Uuid::new_v4())).await,
			Err(LifecycleError::NotFound { .. })
		));
	}
}
