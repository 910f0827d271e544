//! End-to-end order and stage workflows over the in-memory store.

mod common;

use chrono::Duration;
use common::*;
use prodtrack_core::{EntityKind, LifecycleError};
use prodtrack_types::{
	Actor, EntityType, HistoryAction, HistoryFilter, LifecycleEvent, NewStage, OrderDetails,
	OrderPatch, OrderStatus, StageStatus, MAX_STAGE_DURATION_HOURS,
};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_new_order_has_zero_counters() {
	let h = harness().await;
	let order = h.order().await;

	assert_eq!(order.internal_number, "2026-0001");
	assert_eq!(order.status(), OrderStatus::New);
	assert_eq!((order.stages_count, order.completed_stages_count), (0, 0));
	assert!(!order.is_paused() && !order.is_cancelled());

	let history = h
		.engine
		.history_for_entity(EntityType::Order, &order.id.to_string(), None)
		.await
		.unwrap();
	assert_eq!(history.total, 1);
	assert_eq!(history.items[0].action, HistoryAction::Create);
	assert_eq!(history.items[0].actor, ACTOR);
}

#[tokio::test]
async fn test_completing_first_stage_moves_order_in_progress() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;
	assert_eq!(order.stages_count, 3);

	let started = h.engine.start_stage(ACTOR, order.id, stages[0].id).await.unwrap();
	assert_eq!(started.status, StageStatus::InProgress);
	assert_eq!(h.reload(&order).await.status(), OrderStatus::InProgress);

	h.clock.advance(Duration::minutes(90));
	let completed = h
		.engine
		.complete_stage(ACTOR, order.id, stages[0].id)
		.await
		.unwrap();
	assert_eq!(completed.actual_duration_hours, Some(1.5));

	let order = h.reload(&order).await;
	assert_eq!(order.completed_stages_count, 1);
	assert_eq!(order.status(), OrderStatus::InProgress);
	assert!((order.completion_percentage() - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_skipped_stage_blocks_auto_completion() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;

	h.engine.start_stage(ACTOR, order.id, stages[0].id).await.unwrap();
	h.engine.complete_stage(ACTOR, order.id, stages[0].id).await.unwrap();
	let skipped = h
		.engine
		.skip_stage(ACTOR, order.id, stages[1].id, Some("not needed".into()))
		.await
		.unwrap();
	assert_eq!(skipped.skip_reason.as_deref(), Some("not needed"));
	h.engine.complete_stage(ACTOR, order.id, stages[2].id).await.unwrap();

	let order = h.reload(&order).await;
	assert_eq!((order.stages_count, order.completed_stages_count), (3, 2));
	assert_eq!(order.status(), OrderStatus::InProgress);

	let order = h.engine.complete_order(ACTOR, order.id).await.unwrap();
	assert_eq!(order.status(), OrderStatus::Completed);
	assert!(order.completion_date.is_some());
}

#[tokio::test]
async fn test_pausing_cancelled_order_is_rejected() {
	let h = harness().await;
	let order = h.order().await;
	let cancelled = h
		.engine
		.cancel_order(ACTOR, order.id, Some(CANCEL_REASON))
		.await
		.unwrap();
	assert_eq!(cancelled.cancel_reason(), Some(CANCEL_REASON));

	let result = h.engine.pause_order(ACTOR, order.id, "waiting for glass").await;
	assert!(matches!(result, Err(LifecycleError::InvalidState(_))));
	let order = h.reload(&order).await;
	assert!(!order.is_paused());
	assert!(order.is_cancelled());

	assert!(matches!(
		h.engine.cancel_order(ACTOR, order.id, None).await,
		Err(LifecycleError::InvalidState(_))
	));
}

#[tokio::test]
async fn test_completing_all_stages_auto_completes() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;
	let mut rx = h.engine.subscribe();

	for stage in &stages {
		h.engine.start_stage(ACTOR, order.id, stage.id).await.unwrap();
		h.engine.complete_stage(ACTOR, order.id, stage.id).await.unwrap();
	}

	let order = h.reload(&order).await;
	assert_eq!((order.stages_count, order.completed_stages_count), (3, 3));
	assert_eq!(order.status(), OrderStatus::Completed);
	assert!(order.completion_date.is_some());

	let mut status_changes = Vec::new();
	while let Ok(event) = rx.try_recv() {
		if let LifecycleEvent::OrderStatusChanged { from, to, .. } = event {
			status_changes.push((from, to));
		}
	}
	assert_eq!(
		status_changes,
		vec![
			(OrderStatus::New, OrderStatus::InProgress),
			(OrderStatus::InProgress, OrderStatus::Completed),
		]
	);

	let auto = h
		.engine
		.history_by_actor(Actor::System, None)
		.await
		.unwrap();
	assert_eq!(auto.total, 1);
	assert_eq!(auto.items[0].action, HistoryAction::StatusChange);
}

#[tokio::test]
async fn test_resume_requires_paused_order() {
	let h = harness().await;
	let order = h.order().await;
	let before = h.engine.list_history(&HistoryFilter::default(), None).await.unwrap().total;

	for _ in 0..2 {
		assert!(matches!(
			h.engine.resume_order(ACTOR, order.id).await,
			Err(LifecycleError::InvalidState(_))
		));
	}
	assert_eq!(h.reload(&order).await, order);
	let after = h.engine.list_history(&HistoryFilter::default(), None).await.unwrap().total;
	assert_eq!(before, after);
}

#[tokio::test]
async fn test_pause_blocks_stage_work_until_resume() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;
	h.engine.start_stage(ACTOR, order.id, stages[0].id).await.unwrap();

	let paused = h.engine.pause_order(ACTOR, order.id, "waiting for glass").await.unwrap();
	assert_eq!(paused.pause_reason(), Some("waiting for glass"));
	assert_eq!(paused.status(), OrderStatus::Paused);
	assert!(matches!(
		h.engine.pause_order(ACTOR, order.id, "again").await,
		Err(LifecycleError::InvalidState(_))
	));
	assert!(matches!(
		h.engine.complete_stage(ACTOR, order.id, stages[0].id).await,
		Err(LifecycleError::InvalidState(_))
	));
	assert!(matches!(
		h.engine.complete_order(ACTOR, order.id).await,
		Err(LifecycleError::InvalidState(_))
	));

	let resumed = h.engine.resume_order(ACTOR, order.id).await.unwrap();
	assert_eq!(resumed.status(), OrderStatus::InProgress);
	h.engine.complete_stage(ACTOR, order.id, stages[0].id).await.unwrap();
}

#[tokio::test]
async fn test_resume_completes_order_finished_while_paused() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;
	h.engine.complete_stage(ACTOR, order.id, stages[0].id).await.unwrap();
	h.engine.pause_order(ACTOR, order.id, "line stopped").await.unwrap();

	h.engine.remove_stage(ACTOR, order.id, stages[1].id).await.unwrap();
	h.engine.remove_stage(ACTOR, order.id, stages[2].id).await.unwrap();
	let paused = h.reload(&order).await;
	assert_eq!(paused.status(), OrderStatus::Paused);
	assert_eq!((paused.stages_count, paused.completed_stages_count), (1, 1));
	assert!(paused.completion_date.is_none());

	let status_filter = HistoryFilter {
		action: Some(HistoryAction::StatusChange),
		..HistoryFilter::for_entity(EntityType::Order, order.id)
	};
	let before = h.engine.list_history(&status_filter, None).await.unwrap().total;
	let mut rx = h.engine.subscribe();

	let resumed = h.engine.resume_order(ACTOR, order.id).await.unwrap();
	assert_eq!(resumed.status(), OrderStatus::Completed);
	assert!(resumed.completion_date.is_some());
	assert_eq!(h.reload(&order).await, resumed);

	let after = h.engine.list_history(&status_filter, None).await.unwrap().total;
	assert_eq!(after - before, 2);

	let mut status_changes = Vec::new();
	while let Ok(event) = rx.try_recv() {
		if let LifecycleEvent::OrderStatusChanged { from, to, .. } = event {
			status_changes.push((from, to));
		}
	}
	assert_eq!(
		status_changes,
		vec![
			(OrderStatus::Paused, OrderStatus::InProgress),
			(OrderStatus::InProgress, OrderStatus::Completed),
		]
	);
}

#[tokio::test]
async fn test_terminal_stages_reject_transitions() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;

	h.engine
		.skip_stage(ACTOR, order.id, stages[0].id, None)
		.await
		.unwrap();
	assert!(matches!(
		h.engine.complete_stage(ACTOR, order.id, stages[0].id).await,
		Err(LifecycleError::InvalidState(_))
	));
	assert!(matches!(
		h.engine.start_stage(ACTOR, order.id, stages[0].id).await,
		Err(LifecycleError::InvalidState(_))
	));

	// Pending straight to Completed carries no actual duration.
	let direct = h
		.engine
		.complete_stage(ACTOR, order.id, stages[1].id)
		.await
		.unwrap();
	assert_eq!(direct.actual_duration_hours, None);
	assert!(matches!(
		h.engine.skip_stage(ACTOR, order.id, stages[1].id, None).await,
		Err(LifecycleError::InvalidState(_))
	));
}

#[tokio::test]
async fn test_stage_defaults_come_from_template() {
	let h = harness().await;
	let order = h.order().await;

	let cutting = h.engine.add_stage(ACTOR, order.id, stage(CUTTING)).await.unwrap();
	assert_eq!(cutting.name, "Cutting");
	assert_eq!(cutting.position, 1);
	assert_eq!(cutting.estimated_duration_hours, Some(4.0));
	assert!(cutting.is_critical_path);

	let glazing = h
		.engine
		.add_stage(
			ACTOR,
			order.id,
			NewStage {
				template_id: GLAZING,
				assignee_id: Some(WORKER),
				estimated_duration_hours: Some(6.5),
				is_critical_path: Some(true),
				comment: Some("double pane".into()),
			},
		)
		.await
		.unwrap();
	assert_eq!(glazing.position, 2);
	assert_eq!(glazing.estimated_duration_hours, Some(6.5));
	assert_eq!(glazing.assignee_id, Some(WORKER));

	let listed = h.engine.list_stages(order.id).await.unwrap();
	let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
	assert_eq!(names, vec!["Cutting", "Glazing"]);
}

#[tokio::test]
async fn test_stage_estimate_out_of_range_is_rejected() {
	let h = harness().await;
	let order = h.order().await;

	for hours in [1e12, f64::NAN, -1.0] {
		let new = NewStage {
			estimated_duration_hours: Some(hours),
			..stage(CUTTING)
		};
		assert!(matches!(
			h.engine.add_stage(ACTOR, order.id, new).await,
			Err(LifecycleError::Validation(_))
		));
	}
	assert_eq!(h.reload(&order).await.stages_count, 0);

	let longest = NewStage {
		estimated_duration_hours: Some(MAX_STAGE_DURATION_HOURS),
		..stage(CUTTING)
	};
	let added = h.engine.add_stage(ACTOR, order.id, longest).await.unwrap();
	let started = h.engine.start_stage(ACTOR, order.id, added.id).await.unwrap();
	h.clock.advance(Duration::days(30));
	assert!(!started.is_overdue(h.engine.storage().now()));
}

#[tokio::test]
async fn test_reference_lookups_fail_before_mutation() {
	let h = harness().await;

	let unknown_customer = OrderDetails {
		customer_id: 999,
		..Default::default()
	};
	assert!(matches!(
		h.engine.create_order(ACTOR, unknown_customer).await,
		Err(LifecycleError::NotFound { entity: EntityKind::Customer, .. })
	));
	let unknown_manager = OrderDetails {
		manager_id: Some(999),
		..details()
	};
	assert!(matches!(
		h.engine.create_order(ACTOR, unknown_manager).await,
		Err(LifecycleError::NotFound { entity: EntityKind::Manager, .. })
	));

	let order = h.order().await;
	assert_eq!(order.internal_number, "2026-0001");
	assert!(matches!(
		h.engine.add_stage(ACTOR, order.id, stage(999)).await,
		Err(LifecycleError::NotFound { entity: EntityKind::StageTemplate, .. })
	));
	assert!(matches!(
		h.engine.cancel_order(ACTOR, order.id, Some(999)).await,
		Err(LifecycleError::NotFound { entity: EntityKind::CancelReason, .. })
	));
	assert!(matches!(
		h.engine.add_stage(ACTOR, uuid::Uuid::new_v4(), stage(CUTTING)).await,
		Err(LifecycleError::NotFound { entity: EntityKind::Order, .. })
	));
	assert_eq!(h.reload(&order).await.stages_count, 0);
}

#[tokio::test]
async fn test_stage_of_another_order_is_not_found() {
	let h = harness().await;
	let (first, stages) = h.order_with_stages().await;
	let second = h.order().await;

	assert!(matches!(
		h.engine.start_stage(ACTOR, second.id, stages[0].id).await,
		Err(LifecycleError::NotFound { entity: EntityKind::Stage, .. })
	));
	assert_eq!(
		h.engine.get_stage(first.id, stages[0].id).await.unwrap().status,
		StageStatus::Pending
	);
}

#[tokio::test]
async fn test_main_number_must_be_unique() {
	let h = harness().await;
	let first = h
		.engine
		.create_order(
			ACTOR,
			OrderDetails {
				main_number: Some("PO-17".into()),
				..details()
			},
		)
		.await
		.unwrap();
	let duplicate = h
		.engine
		.create_order(
			ACTOR,
			OrderDetails {
				main_number: Some("PO-17".into()),
				..details()
			},
		)
		.await;
	assert!(matches!(duplicate, Err(LifecycleError::Conflict(_))));

	let second = h.order().await;
	assert_eq!(second.internal_number, "2026-0002");
	let taken = h
		.engine
		.update_order(
			ACTOR,
			second.id,
			OrderPatch {
				main_number: Some("PO-17".into()),
				..Default::default()
			},
		)
		.await;
	assert!(matches!(taken, Err(LifecycleError::Conflict(_))));

	// Re-applying an order's own number is a no-op.
	let same = h
		.engine
		.update_order(
			ACTOR,
			first.id,
			OrderPatch {
				main_number: Some("PO-17".into()),
				..Default::default()
			},
		)
		.await
		.unwrap();
	assert_eq!(same.updated_at, first.updated_at);
}

#[tokio::test]
async fn test_update_audits_changed_fields_only() {
	let h = harness().await;
	let order = h.order().await;
	h.clock.advance(Duration::minutes(5));

	let updated = h
		.engine
		.update_order(
			ACTOR,
			order.id,
			OrderPatch {
				total_amount: Some(Decimal::new(125_000, 2)),
				notes: Some("rush".into()),
				is_paid: Some(false),
				..Default::default()
			},
		)
		.await
		.unwrap();
	assert_eq!(updated.total_amount, Decimal::new(125_000, 2));
	assert!(updated.updated_at > order.updated_at);

	let history = h
		.engine
		.history_for_entity(EntityType::Order, &order.id.to_string(), None)
		.await
		.unwrap();
	let update = &history.items[0];
	assert_eq!(update.action, HistoryAction::Update);
	let new_values = update.new_values.as_ref().unwrap();
	assert_eq!(new_values["notes"], "rush");
	assert!(new_values.get("is_paid").is_none());

	assert!(matches!(
		h.engine
			.update_order(
				ACTOR,
				order.id,
				OrderPatch {
					paid_amount: Some(Decimal::new(-1, 0)),
					..Default::default()
				},
			)
			.await,
		Err(LifecycleError::Validation(_))
	));
}

#[tokio::test]
async fn test_stage_removal_policy_and_counters() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;
	h.engine.complete_stage(ACTOR, order.id, stages[0].id).await.unwrap();

	assert!(matches!(
		h.engine.remove_stage(ACTOR, order.id, stages[0].id).await,
		Err(LifecycleError::InvalidState(_))
	));

	h.engine.remove_stage(ACTOR, order.id, stages[1].id).await.unwrap();
	let order_now = h.reload(&order).await;
	assert_eq!((order_now.stages_count, order_now.completed_stages_count), (2, 1));
	assert_eq!(order_now.status(), OrderStatus::InProgress);

	// Removing the last unfinished stage leaves only completed ones.
	h.engine.remove_stage(ACTOR, order.id, stages[2].id).await.unwrap();
	let order_now = h.reload(&order).await;
	assert_eq!((order_now.stages_count, order_now.completed_stages_count), (1, 1));
	assert_eq!(order_now.status(), OrderStatus::Completed);

	let positions: Vec<u32> = h
		.engine
		.list_stages(order.id)
		.await
		.unwrap()
		.iter()
		.map(|s| s.position)
		.collect();
	assert_eq!(positions, vec![1]);
}

#[tokio::test]
async fn test_policies_from_config() {
	let h = harness_with(config(
		"allow_cancel_completed = true\nallow_terminal_stage_removal = true",
	))
	.await;
	let (order, stages) = h.order_with_stages().await;
	h.engine.complete_stage(ACTOR, order.id, stages[0].id).await.unwrap();

	h.engine.remove_stage(ACTOR, order.id, stages[0].id).await.unwrap();
	let order_now = h.reload(&order).await;
	assert_eq!((order_now.stages_count, order_now.completed_stages_count), (2, 0));

	h.engine.complete_order(ACTOR, order.id).await.unwrap();
	let cancelled = h.engine.cancel_order(ACTOR, order.id, None).await.unwrap();
	assert_eq!(cancelled.status(), OrderStatus::Cancelled);

	let strict = harness().await;
	let order = strict.order().await;
	strict.engine.complete_order(ACTOR, order.id).await.unwrap();
	assert!(matches!(
		strict.engine.cancel_order(ACTOR, order.id, None).await,
		Err(LifecycleError::InvalidState(_))
	));
}

#[tokio::test]
async fn test_closed_orders_refuse_stage_changes() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;
	h.engine.cancel_order(ACTOR, order.id, None).await.unwrap();

	assert!(matches!(
		h.engine.add_stage(ACTOR, order.id, stage(PACKING)).await,
		Err(LifecycleError::InvalidState(_))
	));
	assert!(matches!(
		h.engine
			.assign_stage(ACTOR, order.id, stages[0].id, WORKER, None)
			.await,
		Err(LifecycleError::InvalidState(_))
	));
	assert!(matches!(
		h.engine.remove_stage(ACTOR, order.id, stages[0].id).await,
		Err(LifecycleError::InvalidState(_))
	));
}

#[tokio::test]
async fn test_assign_keeps_status_and_audits() {
	let h = harness().await;
	let (order, stages) = h.order_with_stages().await;

	let assigned = h
		.engine
		.assign_stage(ACTOR, order.id, stages[1].id, WORKER, Some("night shift".into()))
		.await
		.unwrap();
	assert_eq!(assigned.status, StageStatus::Pending);
	assert_eq!(assigned.assignee_id, Some(WORKER));
	assert_eq!(assigned.comment.as_deref(), Some("night shift"));
	assert!(matches!(
		h.engine
			.assign_stage(ACTOR, order.id, stages[1].id, 999, None)
			.await,
		Err(LifecycleError::NotFound { entity: EntityKind::Assignee, .. })
	));

	let history = h
		.engine
		.history_for_entity(EntityType::OrderStage, &stages[1].id.to_string(), None)
		.await
		.unwrap();
	assert_eq!(history.items[0].action, HistoryAction::StageAssign);
	assert_eq!(h.reload(&order).await, order);
}

#[tokio::test]
async fn test_remove_order_is_idempotent() {
	let h = harness().await;
	let (order, _) = h.order_with_stages().await;

	assert!(h.engine.remove_order(ACTOR, order.id).await.unwrap());
	let history_after_first = h.engine.history_stats().await.unwrap().total;
	assert!(!h.engine.remove_order(ACTOR, order.id).await.unwrap());
	assert_eq!(h.engine.history_stats().await.unwrap().total, history_after_first);

	assert!(matches!(
		h.engine.get_order(order.id).await,
		Err(LifecycleError::NotFound { entity: EntityKind::Order, .. })
	));
	assert!(h.engine.list_stages(order.id).await.is_err());
}

#[tokio::test]
async fn test_attachment_counters() {
	let h = harness().await;
	let order = h.order().await;

	h.engine.file_attached(ACTOR, order.id).await.unwrap();
	h.engine.file_attached(ACTOR, order.id).await.unwrap();
	h.engine.comment_added(ACTOR, order.id).await.unwrap();
	let order_now = h.engine.file_detached(ACTOR, order.id).await.unwrap();
	assert_eq!((order_now.files_count, order_now.comments_count), (1, 1));

	h.engine.comment_removed(ACTOR, order.id).await.unwrap();
	assert!(matches!(
		h.engine.comment_removed(ACTOR, order.id).await,
		Err(LifecycleError::InvalidState(_))
	));
	assert_eq!(h.reload(&order).await.comments_count, 0);

	let progress = h.engine.order_progress(order.id).await.unwrap();
	assert_eq!(progress.completion_percentage, 0.0);
}

#[tokio::test]
async fn test_numbers_restart_each_year() {
	let h = harness().await;
	h.order().await;
	h.order().await;

	h.clock.advance(Duration::days(365));
	let next_year = h.order().await;
	assert_eq!(next_year.internal_number, "2027-0001");
}
