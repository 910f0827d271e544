//! Executes one parsed command against the engine and renders JSON.

use crate::cli::{AttachmentKind, Command, HistoryCommand, OrderCommand, OrderFields, StageCommand};
use prodtrack_config::Config;
use prodtrack_core::{LifecycleError, ProductionEngine};
use prodtrack_types::{Actor, HistoryFilter, NewStage, OrderDetails, OrderPatch, Pagination};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error(transparent)]
	Lifecycle(#[from] LifecycleError),
	#[error("Invalid arguments: {0}")]
	Arguments(String),
	#[error("Failed to render output: {0}")]
	Output(#[from] serde_json::Error),
}

fn render<T: Serialize>(value: &T) -> Result<Value, CommandError> {
	Ok(serde_json::to_value(value)?)
}

fn details(customer_id: u64, is_paid: bool, fields: OrderFields) -> OrderDetails {
	OrderDetails {
		customer_id,
		manager_id: fields.manager,
		main_number: fields.main_number,
		planned_completion_date: fields.planned_completion,
		planned_delivery_date: fields.planned_delivery,
		total_amount: fields.total.unwrap_or_default(),
		paid_amount: fields.paid.unwrap_or_default(),
		is_paid,
		notes: fields.notes,
	}
}

pub async fn execute(
	engine: &ProductionEngine,
	config: &Config,
	actor: Actor,
	command: Command,
) -> Result<Value, CommandError> {
	match command {
		Command::Order(command) => order(engine, actor, command).await,
		Command::Stage(command) => stage(engine, actor, command).await,
		Command::History(command) => history(engine, config, command).await,
		Command::Reconcile { order } => render(&engine.reconcile_counters(order).await?),
	}
}

async fn order(engine: &ProductionEngine, actor: Actor, command: OrderCommand) -> Result<Value, CommandError> {
	match command {
		OrderCommand::Create {
			customer,
			is_paid,
			fields,
		} => render(
			&engine
				.create_order(actor, details(customer, is_paid, fields))
				.await?,
		),
		OrderCommand::Get { id } => render(&engine.get_order(id).await?),
		OrderCommand::Update {
			id,
			customer,
			delivery_date,
			is_paid,
			fields,
		} => {
			let patch = OrderPatch {
				main_number: fields.main_number,
				customer_id: customer,
				manager_id: fields.manager,
				planned_completion_date: fields.planned_completion,
				planned_delivery_date: fields.planned_delivery,
				delivery_date,
				total_amount: fields.total,
				paid_amount: fields.paid,
				is_paid,
				notes: fields.notes,
			};
			if patch.is_empty() {
				return Err(CommandError::Arguments(
					"update needs at least one field".into(),
				));
			}
			render(&engine.update_order(actor, id, patch).await?)
		},
		OrderCommand::Cancel { id, reason } => render(&engine.cancel_order(actor, id, reason).await?),
		OrderCommand::Pause { id, reason } => render(&engine.pause_order(actor, id, &reason).await?),
		OrderCommand::Resume { id } => render(&engine.resume_order(actor, id).await?),
		OrderCommand::Complete { id } => render(&engine.complete_order(actor, id).await?),
		OrderCommand::Remove { id } => {
			let removed = engine.remove_order(actor, id).await?;
			Ok(json!({ "order_id": id, "removed": removed }))
		},
		OrderCommand::Progress { id } => render(&engine.order_progress(id).await?),
		OrderCommand::Attachment { id, kind, remove } => {
			let order = match (kind, remove) {
				(AttachmentKind::File, false) => engine.file_attached(actor, id).await?,
				(AttachmentKind::File, true) => engine.file_detached(actor, id).await?,
				(AttachmentKind::Comment, false) => engine.comment_added(actor, id).await?,
				(AttachmentKind::Comment, true) => engine.comment_removed(actor, id).await?,
			};
			Ok(json!({
				"order_id": order.id,
				"files_count": order.files_count,
				"comments_count": order.comments_count,
			}))
		},
	}
}

async fn stage(engine: &ProductionEngine, actor: Actor, command: StageCommand) -> Result<Value, CommandError> {
	match command {
		StageCommand::Add {
			order,
			template,
			assignee,
			estimate,
			critical_path,
			comment,
		} => {
			let new = NewStage {
				template_id: template,
				assignee_id: assignee,
				estimated_duration_hours: estimate,
				is_critical_path: critical_path,
				comment,
			};
			render(&engine.add_stage(actor, order, new).await?)
		},
		StageCommand::Start { order, stage } => render(&engine.start_stage(actor, order, stage).await?),
		StageCommand::Complete { order, stage } => {
			render(&engine.complete_stage(actor, order, stage).await?)
		},
		StageCommand::Skip {
			order,
			stage,
			reason,
		} => render(&engine.skip_stage(actor, order, stage, reason).await?),
		StageCommand::Assign {
			order,
			stage,
			assignee,
			comment,
		} => render(
			&engine
				.assign_stage(actor, order, stage, assignee, comment)
				.await?,
		),
		StageCommand::Remove { order, stage } => render(&engine.remove_stage(actor, order, stage).await?),
		StageCommand::List { order } => {
			let now = engine.storage().now();
			let stages = engine.list_stages(order).await?;
			let rows: Vec<Value> = stages
				.iter()
				.map(|s| {
					let mut row = render(s)?;
					if let Some(fields) = row.as_object_mut() {
						fields.insert("is_overdue".into(), Value::Bool(s.is_overdue(now)));
					}
					Ok(row)
				})
				.collect::<Result<_, CommandError>>()?;
			Ok(Value::Array(rows))
		},
	}
}

async fn history(engine: &ProductionEngine, config: &Config, command: HistoryCommand) -> Result<Value, CommandError> {
	match command {
		HistoryCommand::List {
			entity_type,
			entity_id,
			by,
			from,
			to,
			page,
			per_page,
		} => {
			if let (Some(from), Some(to)) = (from, to) {
				if to <= from {
					return Err(CommandError::Arguments("--to must be after --from".into()));
				}
			}
			let filter = HistoryFilter {
				entity_type: entity_type.map(Into::into),
				entity_id,
				actor: by,
				from,
				to,
				..Default::default()
			};
			let pagination = Pagination::new(page, per_page.unwrap_or(0));
			render(&engine.list_history(&filter, Some(pagination)).await?)
		},
		HistoryCommand::Stats => render(&engine.history_stats().await?),
		HistoryCommand::Cleanup { older_than_days } => {
			let days = older_than_days
				.or(config.audit.retention_days)
				.ok_or_else(|| {
					CommandError::Arguments(
						"--older-than-days is required when audit.retention_days is not set".into(),
					)
				})?;
			let removed = engine.cleanup_history(days).await?;
			Ok(json!({ "older_than_days": days, "removed": removed }))
		},
	}
}
