//! Command-line surface of the prodtrack binary.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use prodtrack_types::{Actor, EntityType, OrderId, StageId};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Command-line arguments for the prodtrack service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "PRODTRACK_CONFIG")]
	pub config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	pub log_level: String,

	/// User id recorded as the actor; omitted means the system actor
	#[arg(short, long, env = "PRODTRACK_ACTOR")]
	pub actor: Option<u64>,

	#[command(subcommand)]
	pub command: Command,
}

impl Args {
	pub fn actor(&self) -> Actor {
		self.actor.map_or(Actor::System, Actor::User)
	}
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Order lifecycle operations
	#[command(subcommand)]
	Order(OrderCommand),
	/// Stage workflow operations
	#[command(subcommand)]
	Stage(StageCommand),
	/// Audit trail queries and retention
	#[command(subcommand)]
	History(HistoryCommand),
	/// Recompute stage counters from stage rows and repair drift
	Reconcile {
		/// Restrict to one order
		#[arg(long)]
		order: Option<OrderId>,
	},
}

#[derive(ClapArgs, Debug, Default)]
pub struct OrderFields {
	#[arg(long)]
	pub main_number: Option<String>,
	#[arg(long)]
	pub manager: Option<u64>,
	#[arg(long)]
	pub planned_completion: Option<NaiveDate>,
	#[arg(long)]
	pub planned_delivery: Option<NaiveDate>,
	#[arg(long)]
	pub total: Option<Decimal>,
	#[arg(long)]
	pub paid: Option<Decimal>,
	#[arg(long)]
	pub notes: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum OrderCommand {
	/// Create a New order with the next internal number
	Create {
		#[arg(long)]
		customer: u64,
		#[arg(long)]
		is_paid: bool,
		#[command(flatten)]
		fields: OrderFields,
	},
	Get {
		id: OrderId,
	},
	/// Patch descriptive and financial fields
	Update {
		id: OrderId,
		#[arg(long)]
		customer: Option<u64>,
		#[arg(long)]
		delivery_date: Option<NaiveDate>,
		#[arg(long)]
		is_paid: Option<bool>,
		#[command(flatten)]
		fields: OrderFields,
	},
	Cancel {
		id: OrderId,
		/// Cancel reason id
		#[arg(long)]
		reason: Option<u64>,
	},
	Pause {
		id: OrderId,
		#[arg(long)]
		reason: String,
	},
	Resume {
		id: OrderId,
	},
	Complete {
		id: OrderId,
	},
	/// Remove an order and its stages; absent orders are a no-op
	Remove {
		id: OrderId,
	},
	Progress {
		id: OrderId,
	},
	/// Adjust the file or comment counter by one
	Attachment {
		id: OrderId,
		#[arg(long, value_enum)]
		kind: AttachmentKind,
		/// Decrement instead of increment
		#[arg(long)]
		remove: bool,
	},
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
	File,
	Comment,
}

#[derive(Subcommand, Debug)]
pub enum StageCommand {
	/// Attach a stage template to an order
	Add {
		order: OrderId,
		#[arg(long)]
		template: u64,
		#[arg(long)]
		assignee: Option<u64>,
		/// Estimated hours, overriding the template default
		#[arg(long)]
		estimate: Option<f64>,
		#[arg(long)]
		critical_path: Option<bool>,
		#[arg(long)]
		comment: Option<String>,
	},
	Start {
		order: OrderId,
		stage: StageId,
	},
	Complete {
		order: OrderId,
		stage: StageId,
	},
	Skip {
		order: OrderId,
		stage: StageId,
		#[arg(long)]
		reason: Option<String>,
	},
	Assign {
		order: OrderId,
		stage: StageId,
		#[arg(long)]
		assignee: u64,
		#[arg(long)]
		comment: Option<String>,
	},
	Remove {
		order: OrderId,
		stage: StageId,
	},
	List {
		order: OrderId,
	},
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKindArg {
	Order,
	Stage,
}

impl From<EntityKindArg> for EntityType {
	fn from(kind: EntityKindArg) -> Self {
		match kind {
			EntityKindArg::Order => EntityType::Order,
			EntityKindArg::Stage => EntityType::OrderStage,
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
	/// List records newest first; every given filter must match
	List {
		#[arg(long, value_enum, requires = "entity_id")]
		entity_type: Option<EntityKindArg>,
		#[arg(long)]
		entity_id: Option<String>,
		/// User id, or "system"
		#[arg(long, value_parser = parse_actor)]
		by: Option<Actor>,
		#[arg(long)]
		from: Option<DateTime<Utc>>,
		#[arg(long)]
		to: Option<DateTime<Utc>>,
		#[arg(long, default_value_t = 1)]
		page: u32,
		#[arg(long)]
		per_page: Option<u32>,
	},
	Stats,
	/// Delete records older than the given age
	Cleanup {
		/// Defaults to audit.retention_days
		#[arg(long)]
		older_than_days: Option<u32>,
	},
}

fn parse_actor(value: &str) -> Result<Actor, String> {
	if value.eq_ignore_ascii_case("system") {
		return Ok(Actor::System);
	}
	value
		.parse::<u64>()
		.map(Actor::User)
		.map_err(|_| format!("expected a user id or \"system\", got '{}'", value))
}
