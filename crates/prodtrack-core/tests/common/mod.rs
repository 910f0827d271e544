//! Shared fixtures for engine scenario tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use prodtrack_config::Config;
use prodtrack_core::{EngineBuilder, EngineFactories, InMemoryDirectory, ProductionEngine};
use prodtrack_storage::{get_all_implementations, ManualClock, StorageFactory};
use prodtrack_types::{Actor, NewStage, Order, OrderDetails, OrderStage, StageTemplate};
use std::str::FromStr;
use std::sync::Arc;

pub const CUSTOMER: u64 = 1;
pub const MANAGER: u64 = 10;
pub const WORKER: u64 = 11;
pub const CANCEL_REASON: u64 = 3;
pub const CUTTING: u64 = 100;
pub const GLAZING: u64 = 101;
pub const PACKING: u64 = 102;

pub const ACTOR: Actor = Actor::User(MANAGER);

pub struct Harness {
	pub engine: ProductionEngine,
	pub clock: Arc<ManualClock>,
}

pub fn directory() -> InMemoryDirectory {
	let template = |id, name: &str, hours| StageTemplate {
		id,
		name: name.into(),
		default_duration_hours: Some(hours),
		is_critical_path: id == CUTTING,
	};
	InMemoryDirectory::new()
		.with_customer(CUSTOMER)
		.with_user(MANAGER)
		.with_user(WORKER)
		.with_cancel_reason(CANCEL_REASON)
		.with_stage_template(template(CUTTING, "Cutting", 4.0))
		.with_stage_template(template(GLAZING, "Glazing", 2.0))
		.with_stage_template(template(PACKING, "Packing", 1.0))
}

pub fn config(workflow: &str) -> Config {
	Config::from_str(&format!(
		r#"
[service]
id = "scenario"

[storage]
primary = "memory"
lock_timeout_ms = 2000
[storage.implementations.memory]

[workflow]
{}
"#,
		workflow
	))
	.unwrap()
}

pub async fn harness_with(config: Config) -> Harness {
	let clock = Arc::new(ManualClock::new(
		Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
	));
	let factories: EngineFactories<StorageFactory> = EngineFactories {
		storage_factories: get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
	};
	let engine = EngineBuilder::new(config)
		.with_directory(Arc::new(directory()))
		.with_clock(clock.clone())
		.build(factories)
		.await
		.unwrap();
	Harness { engine, clock }
}

pub async fn harness() -> Harness {
	harness_with(config("")).await
}

pub fn details() -> OrderDetails {
	OrderDetails {
		customer_id: CUSTOMER,
		manager_id: Some(MANAGER),
		..Default::default()
	}
}

pub fn stage(template_id: u64) -> NewStage {
	NewStage {
		template_id,
		..Default::default()
	}
}

impl Harness {
	pub async fn order(&self) -> Order {
		self.engine.create_order(ACTOR, details()).await.unwrap()
	}

	/// An order with Cutting, Glazing and Packing attached, in that order.
	pub async fn order_with_stages(&self) -> (Order, Vec<OrderStage>) {
		let order = self.order().await;
		let mut stages = Vec::new();
		for template in [CUTTING, GLAZING, PACKING] {
			stages.push(
				self.engine
					.add_stage(ACTOR, order.id, stage(template))
					.await
					.unwrap(),
			);
		}
		let order = self.engine.get_order(order.id).await.unwrap();
		(order, stages)
	}

	pub async fn reload(&self, order: &Order) -> Order {
		self.engine.get_order(order.id).await.unwrap()
	}
}
