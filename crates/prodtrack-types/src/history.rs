//! Audit history types.
//!
//! History records are immutable: they are appended once per mutating
//! operation, never updated, and only removed in bulk by retention cleanup.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
	User(UserId),
	System,
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Actor::User(id) => write!(f, "user:{}", id),
			Actor::System => write!(f, "system"),
		}
	}
}

/// Kind of action captured by a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
	Create,
	Update,
	Delete,
	StatusChange,
	StageAdd,
	StageStart,
	StageComplete,
	StageSkip,
	StageAssign,
	StageRemove,
	CounterAdjust,
}

/// Entity a history record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
	Order,
	OrderStage,
}

/// A persisted, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
	/// Store-assigned, strictly increasing identifier.
	pub id: u64,
	pub action: HistoryAction,
	pub entity_type: EntityType,
	pub entity_id: String,
	pub actor: Actor,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub old_values: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub new_values: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Server-assigned timestamp.
	pub created_at: DateTime<Utc>,
}

/// An audit record before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
	pub actor: Actor,
	pub action: HistoryAction,
	pub entity_type: EntityType,
	pub entity_id: String,
	pub old_values: Option<Value>,
	pub new_values: Option<Value>,
	pub description: Option<String>,
}

impl NewHistoryEntry {
	pub fn new(
		actor: Actor,
		action: HistoryAction,
		entity_type: EntityType,
		entity_id: impl ToString,
	) -> Self {
		Self {
			actor,
			action,
			entity_type,
			entity_id: entity_id.to_string(),
			old_values: None,
			new_values: None,
			description: None,
		}
	}

	pub fn old_values(mut self, values: Value) -> Self {
		self.old_values = Some(values);
		self
	}

	pub fn new_values(mut self, values: Value) -> Self {
		self.new_values = Some(values);
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	/// Finalizes the record with its store-assigned id and timestamp.
	pub fn into_entry(self, id: u64, created_at: DateTime<Utc>) -> HistoryEntry {
		HistoryEntry {
			id,
			action: self.action,
			entity_type: self.entity_type,
			entity_id: self.entity_id,
			actor: self.actor,
			old_values: self.old_values,
			new_values: self.new_values,
			description: self.description,
			created_at,
		}
	}
}

/// Filter over history records; every set field must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
	pub entity_type: Option<EntityType>,
	pub entity_id: Option<String>,
	pub actor: Option<Actor>,
	pub action: Option<HistoryAction>,
	/// Inclusive lower bound on `created_at`.
	pub from: Option<DateTime<Utc>>,
	/// Exclusive upper bound on `created_at`.
	pub to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
	pub fn for_entity(entity_type: EntityType, entity_id: impl ToString) -> Self {
		Self {
			entity_type: Some(entity_type),
			entity_id: Some(entity_id.to_string()),
			..Default::default()
		}
	}

	pub fn by_actor(actor: Actor) -> Self {
		Self {
			actor: Some(actor),
			..Default::default()
		}
	}

	pub fn in_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
		Self {
			from: Some(from),
			to: Some(to),
			..Default::default()
		}
	}

	pub fn matches(&self, entry: &HistoryEntry) -> bool {
		self.entity_type.map_or(true, |t| t == entry.entity_type)
			&& self
				.entity_id
				.as_deref()
				.map_or(true, |id| id == entry.entity_id)
			&& self.actor.map_or(true, |a| a == entry.actor)
			&& self.action.map_or(true, |a| a == entry.action)
			&& self.from.map_or(true, |from| entry.created_at >= from)
			&& self.to.map_or(true, |to| entry.created_at < to)
	}
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
	pub page: u32,
	pub per_page: u32,
}

impl Pagination {
	pub fn new(page: u32, per_page: u32) -> Self {
		Self { page, per_page }
	}

	/// Number of items to skip for this page.
	pub fn offset(&self) -> usize {
		(self.page.max(1) as usize - 1) * self.per_page as usize
	}
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub total: usize,
	pub page: u32,
	pub per_page: u32,
}

impl<T> Page<T> {
	pub fn total_pages(&self) -> usize {
		if self.per_page == 0 {
			return 0;
		}
		self.total.div_ceil(self.per_page as usize)
	}
}

/// Aggregate statistics over the history table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
	pub total: u64,
	pub by_action: BTreeMap<HistoryAction, u64>,
	pub by_entity_type: BTreeMap<EntityType, u64>,
	/// Records created within the last 24 hours.
	pub last_day: u64,
	/// Records created within the last 7 days.
	pub last_week: u64,
	/// Records created within the last 30 days.
	pub last_month: u64,
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn entry(actor: Actor, created_at: DateTime<Utc>) -> HistoryEntry {
		NewHistoryEntry::new(actor, HistoryAction::Create, EntityType::Order, "abc")
			.description("created")
			.into_entry(1, created_at)
	}

	#[test]
	fn test_filter_matches_all_set_fields() {
		let now = Utc::now();
		let e = entry(Actor::User(7), now);

		assert!(HistoryFilter::default().matches(&e));
		assert!(HistoryFilter::for_entity(EntityType::Order, "abc").matches(&e));
		assert!(!HistoryFilter::for_entity(EntityType::OrderStage, "abc").matches(&e));
		assert!(HistoryFilter::by_actor(Actor::User(7)).matches(&e));
		assert!(!HistoryFilter::by_actor(Actor::System).matches(&e));
	}

	#[test]
	fn test_range_is_half_open() {
		let now = Utc::now();
		let e = entry(Actor::System, now);
		assert!(HistoryFilter::in_range(now, now + Duration::seconds(1)).matches(&e));
		assert!(!HistoryFilter::in_range(now - Duration::seconds(1), now).matches(&e));
	}

	#[test]
	fn test_pagination_offsets() {
		assert_eq!(Pagination::new(1, 20).offset(), 0);
		assert_eq!(Pagination::new(3, 20).offset(), 40);
		assert_eq!(Pagination::new(0, 20).offset(), 0);

		let page: Page<u8> = Page {
			items: vec![],
			total: 41,
			page: 1,
			per_page: 20,
		};
		assert_eq!(page.total_pages(), 3);
	}

	#[test]
	fn test_actor_display() {
		assert_eq!(Actor::User(12).to_string(), "user:12");
		assert_eq!(Actor::System.to_string(), "system");
	}
}
