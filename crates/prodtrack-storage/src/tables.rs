//! In-memory representation of every persisted table.
//!
//! Backends persist and reload a [`Tables`] snapshot as a whole; all reads go
//! through the accessors here and all writes go through a
//! [`Transaction`](crate::Transaction) so that they can be undone.

use prodtrack_types::{HistoryEntry, Order, OrderId, OrderStage, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Orders, stages, history and per-year sequence counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
	pub(crate) orders: BTreeMap<OrderId, Order>,
	pub(crate) stages: BTreeMap<StageId, OrderStage>,
	/// Insert-only audit rows keyed by their increasing id.
	pub(crate) history: BTreeMap<u64, HistoryEntry>,
	/// Last allocated internal number sequence per calendar year.
	pub(crate) sequences: BTreeMap<i32, u32>,
	/// Highest history id ever handed out; ids are never reused after cleanup.
	pub(crate) last_history_id: u64,
}

impl Tables {
	pub fn order(&self, id: &OrderId) -> Option<&Order> {
		self.orders.get(id)
	}

	pub fn orders(&self) -> impl Iterator<Item = &Order> {
		self.orders.values()
	}

	pub fn order_by_internal_number(&self, internal_number: &str) -> Option<&Order> {
		self.orders
			.values()
			.find(|o| o.internal_number == internal_number)
	}

	pub fn order_by_main_number(&self, main_number: &str) -> Option<&Order> {
		self.orders
			.values()
			.find(|o| o.main_number.as_deref() == Some(main_number))
	}

	pub fn stage(&self, id: &StageId) -> Option<&OrderStage> {
		self.stages.get(id)
	}

	/// Stages of one order in attachment order.
	pub fn stages_of(&self, order_id: &OrderId) -> Vec<&OrderStage> {
		let mut stages: Vec<&OrderStage> = self
			.stages
			.values()
			.filter(|s| &s.order_id == order_id)
			.collect();
		stages.sort_by_key(|s| s.position);
		stages
	}

	/// Position the next attached stage of `order_id` will take.
	pub fn next_stage_position(&self, order_id: &OrderId) -> u32 {
		self.stages
			.values()
			.filter(|s| &s.order_id == order_id)
			.map(|s| s.position)
			.max()
			.unwrap_or(0)
			+ 1
	}

	/// History rows in id (and therefore insertion) order.
	pub fn history(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
		self.history.values()
	}

	pub fn history_len(&self) -> usize {
		self.history.len()
	}

	pub fn sequence(&self, year: i32) -> Option<u32> {
		self.sequences.get(&year).copied()
	}
}
