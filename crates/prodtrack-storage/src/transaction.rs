//! Write transactions with an undo journal.
//!
//! A [`Transaction`] holds the store's single writer lock for its whole
//! lifetime, so transactions are fully serialized. Every mutation pushes the
//! prior value onto a journal; an uncommitted transaction replays the journal
//! in reverse when dropped, which makes an early `?` return or a failed
//! persist leave no partial writes behind.

use crate::{StorageError, StorageInterface, Tables};
use chrono::{DateTime, Utc};
use prodtrack_types::{HistoryEntry, NewHistoryEntry, Order, OrderId, OrderStage, StageId};
use std::ops::Deref;
use tokio::sync::RwLockWriteGuard;

/// Prior value of one mutated row, restored on rollback.
#[derive(Debug)]
enum Undo {
	Order(OrderId, Option<Order>),
	Stage(StageId, Option<OrderStage>),
	History(u64, Option<HistoryEntry>),
	Sequence(i32, Option<u32>),
	LastHistoryId(u64),
}

/// An open, exclusive write transaction over the store's tables.
///
/// Reads go through [`Deref`] to [`Tables`]; writes go through the methods
/// below. Call [`Transaction::commit`] to persist; anything else rolls back.
pub struct Transaction<'a> {
	tables: RwLockWriteGuard<'a, Tables>,
	journal: Vec<Undo>,
	backend: &'a dyn StorageInterface,
	now: DateTime<Utc>,
	committed: bool,
}

impl<'a> Transaction<'a> {
	pub(crate) fn new(
		tables: RwLockWriteGuard<'a, Tables>,
		backend: &'a dyn StorageInterface,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			tables,
			journal: Vec::new(),
			backend,
			now,
			committed: false,
		}
	}

	/// Timestamp captured when the transaction began.
	///
	/// Every row written by the transaction is stamped with this instant.
	pub fn now(&self) -> DateTime<Utc> {
		self.now
	}

	/// Inserts or replaces an order row.
	pub fn put_order(&mut self, order: Order) {
		let id = order.id;
		let previous = self.tables.orders.insert(id, order);
		self.journal.push(Undo::Order(id, previous));
	}

	/// Deletes an order row, returning it if it existed.
	pub fn delete_order(&mut self, id: &OrderId) -> Option<Order> {
		let removed = self.tables.orders.remove(id)?;
		self.journal.push(Undo::Order(*id, Some(removed.clone())));
		Some(removed)
	}

	/// Inserts or replaces a stage row.
	pub fn put_stage(&mut self, stage: OrderStage) {
		let id = stage.id;
		let previous = self.tables.stages.insert(id, stage);
		self.journal.push(Undo::Stage(id, previous));
	}

	/// Deletes a stage row, returning it if it existed.
	pub fn delete_stage(&mut self, id: &StageId) -> Option<OrderStage> {
		let removed = self.tables.stages.remove(id)?;
		self.journal.push(Undo::Stage(*id, Some(removed.clone())));
		Some(removed)
	}

	/// Stores the last allocated sequence value for `year`.
	pub fn set_sequence(&mut self, year: i32, value: u32) {
		let previous = self.tables.sequences.insert(year, value);
		self.journal.push(Undo::Sequence(year, previous));
	}

	/// Appends one history row, assigning its id and timestamp.
	pub fn append_history(&mut self, entry: NewHistoryEntry) -> HistoryEntry {
		let previous_id = self.tables.last_history_id;
		let id = previous_id + 1;
		self.tables.last_history_id = id;
		self.journal.push(Undo::LastHistoryId(previous_id));

		let entry = entry.into_entry(id, self.now);
		self.tables.history.insert(id, entry.clone());
		self.journal.push(Undo::History(id, None));
		entry
	}

	/// Deletes a history row. Only retention cleanup does this.
	pub fn delete_history(&mut self, id: u64) -> Option<HistoryEntry> {
		let removed = self.tables.history.remove(&id)?;
		self.journal.push(Undo::History(id, Some(removed.clone())));
		Some(removed)
	}

	/// Number of row mutations recorded so far.
	pub fn pending_changes(&self) -> usize {
		self.journal.len()
	}

	/// Persists the tables through the backend and releases the lock.
	///
	/// If the backend fails, the transaction is rolled back before the error
	/// is returned.
	pub async fn commit(mut self) -> Result<(), StorageError> {
		if !self.journal.is_empty() {
			self.backend.persist(&self.tables).await?;
		}
		self.committed = true;
		self.journal.clear();
		Ok(())
	}

	fn rollback(&mut self) {
		tracing::debug!(changes = self.journal.len(), "Rolling back transaction");
		while let Some(undo) = self.journal.pop() {
			let tables = &mut *self.tables;
			match undo {
				Undo::Order(id, Some(order)) => {
					tables.orders.insert(id, order);
				},
				Undo::Order(id, None) => {
					tables.orders.remove(&id);
				},
				Undo::Stage(id, Some(stage)) => {
					tables.stages.insert(id, stage);
				},
				Undo::Stage(id, None) => {
					tables.stages.remove(&id);
				},
				Undo::History(id, Some(entry)) => {
					tables.history.insert(id, entry);
				},
				Undo::History(id, None) => {
					tables.history.remove(&id);
				},
				Undo::Sequence(year, Some(value)) => {
					tables.sequences.insert(year, value);
				},
				Undo::Sequence(year, None) => {
					tables.sequences.remove(&year);
				},
				Undo::LastHistoryId(id) => tables.last_history_id = id,
			}
		}
	}
}

impl Deref for Transaction<'_> {
	type Target = Tables;

	fn deref(&self) -> &Tables {
		&self.tables
	}
}

impl Drop for Transaction<'_> {
	fn drop(&mut self) {
		if !self.committed && !self.journal.is_empty() {
			self.rollback();
		}
	}
}
