//! Audit trail recording and queries.
//!
//! Writes happen through [`AuditRecorder::record`] inside the transaction of
//! the mutation being documented, so a rollback discards the history row
//! together with the change. Queries, statistics and retention cleanup run
//! against committed state.

use crate::error::LifecycleError;
use chrono::{DateTime, Duration, Utc};
use prodtrack_storage::{StorageService, Transaction};
use prodtrack_types::{
	Actor, EntityType, HistoryEntry, HistoryFilter, HistoryStats, NewHistoryEntry, Page,
	Pagination,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Upper bound on any requested page size.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Appends and queries immutable history records.
pub struct AuditRecorder {
	storage: Arc<StorageService>,
	default_page_size: u32,
	max_page_size: u32,
}

impl AuditRecorder {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			default_page_size: DEFAULT_PAGE_SIZE,
			max_page_size: MAX_PAGE_SIZE,
		}
	}

	pub fn with_page_sizes(mut self, default_page_size: u32, max_page_size: u32) -> Self {
		self.max_page_size = max_page_size.max(1);
		self.default_page_size = default_page_size.clamp(1, self.max_page_size);
		self
	}

	/// Appends one record within the caller's transaction.
	pub fn record(tx: &mut Transaction<'_>, entry: NewHistoryEntry) -> HistoryEntry {
		let entry = tx.append_history(entry);
		tracing::debug!(
			history_id = entry.id,
			action = ?entry.action,
			entity_id = %entry.entity_id,
			actor = %entry.actor,
			"Recorded history"
		);
		entry
	}

	/// Clamps a requested page into the configured bounds.
	fn normalize(&self, pagination: Option<Pagination>) -> Pagination {
		let requested = pagination.unwrap_or(Pagination::new(1, self.default_page_size));
		let per_page = match requested.per_page {
			0 => self.default_page_size,
			n => n.min(self.max_page_size),
		};
		Pagination::new(requested.page.max(1), per_page)
	}

	/// Records matching `filter`, newest first.
	pub async fn list(
		&self,
		filter: &HistoryFilter,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		let pagination = self.normalize(pagination);
		let page = self
			.storage
			.read(|tables| {
				let matching: Vec<&HistoryEntry> =
					tables.history().rev().filter(|e| filter.matches(e)).collect();
				Page {
					total: matching.len(),
					items: matching
						.into_iter()
						.skip(pagination.offset())
						.take(pagination.per_page as usize)
						.cloned()
						.collect(),
					page: pagination.page,
					per_page: pagination.per_page,
				}
			})
			.await?;
		Ok(page)
	}

	pub async fn for_entity(
		&self,
		entity_type: EntityType,
		entity_id: &str,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		self.list(&HistoryFilter::for_entity(entity_type, entity_id), pagination)
			.await
	}

	pub async fn by_actor(
		&self,
		actor: Actor,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		self.list(&HistoryFilter::by_actor(actor), pagination).await
	}

	/// Records with `from <= created_at < to`.
	pub async fn in_range(
		&self,
		from: DateTime<Utc>,
		to: DateTime<Utc>,
		pagination: Option<Pagination>,
	) -> Result<Page<HistoryEntry>, LifecycleError> {
		if to <= from {
			return Err(LifecycleError::Validation(
				"History range end must be after its start".into(),
			));
		}
		self.list(&HistoryFilter::in_range(from, to), pagination)
			.await
	}

	/// Counts by action and entity type plus rolling day/week/month totals.
	pub async fn stats(&self) -> Result<HistoryStats, LifecycleError> {
		let now = self.storage.now();
		let day = now - Duration::days(1);
		let week = now - Duration::days(7);
		let month = now - Duration::days(30);

		let stats = self
			.storage
			.read(|tables| {
				let mut stats = HistoryStats::default();
				for entry in tables.history() {
					stats.total += 1;
					*stats.by_action.entry(entry.action).or_default() += 1;
					*stats.by_entity_type.entry(entry.entity_type).or_default() += 1;
					if entry.created_at >= day {
						stats.last_day += 1;
					}
					if entry.created_at >= week {
						stats.last_week += 1;
					}
					if entry.created_at >= month {
						stats.last_month += 1;
					}
				}
				stats
			})
			.await?;
		Ok(stats)
	}

	/// Deletes records older than `older_than_days`, returning how many went.
	///
	/// A maintenance operation: it runs in its own transaction and is not
	/// itself audited.
	pub async fn cleanup(&self, older_than_days: u32) -> Result<usize, LifecycleError> {
		if older_than_days == 0 {
			return Err(LifecycleError::Validation(
				"Retention must be at least one day".into(),
			));
		}

		let mut tx = self.storage.begin().await?;
		let cutoff = tx.now() - Duration::days(i64::from(older_than_days));
		let expired: Vec<u64> = tx
			.history()
			.filter(|e| e.created_at < cutoff)
			.map(|e| e.id)
			.collect();
		for id in &expired {
			tx.delete_history(*id);
		}
		tx.commit().await?;

		tracing::info!(removed = expired.len(), cutoff = %cutoff, "Cleaned up history");
		Ok(expired.len())
	}
}

/// Top-level fields that differ between two object snapshots.
///
/// Returns `(old, new)` objects holding only the changed keys, or `None`
/// when nothing changed. Keys listed in `ignore` are skipped.
pub(crate) fn changed_fields(before: &Value, after: &Value, ignore: &[&str]) -> Option<(Value, Value)> {
	let (Some(before), Some(after)) = (before.as_object(), after.as_object()) else {
		return (before != after).then(|| (before.clone(), after.clone()));
	};

	let mut old = Map::new();
	let mut new = Map::new();
	let keys = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
	for key in keys {
		if ignore.contains(&key.as_str()) {
			continue;
		}
		let was = before.get(key).unwrap_or(&Value::Null);
		let is = after.get(key).unwrap_or(&Value::Null);
		if was != is {
			old.insert(key.clone(), was.clone());
			new.insert(key.clone(), is.clone());
		}
	}

	if old.is_empty() {
		None
	} else {
		Some((Value::Object(old), Value::Object(new)))
	}
}
