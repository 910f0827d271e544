//! Year-scoped internal number allocation.
//!
//! Each calendar year has its own counter stored alongside the orders. The
//! counter is read and advanced inside the caller's transaction, which holds
//! the store's writer lock, so two concurrent creations can never observe the
//! same value and a rolled back creation gives its number back.

use crate::error::LifecycleError;
use prodtrack_storage::{Tables, Transaction};
use prodtrack_types::InternalNumber;

/// Allocates `YYYY-NNNN` internal numbers.
pub struct SequenceGenerator;

impl SequenceGenerator {
	/// Allocates the next number for `year` within `tx`.
	///
	/// The first allocation of a year seeds the counter from the highest
	/// well-formed number already stored for that year. Stored numbers that
	/// fail to parse are logged and ignored, so a year with only corrupted
	/// numbers starts again at 1.
	pub fn allocate(tx: &mut Transaction<'_>, year: i32) -> Result<InternalNumber, LifecycleError> {
		let last = match tx.sequence(year) {
			Some(last) => last,
			None => Self::seed(tx, year),
		};

		let next = last
			.checked_add(1)
			.filter(|next| *next <= InternalNumber::MAX_SEQUENCE)
			.ok_or_else(|| {
				LifecycleError::Conflict(format!("Internal numbers for {} are exhausted", year))
			})?;
		let number = InternalNumber::new(year, next)
			.map_err(|e| LifecycleError::Validation(e.to_string()))?;

		let rendered = number.to_string();
		if tx.order_by_internal_number(&rendered).is_some() {
			return Err(LifecycleError::Conflict(format!(
				"Internal number {} is already taken",
				rendered
			)));
		}

		tx.set_sequence(year, next);
		tracing::debug!(internal_number = %rendered, "Allocated internal number");
		Ok(number)
	}

	fn seed(tables: &Tables, year: i32) -> u32 {
		let prefix = InternalNumber::year_prefix(year);
		tables
			.orders()
			.filter(|o| o.internal_number.starts_with(&prefix))
			.filter_map(|o| match o.internal_number.parse::<InternalNumber>() {
				Ok(number) => Some(number.sequence()),
				Err(e) => {
					tracing::warn!(
						order_id = %o.id,
						internal_number = %o.internal_number,
						error = %e,
						"Ignoring unparsable internal number"
					);
					None
				},
			})
			.max()
			.unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use prodtrack_storage::{implementations::memory::MemoryStorage, StorageService};
	use prodtrack_types::{Order, OrderDetails};
	use uuid::Uuid;

	async fn store() -> StorageService {
		StorageService::open(Box::new(MemoryStorage::new()))
			.await
			.unwrap()
	}

	fn order_numbered(number: &str) -> Order {
		Order::new(
			Uuid::new_v4(),
			number.into(),
			OrderDetails {
				customer_id: 1,
				..Default::default()
			},
			Utc::now(),
		)
	}

	#[tokio::test]
	async fn test_first_number_of_year_is_one() {
		let store = store().await;
		let mut tx = store.begin().await.unwrap();
		let first = SequenceGenerator::allocate(&mut tx, 2026).unwrap();
		let second = SequenceGenerator::allocate(&mut tx, 2026).unwrap();
		assert_eq!(first.to_string(), "2026-0001");
		assert_eq!(second.to_string(), "2026-0002");

		let other_year = SequenceGenerator::allocate(&mut tx, 2027).unwrap();
		assert_eq!(other_year.to_string(), "2027-0001");
	}

	#[tokio::test]
	async fn test_seeds_from_existing_orders() {
		let store = store().await;
		let mut tx = store.begin().await.unwrap();
		tx.put_order(order_numbered("2026-0041"));
		tx.put_order(order_numbered("2026-0007"));
		tx.put_order(order_numbered("2025-0900"));

		let next = SequenceGenerator::allocate(&mut tx, 2026).unwrap();
		assert_eq!(next.to_string(), "2026-0042");
	}

	#[tokio::test]
	async fn test_unparsable_numbers_fall_back_to_one() {
		let store = store().await;
		let mut tx = store.begin().await.unwrap();
		tx.put_order(order_numbered("2026-12x"));

		let next = SequenceGenerator::allocate(&mut tx, 2026).unwrap();
		assert_eq!(next.to_string(), "2026-0001");
	}

	#[tokio::test]
	async fn test_exhausted_year_conflicts() {
		let store = store().await;
		let mut tx = store.begin().await.unwrap();
		tx.set_sequence(2026, InternalNumber::MAX_SEQUENCE);
		assert!(matches!(
			SequenceGenerator::allocate(&mut tx, 2026),
			Err(LifecycleError::Conflict(_))
		));
	}

	#[tokio::test]
	async fn test_collision_with_stored_number_conflicts() {
		let store = store().await;
		let mut tx = store.begin().await.unwrap();
		tx.set_sequence(2026, 4);
		tx.put_order(order_numbered("2026-0005"));
		assert!(matches!(
			SequenceGenerator::allocate(&mut tx, 2026),
			Err(LifecycleError::Conflict(_))
		));
		assert_eq!(tx.sequence(2026), Some(4));
	}

	#[tokio::test]
	async fn test_rolled_back_allocation_is_reused() {
		let store = store().await;
		{
			let mut tx = store.begin().await.unwrap();
			SequenceGenerator::allocate(&mut tx, 2026).unwrap();
		}
		let mut tx = store.begin().await.unwrap();
		let number = SequenceGenerator::allocate(&mut tx, 2026).unwrap();
		assert_eq!(number.sequence(), 1);
	}
}
