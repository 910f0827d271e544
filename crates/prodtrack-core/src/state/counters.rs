//! Checked updates of an order's denormalized counters.
//!
//! Every update runs inside the transaction of the child mutation that
//! triggered it. A violation surfaces as InvalidState, which aborts that
//! transaction instead of storing a drifted counter.

use crate::error::LifecycleError;
use prodtrack_types::{AttachmentCounter, Order};

fn drift(order: &Order, what: &str) -> LifecycleError {
	LifecycleError::InvalidState(format!(
		"Counter drift on order {}: {} (stages {}, completed {})",
		order.internal_number, what, order.stages_count, order.completed_stages_count
	))
}

/// `0 <= completed_stages_count <= stages_count`.
pub fn check(order: &Order) -> Result<(), LifecycleError> {
	if order.completed_stages_count > order.stages_count {
		return Err(drift(order, "more completed stages than stages"));
	}
	Ok(())
}

pub fn stage_added(order: &mut Order) -> Result<(), LifecycleError> {
	order.stages_count = order
		.stages_count
		.checked_add(1)
		.ok_or_else(|| drift(order, "stage count overflow"))?;
	check(order)
}

pub fn stage_completed(order: &mut Order) -> Result<(), LifecycleError> {
	order.completed_stages_count = order
		.completed_stages_count
		.checked_add(1)
		.ok_or_else(|| drift(order, "completed count overflow"))?;
	check(order)
}

pub fn stage_removed(order: &mut Order, was_completed: bool) -> Result<(), LifecycleError> {
	order.stages_count = order
		.stages_count
		.checked_sub(1)
		.ok_or_else(|| drift(order, "removing from an empty stage set"))?;
	if was_completed {
		order.completed_stages_count = order
			.completed_stages_count
			.checked_sub(1)
			.ok_or_else(|| drift(order, "removing an uncounted completed stage"))?;
	}
	check(order)
}

/// Applies `delta` to a file or comment counter, returning `(old, new)`.
pub fn adjust_attachment(
	order: &mut Order,
	counter: AttachmentCounter,
	delta: i32,
) -> Result<(u32, u32), LifecycleError> {
	let slot = match counter {
		AttachmentCounter::Files => &mut order.files_count,
		AttachmentCounter::Comments => &mut order.comments_count,
	};
	let old = *slot;
	let new = old.checked_add_signed(delta).ok_or_else(|| {
		LifecycleError::InvalidState(format!(
			"{} cannot go from {} by {}",
			counter, old, delta
		))
	})?;
	*slot = new;
	Ok((old, new))
}
