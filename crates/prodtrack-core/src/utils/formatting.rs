//! Formatting helpers for log output.

use uuid::Uuid;

/// Shortens an id to its first 8 characters for log fields.
///
/// Uuids are unique enough in their leading group to tell rows apart in logs.
pub fn truncate_id(id: &Uuid) -> String {
	let rendered = id.to_string();
	match rendered.get(..8) {
		Some(prefix) => format!("{}..", prefix),
		None => rendered,
	}
}
