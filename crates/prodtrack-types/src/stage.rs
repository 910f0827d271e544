//! Stage types for the production workflow.
//!
//! A stage template is an externally supplied definition of a production step.
//! An [`OrderStage`] instantiates one template against one order and carries
//! its own status: Pending -> InProgress -> {Completed | Skipped}.

use crate::{OrderId, StageTemplateId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identity of a stage instance.
pub type StageId = Uuid;

/// Upper bound for estimated and default stage durations, about ten years.
pub const MAX_STAGE_DURATION_HOURS: f64 = 87_600.0;

/// Whether `hours` is a usable stage duration: finite, non-negative and
/// within [`MAX_STAGE_DURATION_HOURS`].
pub fn is_valid_duration_hours(hours: f64) -> bool {
	hours.is_finite() && (0.0..=MAX_STAGE_DURATION_HOURS).contains(&hours)
}

/// Reusable definition of a production step, owned by the reference catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTemplate {
	pub id: StageTemplateId,
	pub name: String,
	#[serde(default)]
	pub default_duration_hours: Option<f64>,
	#[serde(default)]
	pub is_critical_path: bool,
}

/// Status of a stage instance. Completed and Skipped are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
	Pending,
	InProgress,
	Completed,
	Skipped,
}

impl StageStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, StageStatus::Completed | StageStatus::Skipped)
	}
}

impl fmt::Display for StageStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StageStatus::Pending => write!(f, "Pending"),
			StageStatus::InProgress => write!(f, "InProgress"),
			StageStatus::Completed => write!(f, "Completed"),
			StageStatus::Skipped => write!(f, "Skipped"),
		}
	}
}

/// One stage template instantiated against one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStage {
	pub id: StageId,
	pub order_id: OrderId,
	pub template_id: StageTemplateId,
	/// Template name captured when the stage was attached.
	pub name: String,
	/// 1-based position within the order, in attachment order.
	pub position: u32,
	pub status: StageStatus,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub estimated_duration_hours: Option<f64>,
	/// Computed once, when the stage completes with a known start.
	pub actual_duration_hours: Option<f64>,
	pub assignee_id: Option<UserId>,
	pub comment: Option<String>,
	pub is_critical_path: bool,
	pub skip_reason: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl OrderStage {
	/// A stage is overdue when it started, has not completed, has an estimate,
	/// and `now` is past `started_at + estimate`. Never persisted.
	pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
		let (Some(started_at), Some(hours)) = (self.started_at, self.estimated_duration_hours)
		else {
			return false;
		};
		if self.completed_at.is_some() || self.status == StageStatus::Completed {
			return false;
		}
		if !hours.is_finite() || hours < 0.0 {
			return false;
		}
		let millis = (hours * 3_600_000.0).round();
		if millis >= i64::MAX as f64 {
			return false;
		}
		Duration::try_milliseconds(millis as i64)
			.and_then(|estimate| started_at.checked_add_signed(estimate))
			.is_some_and(|deadline| now > deadline)
	}
}

/// Hours elapsed between two instants, rounded to two decimals.
pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
	let seconds = (to - from).num_seconds().max(0) as f64;
	(seconds / 36.0).round() / 100.0
}

/// Caller-supplied parameters for attaching a stage template to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStage {
	pub template_id: StageTemplateId,
	#[serde(default)]
	pub assignee_id: Option<UserId>,
	/// Overrides the template's default duration when set.
	#[serde(default)]
	pub estimated_duration_hours: Option<f64>,
	/// Overrides the template's critical path flag when set.
	#[serde(default)]
	pub is_critical_path: Option<bool>,
	#[serde(default)]
	pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn stage(status: StageStatus) -> OrderStage {
		let now = Utc::now();
		OrderStage {
			id: Uuid::new_v4(),
			order_id: Uuid::new_v4(),
			template_id: 1,
			name: "Welding".into(),
			position: 1,
			status,
			started_at: None,
			completed_at: None,
			estimated_duration_hours: None,
			actual_duration_hours: None,
			assignee_id: None,
			comment: None,
			is_critical_path: false,
			skip_reason: None,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn test_terminal_statuses() {
		assert!(!StageStatus::Pending.is_terminal());
		assert!(!StageStatus::InProgress.is_terminal());
		assert!(StageStatus::Completed.is_terminal());
		assert!(StageStatus::Skipped.is_terminal());
	}

	#[test]
	fn test_overdue_requires_start_and_estimate() {
		let now = Utc::now();
		let mut s = stage(StageStatus::InProgress);
		assert!(!s.is_overdue(now));

		s.started_at = Some(now - Duration::hours(5));
		assert!(!s.is_overdue(now), "no estimate means never overdue");

		s.estimated_duration_hours = Some(4.0);
		assert!(s.is_overdue(now));

		s.estimated_duration_hours = Some(6.0);
		assert!(!s.is_overdue(now));
	}

	#[test]
	fn test_completed_stage_is_never_overdue() {
		let now = Utc::now();
		let mut s = stage(StageStatus::Completed);
		s.started_at = Some(now - Duration::hours(10));
		s.completed_at = Some(now - Duration::hours(1));
		s.estimated_duration_hours = Some(1.0);
		assert!(!s.is_overdue(now));
	}

	#[test]
	fn test_huge_estimate_is_not_overdue() {
		let now = Utc::now();
		let mut s = stage(StageStatus::InProgress);
		s.started_at = Some(now);
		s.estimated_duration_hours = Some(1e12);
		assert!(!s.is_overdue(now));
		assert!(!s.is_overdue(now + Duration::days(365)));

		s.estimated_duration_hours = Some(f64::MAX);
		assert!(!s.is_overdue(now));
		s.estimated_duration_hours = Some(f64::NAN);
		assert!(!s.is_overdue(now));
	}

	#[test]
	fn test_duration_bounds() {
		assert!(is_valid_duration_hours(0.0));
		assert!(is_valid_duration_hours(MAX_STAGE_DURATION_HOURS));
		assert!(!is_valid_duration_hours(MAX_STAGE_DURATION_HOURS + 1.0));
		assert!(!is_valid_duration_hours(-0.5));
		assert!(!is_valid_duration_hours(f64::NAN));
		assert!(!is_valid_duration_hours(f64::INFINITY));
	}

	#[test]
	fn test_elapsed_hours_rounds_to_two_decimals() {
		let start = Utc::now();
		assert_eq!(elapsed_hours(start, start + Duration::minutes(90)), 1.5);
		assert_eq!(elapsed_hours(start, start + Duration::seconds(20)), 0.01);
		assert_eq!(elapsed_hours(start, start - Duration::hours(1)), 0.0);
	}
}
