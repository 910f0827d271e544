//! Internal order numbers.
//!
//! Every order receives a system-generated number of the form `YYYY-NNNN`,
//! unique across all orders ever created and monotonic within a calendar year.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when building or parsing an internal number.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InternalNumberError {
	#[error("Malformed internal number: {0:?}")]
	Malformed(String),
	#[error("Year {0} cannot be rendered with four digits")]
	YearOutOfRange(i32),
	#[error("Sequence {0} is outside 1..=9999")]
	SequenceOutOfRange(u32),
}

/// A well-formed internal number, always rendered as `^\d{4}-\d{4}$`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternalNumber {
	year: i32,
	sequence: u32,
}

impl InternalNumber {
	/// Highest sequence value that still fits the four digit suffix.
	pub const MAX_SEQUENCE: u32 = 9999;

	pub fn new(year: i32, sequence: u32) -> Result<Self, InternalNumberError> {
		if !(0..=9999).contains(&year) {
			return Err(InternalNumberError::YearOutOfRange(year));
		}
		if sequence == 0 || sequence > Self::MAX_SEQUENCE {
			return Err(InternalNumberError::SequenceOutOfRange(sequence));
		}
		Ok(Self { year, sequence })
	}

	pub fn year(&self) -> i32 {
		self.year
	}

	pub fn sequence(&self) -> u32 {
		self.sequence
	}

	/// Prefix shared by every number allocated in `year`, e.g. `"2026-"`.
	pub fn year_prefix(year: i32) -> String {
		format!("{:04}-", year)
	}
}

impl fmt::Display for InternalNumber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:04}-{:04}", self.year, self.sequence)
	}
}

impl FromStr for InternalNumber {
	type Err = InternalNumberError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let malformed = || InternalNumberError::Malformed(s.to_string());
		let (year, sequence) = s.split_once('-').ok_or_else(malformed)?;

		let four_digits = |part: &str| part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit());
		if !four_digits(year) || !four_digits(sequence) {
			return Err(malformed());
		}

		let year: i32 = year.parse().map_err(|_| malformed())?;
		let sequence: u32 = sequence.parse().map_err(|_| malformed())?;
		Self::new(year, sequence)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_pads_both_parts() {
		let number = InternalNumber::new(2026, 7).unwrap();
		assert_eq!(number.to_string(), "2026-0007");
		assert_eq!(InternalNumber::year_prefix(2026), "2026-");
	}

	#[test]
	fn test_parse_accepts_well_formed_numbers() {
		let number: InternalNumber = "2025-0412".parse().unwrap();
		assert_eq!(number.year(), 2025);
		assert_eq!(number.sequence(), 412);
	}

	#[test]
	fn test_parse_rejects_malformed_numbers() {
		for raw in ["2025-12", "25-0001", "2025_0001", "2025-00a1", "2025-0000", "", "2025-00001"] {
			assert!(raw.parse::<InternalNumber>().is_err(), "{raw} should not parse");
		}
	}

	#[test]
	fn test_sequence_bounds() {
		assert_eq!(
			InternalNumber::new(2026, 10_000),
			Err(InternalNumberError::SequenceOutOfRange(10_000))
		);
		assert_eq!(
			InternalNumber::new(12_026, 1),
			Err(InternalNumberError::YearOutOfRange(12_026))
		);
	}
}
