//! Utility helpers for the production engine.

pub mod formatting;

pub use formatting::truncate_id;
