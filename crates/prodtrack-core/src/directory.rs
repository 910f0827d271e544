//! Reference directory seam.
//!
//! Customers, users, stage templates and cancel reasons live in external
//! catalogs. The engine only asks whether a referenced id exists (and, for
//! templates, reads the definition) before it opens a transaction.

use crate::error::{EntityKind, LifecycleError};
use async_trait::async_trait;
use prodtrack_config::DirectoryConfig;
use prodtrack_types::{CancelReasonId, CustomerId, StageTemplate, StageTemplateId, UserId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Failure of the catalog itself, as opposed to a missing entry.
#[derive(Debug, Error)]
pub enum DirectoryError {
	#[error("Directory unavailable: {0}")]
	Unavailable(String),
}

/// Existence lookups against the external reference catalogs.
#[async_trait]
pub trait ReferenceDirectory: Send + Sync {
	async fn customer_exists(&self, id: CustomerId) -> Result<bool, DirectoryError>;

	/// Managers and stage assignees are both users.
	async fn user_exists(&self, id: UserId) -> Result<bool, DirectoryError>;

	async fn stage_template(
		&self,
		id: StageTemplateId,
	) -> Result<Option<StageTemplate>, DirectoryError>;

	async fn cancel_reason_exists(&self, id: CancelReasonId) -> Result<bool, DirectoryError>;
}

/// Directory backed by static in-process data.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
	customers: HashSet<CustomerId>,
	users: HashSet<UserId>,
	cancel_reasons: HashSet<CancelReasonId>,
	templates: HashMap<StageTemplateId, StageTemplate>,
}

impl InMemoryDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_config(config: &DirectoryConfig) -> Self {
		Self {
			customers: config.customers.iter().copied().collect(),
			users: config.users.iter().copied().collect(),
			cancel_reasons: config.cancel_reasons.iter().copied().collect(),
			templates: config
				.stage_templates
				.iter()
				.map(|t| (t.id, t.clone()))
				.collect(),
		}
	}

	pub fn with_customer(mut self, id: CustomerId) -> Self {
		self.customers.insert(id);
		self
	}

	pub fn with_user(mut self, id: UserId) -> Self {
		self.users.insert(id);
		self
	}

	pub fn with_cancel_reason(mut self, id: CancelReasonId) -> Self {
		self.cancel_reasons.insert(id);
		self
	}

	pub fn with_stage_template(mut self, template: StageTemplate) -> Self {
		self.templates.insert(template.id, template);
		self
	}
}

#[async_trait]
impl ReferenceDirectory for InMemoryDirectory {
	async fn customer_exists(&self, id: CustomerId) -> Result<bool, DirectoryError> {
		Ok(self.customers.contains(&id))
	}

	async fn user_exists(&self, id: UserId) -> Result<bool, DirectoryError> {
		Ok(self.users.contains(&id))
	}

	async fn stage_template(
		&self,
		id: StageTemplateId,
	) -> Result<Option<StageTemplate>, DirectoryError> {
		Ok(self.templates.get(&id).cloned())
	}

	async fn cancel_reason_exists(&self, id: CancelReasonId) -> Result<bool, DirectoryError> {
		Ok(self.cancel_reasons.contains(&id))
	}
}

pub(crate) async fn require_customer(
	directory: &dyn ReferenceDirectory,
	id: CustomerId,
) -> Result<(), LifecycleError> {
	if !directory.customer_exists(id).await? {
		return Err(LifecycleError::not_found(EntityKind::Customer, id));
	}
	Ok(())
}

pub(crate) async fn require_user(
	directory: &dyn ReferenceDirectory,
	id: UserId,
	as_kind: EntityKind,
) -> Result<(), LifecycleError> {
	if !directory.user_exists(id).await? {
		return Err(LifecycleError::not_found(as_kind, id));
	}
	Ok(())
}

pub(crate) async fn require_template(
	directory: &dyn ReferenceDirectory,
	id: StageTemplateId,
) -> Result<StageTemplate, LifecycleError> {
	directory
		.stage_template(id)
		.await?
		.ok_or_else(|| LifecycleError::not_found(EntityKind::StageTemplate, id))
}

pub(crate) async fn require_cancel_reason(
	directory: &dyn ReferenceDirectory,
	id: CancelReasonId,
) -> Result<(), LifecycleError> {
	if !directory.cancel_reason_exists(id).await? {
		return Err(LifecycleError::not_found(EntityKind::CancelReason, id));
	}
	Ok(())
}
