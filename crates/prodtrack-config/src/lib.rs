//! Configuration module for the prodtrack system.
//!
//! Configuration is TOML. Values may reference environment variables as
//! `${NAME}` or `${NAME:-default}`, and a file may pull other files in with
//! `include = ["storage.toml", "directory.toml"]`; each top-level section
//! must then appear in exactly one file.

mod loader;

pub use loader::ConfigLoader;

use prodtrack_types::{
	is_valid_duration_hours, CancelReasonId, CustomerId, StageTemplate, UserId,
	MAX_STAGE_DURATION_HOURS,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for prodtrack.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this deployment.
	pub service: ServiceConfig,
	/// Storage backend selection and lock behavior.
	pub storage: StorageConfig,
	/// Lifecycle policy flags.
	#[serde(default)]
	pub workflow: WorkflowConfig,
	/// Audit query and retention settings.
	#[serde(default)]
	pub audit: AuditConfig,
	/// Static reference data consulted before mutations.
	#[serde(default)]
	pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this deployment, used in log output.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// How long a transaction waits for the store lock before failing.
	#[serde(default = "default_lock_timeout_ms")]
	pub lock_timeout_ms: u64,
}

impl StorageConfig {
	pub fn lock_timeout(&self) -> Duration {
		Duration::from_millis(self.lock_timeout_ms)
	}
}

fn default_lock_timeout_ms() -> u64 {
	5000
}

const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;

/// Policy flags for transitions whose legality is a product decision.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowConfig {
	/// Permit cancelling an order that already reached Completed.
	#[serde(default)]
	pub allow_cancel_completed: bool,
	/// Permit removing Completed or Skipped stages.
	#[serde(default)]
	pub allow_terminal_stage_removal: bool,
}

/// Audit trail query and retention settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
	/// Default age, in days, for `history cleanup` when none is given.
	#[serde(default)]
	pub retention_days: Option<u32>,
	#[serde(default = "default_page_size")]
	pub default_page_size: u32,
	#[serde(default = "default_max_page_size")]
	pub max_page_size: u32,
}

impl Default for AuditConfig {
	fn default() -> Self {
		Self {
			retention_days: None,
			default_page_size: default_page_size(),
			max_page_size: default_max_page_size(),
		}
	}
}

fn default_page_size() -> u32 {
	50
}

fn default_max_page_size() -> u32 {
	500
}

/// Reference data for deployments without an external catalog service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DirectoryConfig {
	#[serde(default)]
	pub customers: Vec<CustomerId>,
	#[serde(default)]
	pub users: Vec<UserId>,
	#[serde(default)]
	pub cancel_reasons: Vec<CancelReasonId>,
	#[serde(default)]
	pub stage_templates: Vec<StageTemplate>,
}

/// Resolves `${VAR}` and `${VAR:-default}` references in `input`.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Bound the input the regex runs over
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		resolved.push_str(&input[last..whole.start()]);
		resolved.push_str(&value);
		last = whole.end();
	}
	resolved.push_str(&input[last..]);

	Ok(resolved)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;

		ConfigLoader::new(base_dir).load_config(file_name).await
	}

	/// Checks cross-field constraints serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.lock_timeout_ms == 0 || self.storage.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS
		{
			return Err(ConfigError::Validation(format!(
				"storage.lock_timeout_ms must be between 1 and {}",
				MAX_LOCK_TIMEOUT_MS
			)));
		}

		if self.audit.retention_days == Some(0) {
			return Err(ConfigError::Validation(
				"audit.retention_days must be at least 1".into(),
			));
		}
		if self.audit.max_page_size == 0 {
			return Err(ConfigError::Validation(
				"audit.max_page_size must be at least 1".into(),
			));
		}
		if self.audit.default_page_size == 0
			|| self.audit.default_page_size > self.audit.max_page_size
		{
			return Err(ConfigError::Validation(format!(
				"audit.default_page_size must be between 1 and max_page_size ({})",
				self.audit.max_page_size
			)));
		}

		let mut seen = std::collections::HashSet::new();
		for template in &self.directory.stage_templates {
			if !seen.insert(template.id) {
				return Err(ConfigError::Validation(format!(
					"Duplicate stage template id {}",
					template.id
				)));
			}
			if template.name.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Stage template {} has an empty name",
					template.id
				)));
			}
			if template
				.default_duration_hours
				.is_some_and(|h| !is_valid_duration_hours(h))
			{
				return Err(ConfigError::Validation(format!(
					"Stage template {} default duration must be between 0 and {} hours",
					template.id, MAX_STAGE_DURATION_HOURS
				)));
			}
		}

		Ok(())
	}
}

/// Parses a configuration from a TOML string, resolving environment
/// variables first and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "plant-1"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "plant-1");
		assert_eq!(config.storage.lock_timeout(), Duration::from_millis(5000));
		assert!(!config.workflow.allow_cancel_completed);
		assert!(!config.workflow.allow_terminal_stage_removal);
		assert_eq!(config.audit.default_page_size, 50);
		assert_eq!(config.audit.max_page_size, 500);
		assert!(config.directory.stage_templates.is_empty());
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("PRODTRACK_TEST_SERVICE", "plant-7");
		let resolved =
			resolve_env_vars("id = \"${PRODTRACK_TEST_SERVICE}\"\npath = \"${PRODTRACK_UNSET_DIR:-/var/lib}\"")
				.unwrap();
		assert_eq!(resolved, "id = \"plant-7\"\npath = \"/var/lib\"");
		std::env::remove_var("PRODTRACK_TEST_SERVICE");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("id = \"${PRODTRACK_DEFINITELY_UNSET}\"");
		assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("PRODTRACK_DEFINITELY_UNSET")));
	}

	#[test]
	fn test_full_config() {
		let config: Config = r#"
[service]
id = "plant-1"

[storage]
primary = "file"
lock_timeout_ms = 250
[storage.implementations.file]
storage_path = "/tmp/prodtrack"

[workflow]
allow_cancel_completed = true

[audit]
retention_days = 365
default_page_size = 20
max_page_size = 100

[directory]
customers = [1, 2]
users = [10]
cancel_reasons = [3]
[[directory.stage_templates]]
id = 1
name = "Cutting"
default_duration_hours = 4.0
[[directory.stage_templates]]
id = 2
name = "Painting"
is_critical_path = true
"#
		.parse()
		.unwrap();

		assert_eq!(config.storage.lock_timeout(), Duration::from_millis(250));
		assert!(config.workflow.allow_cancel_completed);
		assert_eq!(config.audit.retention_days, Some(365));
		assert_eq!(config.directory.customers, vec![1, 2]);
		assert_eq!(config.directory.stage_templates.len(), 2);
		assert!(config.directory.stage_templates[1].is_critical_path);
		assert_eq!(config.directory.stage_templates[1].default_duration_hours, None);
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let err = MINIMAL
			.replace("primary = \"memory\"", "primary = \"file\"")
			.parse::<Config>()
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("'file'")));
	}

	#[test]
	fn test_bounds_are_validated() {
		let zero_timeout = MINIMAL.replace(
			"primary = \"memory\"",
			"primary = \"memory\"\nlock_timeout_ms = 0",
		);
		assert!(zero_timeout.parse::<Config>().is_err());

		let zero_retention = format!("{}\n[audit]\nretention_days = 0\n", MINIMAL);
		assert!(zero_retention.parse::<Config>().is_err());

		let bad_page = format!("{}\n[audit]\ndefault_page_size = 600\n", MINIMAL);
		assert!(bad_page.parse::<Config>().is_err());
	}

	#[test]
	fn test_duplicate_stage_template_rejected() {
		let config = format!(
			"{}\n[[directory.stage_templates]]\nid = 1\nname = \"A\"\n[[directory.stage_templates]]\nid = 1\nname = \"B\"\n",
			MINIMAL
		);
		let err = config.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("Duplicate stage template")));
	}

	#[test]
	fn test_template_default_duration_bounds() {
		for hours in ["nan", "inf", "-1.0", "1e12"] {
			let config = format!(
				"{}\n[[directory.stage_templates]]\nid = 1\nname = \"A\"\ndefault_duration_hours = {}\n",
				MINIMAL, hours
			);
			let err = config.parse::<Config>().unwrap_err();
			assert!(
				matches!(&err, ConfigError::Validation(msg) if msg.contains("default duration")),
				"{} accepted: {:?}",
				hours,
				err
			);
		}
	}
}
