//! Loader for configurations split across several files.
//!
//! The root file names its parts with `include`; every part is read with
//! environment variables resolved, and its top-level sections are merged
//! into the root table. A section defined twice is an error, as is a file
//! that is reached twice through includes.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Configuration loader that handles multi-file configurations with includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read.
	loaded_files: HashSet<PathBuf>,
	/// File each top-level section came from, for error messages.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads `config_path` and everything it includes into one validated [`Config`].
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let root_path = self.resolve_path(config_path)?;
		let content = self.read_file(&root_path).await?;
		let mut root: toml::Value = toml::from_str(&content)?;

		let includes = take_includes(&mut root)?;
		if includes.is_empty() {
			return content.parse();
		}

		self.track_sections(&root, &root_path)?;
		for include in includes {
			let part_path = self.resolve_path(&include)?;
			let part_content = self.read_file(&part_path).await?;
			let part: toml::Value = toml::from_str(&part_content)?;
			self.track_sections(&part, &part_path)?;

			if let (Some(root_table), toml::Value::Table(part_table)) = (root.as_table_mut(), part)
			{
				for (key, value) in part_table {
					root_table.insert(key, value);
				}
			}
			tracing::debug!(file = %part_path.display(), "Merged configuration include");
		}

		let merged = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		merged.parse()
	}

	/// Reads a file once, resolving environment variables.
	async fn read_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	fn track_sections(&mut self, value: &toml::Value, source: &Path) -> Result<(), ConfigError> {
		let Some(table) = value.as_table() else {
			return Ok(());
		};
		for key in table.keys() {
			if let Some(existing) = self.section_sources.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}",
					key,
					existing.display(),
					source.display()
				)));
			}
			self.section_sources
				.insert(key.clone(), source.to_path_buf());
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Removes the `include` key from `root` and returns the listed paths.
fn take_includes(root: &mut toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	let Some(value) = root.as_table_mut().and_then(|t| t.remove("include")) else {
		return Ok(Vec::new());
	};

	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const SERVICE: &str = "[service]\nid = \"plant-1\"\n";
	const STORAGE: &str = "[storage]\nprimary = \"memory\"\n[storage.implementations.memory]\n";

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join("config.toml");
		fs::write(&path, format!("{}{}", SERVICE, STORAGE)).unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.service.id, "plant-1");
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_includes_are_merged() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("storage.toml"), STORAGE).unwrap();
		fs::write(
			temp_dir.path().join("directory.toml"),
			"[directory]\ncustomers = [5]\n[[directory.stage_templates]]\nid = 1\nname = \"Cutting\"\n",
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"storage.toml\", \"directory.toml\"]\n{}", SERVICE),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.directory.customers, vec![5]);
		assert_eq!(config.directory.stage_templates[0].name, "Cutting");
	}

	#[tokio::test]
	async fn test_duplicate_section_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("extra.toml"),
			"[service]\nid = \"other\"\n",
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = \"extra.toml\"\n{}{}", SERVICE, STORAGE),
		)
		.unwrap();

		let err = ConfigLoader::new(temp_dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("Duplicate section 'service'")));
	}

	#[tokio::test]
	async fn test_self_include_is_circular() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"main.toml\"]\n{}{}", SERVICE, STORAGE),
		)
		.unwrap();

		let err = ConfigLoader::new(temp_dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("Circular include")));
	}

	#[tokio::test]
	async fn test_missing_include_reported() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"nope.toml\"]\n{}{}", SERVICE, STORAGE),
		)
		.unwrap();

		let err = ConfigLoader::new(temp_dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}
}
