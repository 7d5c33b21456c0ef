//! Multi-file configuration loading.
//!
//! A root file may pull in other files with `include = ["a.toml", ...]` (or a
//! single string). Included files contribute whole top-level sections; a
//! section defined in two files is an error, as is a file reached twice.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a root configuration file together with its includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read.
	visited: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	section_origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			section_origins: HashMap::new(),
		}
	}

	/// Loads, merges and validates the configuration rooted at `config_path`.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let root_path = self.locate(config_path)?;
		let root_content = self.read_resolved(&root_path).await?;
		let mut root: toml::Value = toml::from_str(&root_content)?;

		let includes = parse_includes(&root)?;
		if includes.is_empty() {
			return root_content.parse();
		}

		if let Some(table) = root.as_table_mut() {
			table.remove("include");
		}
		self.record_sections(&root, &root_path)?;

		for include in includes {
			let include_path = self.locate(&include)?;
			let content = self.read_resolved(&include_path).await?;
			let included: toml::Value = toml::from_str(&content)?;
			self.record_sections(&included, &include_path)?;

			if let (Some(target), Some(source)) = (root.as_table_mut(), included.as_table()) {
				for (key, value) in source {
					target.insert(key.clone(), value.clone());
				}
			}
		}

		let merged = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		merged.parse()
	}

	/// Reads a file once and substitutes environment references.
	async fn read_resolved(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(&canonical).await?;
		resolve_env_vars(&content)
	}

	fn record_sections(&mut self, document: &toml::Value, origin: &Path) -> Result<(), ConfigError> {
		let Some(table) = document.as_table() else {
			return Ok(());
		};
		for key in table.keys() {
			if let Some(previous) = self.section_origins.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					previous.display(),
					origin.display()
				)));
			}
			self.section_origins.insert(key.clone(), origin.to_path_buf());
		}
		Ok(())
	}

	fn locate(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
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

fn parse_includes(document: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match document.get("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
