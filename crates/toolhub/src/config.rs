// Registry configuration
//
// Sources, lowest precedence first: built-in defaults, the YAML config file,
// environment variables, then command line flags applied by the binary.
// Relative paths are resolved against the working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::ValidationMode;

/// `true`/`false` style override of the validation mode
pub const ENV_STRICT_VALIDATION: &str = "REGISTRY_STRICT_VALIDATION";
/// `true`/`false` style switch disabling drift detection
pub const ENV_SKIP_DRIFT_DETECTION: &str = "SKIP_DRIFT_DETECTION";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("invalid value '{value}' for {name}, expected true or false")]
	InvalidEnv { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
	pub mode: ValidationMode,

	/// Compare service sources with registered methods
	pub drift_detection: bool,

	/// Compare tool parameters with method parameters
	pub parameter_mapping: bool,
}

impl Default for ValidationConfig {
	fn default() -> Self {
		Self {
			mode: ValidationMode::Strict,
			drift_detection: true,
			parameter_mapping: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
	/// Method inventory file
	pub inventory: PathBuf,

	/// Directory of tool spec files
	pub tools_dir: PathBuf,

	/// Root the service module paths are resolved against during drift
	/// detection
	pub source_root: PathBuf,

	pub validation: ValidationConfig,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			inventory: PathBuf::from("config/methods_inventory.yaml"),
			tools_dir: PathBuf::from("config/tools"),
			source_root: PathBuf::from("crates/toolhub/src"),
			validation: ValidationConfig::default(),
		}
	}
}

impl RegistryConfig {
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = fs_err::read_to_string(path)?;
		Self::parse(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
		serde_yaml::from_str(content)
	}

	/// Apply the process environment
	pub fn from_env(self) -> Result<Self, ConfigError> {
		self.with_env_overrides(|name| std::env::var(name).ok())
	}

	/// Apply overrides read through `lookup`
	pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		if let Some(strict) = env_flag(&lookup, ENV_STRICT_VALIDATION)? {
			self.validation.mode = if strict {
				ValidationMode::Strict
			} else {
				ValidationMode::Warning
			};
		}
		if let Some(skip) = env_flag(&lookup, ENV_SKIP_DRIFT_DETECTION)? {
			self.validation.drift_detection = !skip;
		}
		Ok(self)
	}

	pub fn with_mode(mut self, mode: ValidationMode) -> Self {
		self.validation.mode = mode;
		self
	}
}

fn env_flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<bool>, ConfigError> {
	let Some(raw) = lookup(name) else {
		return Ok(None);
	};
	match raw.trim().to_ascii_lowercase().as_str() {
		"" => Ok(None),
		"1" | "true" | "yes" | "on" => Ok(Some(true)),
		"0" | "false" | "no" | "off" => Ok(Some(false)),
		_ => Err(ConfigError::InvalidEnv {
			name: name.to_string(),
			value: raw,
		}),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use assert_matches::assert_matches;

	use super::*;

	fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_partial_file_keeps_defaults() {
		let config = RegistryConfig::parse(
			r#"
tools_dir: custom/tools
validation:
  mode: warning
"#,
		)
		.unwrap();
		assert_eq!(config.tools_dir, PathBuf::from("custom/tools"));
		assert_eq!(config.inventory, PathBuf::from("config/methods_inventory.yaml"));
		assert_eq!(config.validation.mode, ValidationMode::Warning);
		assert!(config.validation.drift_detection);
		assert!(config.validation.parameter_mapping);
	}

	#[test]
	fn test_env_overrides() {
		let config = RegistryConfig::default()
			.with_env_overrides(env(&[
				(ENV_STRICT_VALIDATION, "false"),
				(ENV_SKIP_DRIFT_DETECTION, "1"),
			]))
			.unwrap();
		assert_eq!(config.validation.mode, ValidationMode::Warning);
		assert!(!config.validation.drift_detection);

		let config = config
			.with_env_overrides(env(&[(ENV_STRICT_VALIDATION, " Yes ")]))
			.unwrap();
		assert_eq!(config.validation.mode, ValidationMode::Strict);
		assert!(!config.validation.drift_detection);

		let unchanged = RegistryConfig::default().with_env_overrides(env(&[])).unwrap();
		assert_eq!(unchanged, RegistryConfig::default());
	}

	#[test]
	fn test_invalid_env_value() {
		let result = RegistryConfig::default().with_env_overrides(env(&[(ENV_SKIP_DRIFT_DETECTION, "maybe")]));
		assert_matches!(result, Err(ConfigError::InvalidEnv { name, .. }) if name == ENV_SKIP_DRIFT_DETECTION);
	}

	#[test]
	fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("registry.yaml");
		fs_err::write(&path, "inventory: inv.yaml\n").unwrap();
		assert_eq!(RegistryConfig::from_file(&path).unwrap().inventory, PathBuf::from("inv.yaml"));

		fs_err::write(&path, "validation: [").unwrap();
		assert_matches!(RegistryConfig::from_file(&path), Err(ConfigError::Parse { .. }));
		assert_matches!(
			RegistryConfig::from_file(&dir.path().join("missing.yaml")),
			Err(ConfigError::Io(_))
		);
	}
}
