// Registry error types

use std::path::PathBuf;

use thiserror::Error;

use super::compiled::SchemaError;

/// Errors that can occur while building the registry
#[derive(Error, Debug)]
pub enum RegistryError {
	#[error("failed to read registry source: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse {path}: {source}")]
	Yaml {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("invalid method registration '{name}': {message}")]
	InvalidMethod { name: String, message: String },

	#[error(transparent)]
	InvalidSchema(#[from] SchemaError),

	#[error("duplicate tool name: '{0}'")]
	DuplicateToolName(String),

	#[error("tool '{tool}' uses unsupported implementation type '{kind}'")]
	UnsupportedImplementation { tool: String, kind: String },

	#[error("no methods registered")]
	NoMethods,
}

impl RegistryError {
	pub fn yaml(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
		Self::Yaml {
			path: path.into(),
			source,
		}
	}

	pub fn invalid_method(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidMethod {
			name: name.into(),
			message: message.into(),
		}
	}
}
