// Registry validation pipeline
//
// Each stage inspects a frozen `Registry` and produces a report:
// - coverage: every method has a tool and every tool reference resolves
// - consistency: duplicate keys, incomplete declarations, version spread
// - drift: public service methods versus registered methods
// - parameter mapping: tool parameters versus method parameters
//
// `RegistryLoader` sequences the stages and applies the validation mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod consistency;
pub mod coverage;
pub mod drift;
pub mod loader;
pub mod parameter_mapping;

pub use consistency::{ConsistencyReport, check_consistency};
pub use coverage::{CoverageReport, OrphanedTool, check_coverage};
pub use drift::{DriftDetector, DriftReport, ScanError};
pub use loader::{LoadResult, LoaderError, RegistryLoader, StageReport};
pub use parameter_mapping::{MappingIssue, MappingIssueKind, ParameterMappingReport, check_parameter_mapping};

/// Common surface of every stage report
pub trait Report {
	/// Stage name used in logs and error messages
	fn stage(&self) -> &'static str;

	fn error_count(&self) -> usize;

	fn warning_count(&self) -> usize;

	fn has_errors(&self) -> bool {
		self.error_count() > 0
	}

	/// One-line description of the findings
	fn summary(&self) -> String;
}

/// How validation findings affect loading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
	/// The first stage reporting errors aborts the load
	#[default]
	Strict,
	/// Findings are logged and returned with the registry
	Warning,
}

impl ValidationMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ValidationMode::Strict => "strict",
			ValidationMode::Warning => "warning",
		}
	}
}

impl fmt::Display for ValidationMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ValidationMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"strict" => Ok(ValidationMode::Strict),
			"warning" | "warn" => Ok(ValidationMode::Warning),
			other => Err(format!("unknown validation mode '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Error,
	Warning,
	Info,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Severity::Error => "error",
			Severity::Warning => "warning",
			Severity::Info => "info",
		})
	}
}
