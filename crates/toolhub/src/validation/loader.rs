// Registry loading pipeline
//
// Loads methods, then tools, freezes the registry and runs the validation
// stages in order. In strict mode the first stage with errors aborts the
// load; in warning mode every report is returned with the registry.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::consistency::{ConsistencyReport, check_consistency};
use super::coverage::{CoverageReport, check_coverage};
use super::drift::{DriftDetector, DriftReport};
use super::parameter_mapping::{ParameterMappingReport, check_parameter_mapping};
use super::{Report, ValidationMode};
use crate::config::RegistryConfig;
use crate::registry::{Registry, RegistryBuilder, RegistryError};
use crate::services::ServiceRegistry;

/// Report of the stage that failed a strict load
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageReport {
	Coverage(CoverageReport),
	Consistency(ConsistencyReport),
	Drift(DriftReport),
	ParameterMapping(ParameterMappingReport),
}

impl StageReport {
	pub fn as_report(&self) -> &dyn Report {
		match self {
			StageReport::Coverage(r) => r,
			StageReport::Consistency(r) => r,
			StageReport::Drift(r) => r,
			StageReport::ParameterMapping(r) => r,
		}
	}
}

impl From<CoverageReport> for StageReport {
	fn from(report: CoverageReport) -> Self {
		StageReport::Coverage(report)
	}
}

impl From<ConsistencyReport> for StageReport {
	fn from(report: ConsistencyReport) -> Self {
		StageReport::Consistency(report)
	}
}

impl From<DriftReport> for StageReport {
	fn from(report: DriftReport) -> Self {
		StageReport::Drift(report)
	}
}

impl From<ParameterMappingReport> for StageReport {
	fn from(report: ParameterMappingReport) -> Self {
		StageReport::ParameterMapping(report)
	}
}

#[derive(Error, Debug)]
pub enum LoaderError {
	#[error("method loading failed: {0}")]
	MethodLoad(#[source] RegistryError),

	#[error("tool loading failed: {0}")]
	ToolLoad(#[source] RegistryError),

	#[error("{stage} validation failed: {summary}")]
	Validation {
		stage: &'static str,
		summary: String,
		report: Box<StageReport>,
	},
}

impl LoaderError {
	/// Report of the failing stage, for validation failures
	pub fn report(&self) -> Option<&StageReport> {
		match self {
			LoaderError::Validation { report, .. } => Some(report),
			_ => None,
		}
	}
}

/// Registry plus the reports of every stage that ran
#[derive(Clone, Serialize)]
pub struct LoadResult {
	#[serde(skip)]
	pub registry: Arc<Registry>,

	pub mode: ValidationMode,
	pub methods_loaded: usize,
	pub tools_loaded: usize,
	pub coverage: CoverageReport,
	pub consistency: ConsistencyReport,

	/// Absent when drift detection is disabled
	pub drift: Option<DriftReport>,

	/// Absent when parameter mapping validation is disabled
	pub parameter_mapping: Option<ParameterMappingReport>,
}

impl fmt::Debug for LoadResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LoadResult")
			.field("mode", &self.mode)
			.field("methods_loaded", &self.methods_loaded)
			.field("tools_loaded", &self.tools_loaded)
			.field("coverage", &self.coverage)
			.field("consistency", &self.consistency)
			.field("drift", &self.drift)
			.field("parameter_mapping", &self.parameter_mapping)
			.finish_non_exhaustive()
	}
}

impl LoadResult {
	pub fn reports(&self) -> Vec<&dyn Report> {
		let mut reports: Vec<&dyn Report> = vec![&self.coverage, &self.consistency];
		if let Some(drift) = &self.drift {
			reports.push(drift);
		}
		if let Some(mapping) = &self.parameter_mapping {
			reports.push(mapping);
		}
		reports
	}

	pub fn has_errors(&self) -> bool {
		self.reports().iter().any(|r| r.has_errors())
	}

	pub fn error_count(&self) -> usize {
		self.reports().iter().map(|r| r.error_count()).sum()
	}

	pub fn warning_count(&self) -> usize {
		self.reports().iter().map(|r| r.warning_count()).sum()
	}
}

pub struct RegistryLoader {
	config: RegistryConfig,
}

impl RegistryLoader {
	pub fn new(config: RegistryConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	/// Load the bundled services, the inventory and the tool specs
	pub fn load(&self) -> Result<LoadResult, LoaderError> {
		self.load_into(RegistryBuilder::new(ServiceRegistry::with_defaults()))
	}

	/// Run the pipeline on top of a builder that may already hold
	/// code-registered methods and tools
	pub fn load_into(&self, mut builder: RegistryBuilder) -> Result<LoadResult, LoaderError> {
		let mode = self.config.validation.mode;
		info!(
			target: "registry",
			mode = %mode,
			inventory = %self.config.inventory.display(),
			tools_dir = %self.config.tools_dir.display(),
			"loading registry"
		);

		let declared = builder
			.register_service_methods()
			.map_err(LoaderError::MethodLoad)?;
		let inventory = builder
			.load_inventory(&self.config.inventory)
			.map_err(LoaderError::MethodLoad)?;
		if builder.methods().is_empty() {
			return Err(LoaderError::MethodLoad(RegistryError::NoMethods));
		}
		let methods_loaded = builder.methods().len();
		info!(
			target: "registry",
			code = declared,
			inventory,
			total = methods_loaded,
			"methods loaded"
		);

		let generated = builder
			.load_tool_specs(&self.config.tools_dir)
			.map_err(LoaderError::ToolLoad)?;
		let tools_loaded = builder.tools().len();
		info!(target: "registry", generated, total = tools_loaded, "tools loaded");

		let registry = Arc::new(builder.build());

		let coverage = self.enforce(check_coverage(&registry))?;
		let consistency = self.enforce(check_consistency(&registry))?;
		let drift = if self.config.validation.drift_detection {
			let detector = DriftDetector::new(&self.config.source_root);
			Some(self.enforce(detector.detect(&registry))?)
		} else {
			info!(target: "registry", "drift detection disabled");
			None
		};
		let parameter_mapping = if self.config.validation.parameter_mapping {
			Some(self.enforce(check_parameter_mapping(&registry))?)
		} else {
			None
		};

		let result = LoadResult {
			registry,
			mode,
			methods_loaded,
			tools_loaded,
			coverage,
			consistency,
			drift,
			parameter_mapping,
		};
		info!(
			target: "registry",
			methods = methods_loaded,
			tools = tools_loaded,
			errors = result.error_count(),
			warnings = result.warning_count(),
			"registry loaded"
		);
		Ok(result)
	}

	fn enforce<R>(&self, report: R) -> Result<R, LoaderError>
	where
		R: Report + Into<StageReport>,
	{
		let stage = report.stage();
		if !report.has_errors() {
			info!(
				target: "registry",
				stage,
				warnings = report.warning_count(),
				"{}",
				report.summary()
			);
			return Ok(report);
		}

		match self.config.validation.mode {
			ValidationMode::Strict => {
				let summary = report.summary();
				error!(target: "registry", stage, errors = report.error_count(), "{summary}");
				Err(LoaderError::Validation {
					stage,
					summary,
					report: Box::new(report.into()),
				})
			},
			ValidationMode::Warning => {
				warn!(
					target: "registry",
					stage,
					errors = report.error_count(),
					warnings = report.warning_count(),
					"{}",
					report.summary()
				);
				Ok(report)
			},
		}
	}
}
