// Integration tests for the registry loading and validation pipeline

use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use toolhub::config::{RegistryConfig, ValidationConfig};
use toolhub::services::ServiceRegistry;
use toolhub::validation::{MappingIssueKind, Report, Severity, StageReport};
use toolhub::{LoaderError, RegistryBuilder, RegistryLoader, ValidationMode};

fn manifest_dir() -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn fixture_config(mode: ValidationMode) -> RegistryConfig {
	let fixture = manifest_dir().join("tests/fixtures/two_methods");
	RegistryConfig {
		inventory: fixture.join("methods_inventory.yaml"),
		tools_dir: fixture.join("tools"),
		source_root: fixture.join("src"),
		validation: ValidationConfig {
			mode,
			drift_detection: false,
			parameter_mapping: true,
		},
	}
}

fn bundled_config() -> RegistryConfig {
	let root = manifest_dir().join("../..");
	RegistryConfig {
		inventory: root.join("config/methods_inventory.yaml"),
		tools_dir: root.join("config/tools"),
		source_root: manifest_dir().join("src"),
		validation: ValidationConfig::default(),
	}
}

fn empty_builder() -> RegistryBuilder {
	RegistryBuilder::new(ServiceRegistry::new())
}

/// Two methods and two tools; only the first method has a tool, the second
/// tool references no method
#[test]
fn test_strict_mode_reports_uncovered_method() {
	let loader = RegistryLoader::new(fixture_config(ValidationMode::Strict));
	let err = loader.load_into(empty_builder()).err().expect("strict load should fail");

	assert!(err.to_string().starts_with("Coverage validation failed"), "{err}");
	assert_matches!(&err, LoaderError::Validation { stage: "Coverage", .. });
	let Some(StageReport::Coverage(coverage)) = err.report() else {
		panic!("expected a coverage report, got {err:?}");
	};
	assert_eq!(coverage.missing_tools, vec!["ReportService.archive_report".to_string()]);
	assert!(coverage.orphaned_tools.is_empty());
	assert_eq!(
		coverage.covered_methods["ReportService.build_report"],
		vec!["build_report_tool".to_string()]
	);
}

#[test]
fn test_warning_mode_returns_every_report() -> anyhow::Result<()> {
	let loader = RegistryLoader::new(fixture_config(ValidationMode::Warning));
	let result = loader.load_into(empty_builder())?;

	assert_eq!(result.methods_loaded, 2);
	assert_eq!(result.tools_loaded, 2);
	assert!(result.has_errors());
	assert_eq!(result.coverage.error_count(), 1);
	assert!(!result.consistency.has_errors(), "{}", result.consistency.summary());

	let mapping = result.parameter_mapping.as_ref().expect("mapping enabled");
	assert_eq!(mapping.checked_tools, vec!["build_report_tool".to_string()]);
	assert!(mapping.issues.is_empty(), "{:?}", mapping.issues);
	assert_eq!(result.error_count(), 1);

	let registry = &result.registry;
	assert_eq!(
		registry.get_hierarchical_tool_path("build_report_tool").as_deref(),
		Some("automation/casefile/process/build_report_tool")
	);
	assert!(registry.get_hierarchical_tool_path("summarize_tool").is_none());
	Ok(())
}

#[test]
fn test_bundled_configuration_passes_strict_validation() -> anyhow::Result<()> {
	let result = RegistryLoader::new(bundled_config()).load()?;

	assert_eq!(result.methods_loaded, 7);
	assert_eq!(result.tools_loaded, 7);
	assert!(!result.has_errors(), "{result:?}");
	assert!(result.coverage.is_complete());

	let drift = result.drift.as_ref().expect("drift enabled");
	assert_eq!(
		drift.scanned_services,
		vec!["CasefileService".to_string(), "ToolSessionService".to_string()]
	);
	assert!(!drift.has_drift());
	assert!(drift.scan_errors.is_empty());

	let mapping = result.parameter_mapping.as_ref().expect("mapping enabled");
	assert_eq!(
		mapping.checked_tools,
		vec!["create_casefile_tool".to_string(), "list_casefiles_tool".to_string()]
	);
	Ok(())
}

fn write(path: &Path, content: &str) -> anyhow::Result<()> {
	if let Some(parent) = path.parent() {
		fs_err::create_dir_all(parent)?;
	}
	fs_err::write(path, content)?;
	Ok(())
}

const DRIVE_INVENTORY: &str = r#"
services:
  - name: DriveService
    module: services::drive
    methods:
      - name: list_files
        description: List files
        classification: { domain: workspace, subdomain: drive, capability: list, complexity: atomic, maturity: beta, integration_tier: external }
        parameters:
          - { name: folder, param_type: str, required: true }
          - { name: page_size, param_type: int, required: true }
      - name: share_file
        description: Share a file
        classification: { domain: workspace, subdomain: drive, capability: update, complexity: atomic, maturity: beta, integration_tier: external }
        parameters:
          - { name: file_id, param_type: str, required: true }
          - { name: ratio, param_type: float, required: true }
"#;

#[test]
fn test_drift_is_reported_in_both_directions() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;
	write(&dir.path().join("methods_inventory.yaml"), DRIVE_INVENTORY)?;
	write(
		&dir.path().join("src/services/drive.rs"),
		r#"
pub struct DriveService;

impl DriveService {
	pub async fn list_files(&self, folder: String) -> Vec<String> {
		vec![folder]
	}

	pub async fn upload_file(&self) {}
}
"#,
	)?;

	let config = RegistryConfig {
		inventory: dir.path().join("methods_inventory.yaml"),
		tools_dir: dir.path().join("tools"),
		source_root: dir.path().join("src"),
		validation: ValidationConfig {
			mode: ValidationMode::Warning,
			drift_detection: true,
			parameter_mapping: false,
		},
	};
	let result = RegistryLoader::new(config).load_into(empty_builder())?;

	let drift = result.drift.as_ref().expect("drift enabled");
	assert_eq!(drift.missing_in_yaml, vec!["DriveService.upload_file".to_string()]);
	assert_eq!(drift.missing_in_code, vec!["DriveService.share_file".to_string()]);
	assert!(result.parameter_mapping.is_none());
	Ok(())
}

#[test]
fn test_parameter_type_compatibility() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;
	write(&dir.path().join("methods_inventory.yaml"), DRIVE_INVENTORY)?;
	write(
		&dir.path().join("tools/list_files.yaml"),
		r#"
name: list_files_tool
description: List files
parameters:
  - { name: folder, type: string, required: true }
  - { name: page_size, type: string, required: true }
implementation: { type: method_wrapper }
method_reference: { service: DriveService, method: list_files }
"#,
	)?;
	write(
		&dir.path().join("tools/share_file.yaml"),
		r#"
name: share_file_tool
description: Share a file
parameters:
  - { name: file_id, type: string, required: true }
  - { name: ratio, type: integer, required: true }
implementation: { type: method_wrapper }
method_reference: { service: DriveService, method: share_file }
"#,
	)?;

	let mut config = fixture_config(ValidationMode::Strict);
	config.inventory = dir.path().join("methods_inventory.yaml");
	config.tools_dir = dir.path().join("tools");
	let err = RegistryLoader::new(config.clone())
		.load_into(empty_builder())
		.err()
		.expect("string tool parameter against int method parameter should fail");
	assert!(err.to_string().starts_with("Parameter mapping validation failed"), "{err}");

	let result = RegistryLoader::new(config.with_mode(ValidationMode::Warning)).load_into(empty_builder())?;
	let mapping = result.parameter_mapping.as_ref().expect("mapping enabled");
	let errors: Vec<(&str, &str, MappingIssueKind)> = mapping
		.issues
		.iter()
		.filter(|i| i.severity == Severity::Error)
		.map(|i| (i.tool.as_str(), i.parameter.as_str(), i.kind))
		.collect();
	assert_eq!(
		errors,
		vec![("list_files_tool", "page_size", MappingIssueKind::TypeMismatch)]
	);
	assert_eq!(mapping.issues_for("share_file_tool").count(), 0);
	Ok(())
}
