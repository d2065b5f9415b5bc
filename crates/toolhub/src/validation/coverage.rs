// Method/tool coverage

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::Report;
use crate::registry::{MethodKey, Registry};

/// Tool whose method reference resolves to nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedTool {
	pub tool: String,
	pub reference: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageReport {
	pub total_methods: usize,
	pub total_tools: usize,

	/// Method key to the tools that reference it
	pub covered_methods: BTreeMap<MethodKey, Vec<String>>,

	/// Methods no tool references
	pub missing_tools: Vec<MethodKey>,

	pub orphaned_tools: Vec<OrphanedTool>,

	/// Reserved for request model versus tool parameter comparison
	pub signature_mismatches: Vec<String>,
}

impl CoverageReport {
	pub fn is_complete(&self) -> bool {
		self.missing_tools.is_empty() && self.orphaned_tools.is_empty()
	}
}

impl Report for CoverageReport {
	fn stage(&self) -> &'static str {
		"Coverage"
	}

	fn error_count(&self) -> usize {
		self.missing_tools.len() + self.orphaned_tools.len() + self.signature_mismatches.len()
	}

	fn warning_count(&self) -> usize {
		0
	}

	fn summary(&self) -> String {
		let mut parts = Vec::new();
		if !self.missing_tools.is_empty() {
			parts.push(format!(
				"{} method(s) without tools: {}",
				self.missing_tools.len(),
				self.missing_tools.join(", ")
			));
		}
		if !self.orphaned_tools.is_empty() {
			let orphans: Vec<String> = self
				.orphaned_tools
				.iter()
				.map(|o| format!("{} -> {}", o.tool, o.reference))
				.collect();
			parts.push(format!("{} orphaned tool(s): {}", orphans.len(), orphans.join(", ")));
		}
		if !self.signature_mismatches.is_empty() {
			parts.push(format!(
				"{} signature mismatch(es): {}",
				self.signature_mismatches.len(),
				self.signature_mismatches.join(", ")
			));
		}
		if parts.is_empty() {
			format!(
				"{} method(s) covered by {} tool(s)",
				self.covered_methods.len(),
				self.total_tools
			)
		} else {
			parts.join("; ")
		}
	}
}

/// Map tools to the methods they reference
///
/// A tool without any method reference counts as neither covering nor
/// orphaned.
pub fn check_coverage(registry: &Registry) -> CoverageReport {
	let mut report = CoverageReport {
		total_methods: registry.method_count(),
		total_tools: registry.tool_count(),
		..Default::default()
	};

	for tool in registry.list_tools() {
		let Some(reference) = tool.method_key() else {
			debug!(target: "registry", tool = %tool.name, "tool has no method reference");
			continue;
		};
		match registry.resolve_method(&reference) {
			Some(method) => report
				.covered_methods
				.entry(method.key())
				.or_default()
				.push(tool.name.clone()),
			None => report.orphaned_tools.push(OrphanedTool {
				tool: tool.name.clone(),
				reference,
			}),
		}
	}

	report.missing_tools = registry
		.list_methods()
		.map(|method| method.key())
		.filter(|key| !report.covered_methods.contains_key(key))
		.collect();

	report
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::schema::ModelSchema;
	use crate::registry::types::{
		Capability, Classification, Complexity, Domain, IntegrationTier, Maturity, MethodRef, Subdomain,
	};
	use crate::registry::{MethodRegistration, RegistryBuilder, ToolRegistration};
	use crate::services::ServiceRegistry;

	fn classification() -> Classification {
		Classification {
			domain: Domain::Workspace,
			subdomain: Subdomain::Casefile,
			capability: Capability::Read,
			complexity: Complexity::Atomic,
			maturity: Maturity::Stable,
			integration_tier: IntegrationTier::Internal,
		}
	}

	fn method(name: &str) -> MethodRegistration {
		MethodRegistration::new(name, "test method")
			.service("CasefileService", "services::casefile")
			.classification(classification())
	}

	fn tool(name: &str) -> ToolRegistration {
		ToolRegistration::new(name, ModelSchema::empty("Empty")).description("test tool")
	}

	#[test]
	fn test_full_coverage() {
		let mut builder = RegistryBuilder::new(ServiceRegistry::new());
		builder.register_method(method("get_casefile")).unwrap();
		builder.register_method(method("list_casefiles")).unwrap();
		builder
			.register_tool(tool("get_casefile_tool").method_name("get_casefile"))
			.unwrap();
		builder
			.register_tool(
				tool("list_casefiles_tool").method_reference(MethodRef::new("CasefileService", "list_casefiles")),
			)
			.unwrap();
		builder
			.register_tool(tool("list_recent_tool").metadata("method_name", "CasefileService.list_casefiles".into()))
			.unwrap();

		let report = check_coverage(&builder.build());
		assert!(report.is_complete());
		assert!(!report.has_errors());
		assert_eq!(report.total_methods, 2);
		assert_eq!(report.total_tools, 3);
		assert_eq!(
			report.covered_methods["CasefileService.list_casefiles"],
			vec!["list_casefiles_tool".to_string(), "list_recent_tool".to_string()]
		);
	}

	#[test]
	fn test_missing_and_orphaned() {
		let mut builder = RegistryBuilder::new(ServiceRegistry::new());
		builder.register_method(method("get_casefile")).unwrap();
		builder.register_method(method("delete_casefile")).unwrap();
		builder
			.register_tool(tool("get_casefile_tool").method_name("CasefileService.get_casefile"))
			.unwrap();
		builder
			.register_tool(tool("archive_tool").method_name("CasefileService.archive_casefile"))
			.unwrap();
		builder.register_tool(tool("free_tool")).unwrap();

		let report = check_coverage(&builder.build());
		assert_eq!(report.missing_tools, vec!["CasefileService.delete_casefile".to_string()]);
		assert_eq!(
			report.orphaned_tools,
			vec![OrphanedTool {
				tool: "archive_tool".into(),
				reference: "CasefileService.archive_casefile".into(),
			}]
		);
		assert_eq!(report.error_count(), 2);
		assert!(report.summary().contains("CasefileService.delete_casefile"));
		assert!(report.summary().contains("archive_tool -> CasefileService.archive_casefile"));
	}
}
