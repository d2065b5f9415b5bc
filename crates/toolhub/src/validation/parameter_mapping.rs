// Tool parameter versus method parameter compatibility

use serde::Serialize;

use super::{Report, Severity};
use crate::registry::generator::ORCHESTRATION_FIELDS;
use crate::registry::schema::{Constraints, FieldType};
use crate::registry::types::{MethodDefinition, MethodParameterDef, ToolDefinition, ToolParameterDef};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingIssueKind {
	TypeMismatch,
	ConstraintMismatch,
	RequiredMismatch,
	MissingRequiredParameter,
	UndeclaredMethodParameter,
	UnmappedToolParameter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingIssue {
	pub tool: String,
	pub method: String,
	pub parameter: String,
	pub severity: Severity,
	pub kind: MappingIssueKind,
	pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParameterMappingReport {
	/// Tools compared against their method
	pub checked_tools: Vec<String>,

	/// Tools that inherit their parameters or reference no known method
	pub skipped_tools: Vec<String>,

	pub issues: Vec<MappingIssue>,
}

impl ParameterMappingReport {
	pub fn count(&self, severity: Severity) -> usize {
		self.issues.iter().filter(|i| i.severity == severity).count()
	}

	pub fn issues_for(&self, tool: &str) -> impl Iterator<Item = &MappingIssue> {
		self.issues.iter().filter(move |i| i.tool == tool)
	}
}

impl Report for ParameterMappingReport {
	fn stage(&self) -> &'static str {
		"Parameter mapping"
	}

	fn error_count(&self) -> usize {
		self.count(Severity::Error)
	}

	fn warning_count(&self) -> usize {
		self.count(Severity::Warning)
	}

	fn summary(&self) -> String {
		let errors: Vec<String> = self
			.issues
			.iter()
			.filter(|i| i.severity == Severity::Error)
			.map(|i| format!("{}.{}: {}", i.tool, i.parameter, i.message))
			.collect();
		if errors.is_empty() {
			format!(
				"{} tool(s) checked, {} warning(s), {} info",
				self.checked_tools.len(),
				self.warning_count(),
				self.count(Severity::Info)
			)
		} else {
			errors.join("; ")
		}
	}
}

/// Whether a tool parameter type can carry a method parameter type
///
/// The JSON Schema and Rust spellings of a type are equivalent, and integers
/// and floats are interchangeable. A top-level `Optional` is ignored on both
/// sides since requiredness is compared separately. Generic arguments are
/// compared recursively; an `Any` argument, as in a bare `array` or `object`,
/// leaves the element type open. A top-level `Any` only matches `Any`.
pub fn types_compatible(tool_type: &str, method_type: &str) -> bool {
	if tool_type.trim() == method_type.trim() {
		return true;
	}
	let (tool, method) = (FieldType::parse(tool_type), FieldType::parse(method_type));
	field_types_compatible(tool.unwrap_optional(), method.unwrap_optional())
}

fn field_types_compatible(tool: &FieldType, method: &FieldType) -> bool {
	match (tool, method) {
		(FieldType::Int | FieldType::Float, FieldType::Int | FieldType::Float) => true,
		(FieldType::List(ours), FieldType::List(theirs)) => arguments_compatible(ours, theirs),
		(FieldType::Dict(our_key, our_value), FieldType::Dict(their_key, their_value)) => {
			arguments_compatible(our_key, their_key) && arguments_compatible(our_value, their_value)
		},
		(FieldType::Optional(ours), FieldType::Optional(theirs)) => field_types_compatible(ours, theirs),
		(FieldType::Union(ours), FieldType::Union(theirs)) => {
			ours.len() == theirs.len() && ours.iter().zip(theirs).all(|(a, b)| field_types_compatible(a, b))
		},
		(ours, theirs) => ours == theirs,
	}
}

fn arguments_compatible(tool: &FieldType, method: &FieldType) -> bool {
	matches!(tool, FieldType::Any) || matches!(method, FieldType::Any) || field_types_compatible(tool, method)
}

struct Comparison<'a> {
	tool: &'a ToolDefinition,
	method: &'a MethodDefinition,
	issues: Vec<MappingIssue>,
}

impl Comparison<'_> {
	fn push(&mut self, parameter: &str, severity: Severity, kind: MappingIssueKind, message: String) {
		self.issues.push(MappingIssue {
			tool: self.tool.name.clone(),
			method: self.method.key(),
			parameter: parameter.to_string(),
			severity,
			kind,
			message,
		});
	}

	fn compare(&mut self, tool_param: &ToolParameterDef, method_param: &MethodParameterDef) {
		let name = tool_param.name.as_str();
		if !types_compatible(&tool_param.param_type, &method_param.param_type) {
			self.push(
				name,
				Severity::Error,
				MappingIssueKind::TypeMismatch,
				format!(
					"tool type '{}' is incompatible with method type '{}'",
					tool_param.param_type, method_param.param_type
				),
			);
		}
		self.compare_constraints(name, &tool_param.constraints, &method_param.constraints);
		if tool_param.required != method_param.required {
			self.push(
				name,
				Severity::Warning,
				MappingIssueKind::RequiredMismatch,
				format!(
					"required is {} on the tool but {} on the method",
					tool_param.required, method_param.required
				),
			);
		}
	}

	fn compare_constraints(&mut self, name: &str, tool: &Constraints, method: &Constraints) {
		let numeric = [
			("min_value", tool.min_value, method.min_value),
			("max_value", tool.max_value, method.max_value),
			("exclusive_minimum", tool.exclusive_minimum, method.exclusive_minimum),
			("exclusive_maximum", tool.exclusive_maximum, method.exclusive_maximum),
		];
		for (label, ours, theirs) in numeric {
			if ours != theirs {
				self.push(
					name,
					Severity::Warning,
					MappingIssueKind::ConstraintMismatch,
					format!("{label} differs: tool {ours:?}, method {theirs:?}"),
				);
			}
		}
		let lengths = [
			("min_length", tool.min_length, method.min_length),
			("max_length", tool.max_length, method.max_length),
		];
		for (label, ours, theirs) in lengths {
			if ours != theirs {
				self.push(
					name,
					Severity::Warning,
					MappingIssueKind::ConstraintMismatch,
					format!("{label} differs: tool {ours:?}, method {theirs:?}"),
				);
			}
		}
		if tool.pattern != method.pattern {
			self.push(
				name,
				Severity::Info,
				MappingIssueKind::ConstraintMismatch,
				format!("pattern differs: tool {:?}, method {:?}", tool.pattern, method.pattern),
			);
		}
	}

	fn run(mut self) -> Vec<MappingIssue> {
		let (tool, method) = (self.tool, self.method);
		let mapping = tool.parameter_mapping.clone().unwrap_or_default();

		for tool_param in &tool.parameters {
			match method.parameter(&tool_param.name) {
				Some(method_param) => self.compare(tool_param, method_param),
				None if ORCHESTRATION_FIELDS.contains(&tool_param.name.as_str())
					|| mapping.is_tool_param(&tool_param.name) => {},
				None => self.push(
					&tool_param.name,
					Severity::Info,
					MappingIssueKind::UnmappedToolParameter,
					"not a method parameter and not listed as a tool parameter".to_string(),
				),
			}
		}

		for method_param in &method.parameters {
			if tool.parameters.iter().any(|p| p.name == method_param.name) {
				continue;
			}
			if method_param.required {
				self.push(
					&method_param.name,
					Severity::Error,
					MappingIssueKind::MissingRequiredParameter,
					"required method parameter is not declared by the tool".to_string(),
				);
			} else {
				self.push(
					&method_param.name,
					Severity::Warning,
					MappingIssueKind::UndeclaredMethodParameter,
					"optional method parameter is not declared by the tool".to_string(),
				);
			}
		}

		self.issues
	}
}

/// Compare every tool with explicit parameters against its method
pub fn check_parameter_mapping(registry: &Registry) -> ParameterMappingReport {
	let mut report = ParameterMappingReport::default();

	for tool in registry.list_tools() {
		let method = match registry.method_for_tool(tool) {
			Some(method) if !tool.inherits_parameters() => method,
			_ => {
				report.skipped_tools.push(tool.name.clone());
				continue;
			},
		};
		let comparison = Comparison {
			tool,
			method,
			issues: Vec::new(),
		};
		report.issues.extend(comparison.run());
		report.checked_tools.push(tool.name.clone());
	}

	report
}
