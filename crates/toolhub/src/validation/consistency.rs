// Internal consistency of the method and tool tables

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::Report;
use crate::registry::{MethodKey, Registry};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
	/// Method keys differing only by case
	pub duplicate_methods: Vec<String>,

	/// Method keys whose definition was replaced by a different one; the last
	/// registration is the one in the registry
	pub overwritten_methods: Vec<MethodKey>,

	/// Tool names rejected as duplicates, or differing only by case
	pub duplicate_tools: Vec<String>,

	/// `method <key>` / `tool <name>` entries without a description
	pub missing_descriptions: Vec<String>,

	/// Methods without a service or module path
	pub missing_service: Vec<MethodKey>,

	/// Bare method names shared by several services
	pub ambiguous_method_names: Vec<String>,

	/// Version to the methods declaring it, populated when more than one
	/// version is in use
	pub version_conflicts: BTreeMap<String, Vec<MethodKey>>,
}

impl Report for ConsistencyReport {
	fn stage(&self) -> &'static str {
		"Consistency"
	}

	fn error_count(&self) -> usize {
		self.duplicate_methods.len()
			+ self.duplicate_tools.len()
			+ self.missing_descriptions.len()
			+ self.missing_service.len()
	}

	fn warning_count(&self) -> usize {
		self.overwritten_methods.len()
			+ self.ambiguous_method_names.len()
			+ usize::from(!self.version_conflicts.is_empty())
	}

	fn summary(&self) -> String {
		let sections = [
			("duplicate method(s)", &self.duplicate_methods),
			("duplicate tool(s)", &self.duplicate_tools),
			("missing description(s)", &self.missing_descriptions),
			("method(s) without service", &self.missing_service),
			("overwritten method(s)", &self.overwritten_methods),
			("ambiguous method name(s)", &self.ambiguous_method_names),
		];
		let mut parts: Vec<String> = sections
			.iter()
			.filter(|(_, items)| !items.is_empty())
			.map(|(label, items)| format!("{} {}: {}", items.len(), label, items.join(", ")))
			.collect();
		if !self.version_conflicts.is_empty() {
			let versions: Vec<&str> = self.version_conflicts.keys().map(String::as_str).collect();
			parts.push(format!("multiple method versions: {}", versions.join(", ")));
		}
		if parts.is_empty() {
			"no consistency issues".to_string()
		} else {
			parts.join("; ")
		}
	}
}

/// Names that collide once lowercased, excluding exact repeats
fn case_clashes<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
	let mut groups: HashMap<String, BTreeSet<&str>> = HashMap::new();
	for name in names {
		groups.entry(name.to_lowercase()).or_default().insert(name);
	}
	let mut clashes: Vec<String> = groups
		.into_values()
		.filter(|group| group.len() > 1)
		.flat_map(|group| group.into_iter().map(str::to_string))
		.collect();
	clashes.sort();
	clashes
}

fn push_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
	for item in items {
		if !target.contains(&item) {
			target.push(item);
		}
	}
}

pub fn check_consistency(registry: &Registry) -> ConsistencyReport {
	let mut report = ConsistencyReport::default();

	push_unique(&mut report.overwritten_methods, registry.overwritten_methods().iter().cloned());
	let keys: Vec<MethodKey> = registry.list_methods().map(|m| m.key()).collect();
	push_unique(
		&mut report.duplicate_methods,
		case_clashes(keys.iter().map(String::as_str)),
	);

	push_unique(&mut report.duplicate_tools, registry.duplicate_tools().iter().cloned());
	push_unique(
		&mut report.duplicate_tools,
		case_clashes(registry.list_tools().map(|t| t.name.as_str())),
	);

	let mut versions: BTreeMap<String, Vec<MethodKey>> = BTreeMap::new();
	for method in registry.list_methods() {
		let key = method.key();
		if method.metadata.description.trim().is_empty() {
			report.missing_descriptions.push(format!("method {key}"));
		}
		if method.metadata.service_name.trim().is_empty() || method.metadata.module_path.trim().is_empty() {
			report.missing_service.push(key.clone());
		}
		versions.entry(method.metadata.version.clone()).or_default().push(key);
	}
	for tool in registry.list_tools() {
		if tool.description.trim().is_empty() {
			report.missing_descriptions.push(format!("tool {}", tool.name));
		}
	}

	report.ambiguous_method_names = registry.ambiguous_method_names();
	if versions.len() > 1 {
		report.version_conflicts = versions;
	}

	report
}
