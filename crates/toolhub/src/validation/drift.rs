// Drift between service sources and registered methods
//
// Service sources are parsed with `syn`; the public `async fn` items of the
// inherent `impl <ServiceName>` blocks are the implemented operations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use syn::visit::Visit;
use tracing::{debug, warn};

use super::Report;
use crate::registry::{MethodKey, Registry};

/// A service source that could not be located, read or parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
	pub service: String,
	pub path: PathBuf,
	pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftReport {
	pub scanned_services: Vec<String>,

	/// Implemented in code, not registered
	pub missing_in_yaml: Vec<MethodKey>,

	/// Registered, not implemented in code
	pub missing_in_code: Vec<MethodKey>,

	pub scan_errors: Vec<ScanError>,
}

impl DriftReport {
	pub fn has_drift(&self) -> bool {
		!self.missing_in_yaml.is_empty() || !self.missing_in_code.is_empty()
	}
}

impl Report for DriftReport {
	fn stage(&self) -> &'static str {
		"Drift"
	}

	fn error_count(&self) -> usize {
		self.missing_in_yaml.len() + self.missing_in_code.len()
	}

	fn warning_count(&self) -> usize {
		self.scan_errors.len()
	}

	fn summary(&self) -> String {
		let mut parts = Vec::new();
		if !self.missing_in_yaml.is_empty() {
			parts.push(format!("not registered: {}", self.missing_in_yaml.join(", ")));
		}
		if !self.missing_in_code.is_empty() {
			parts.push(format!("not implemented: {}", self.missing_in_code.join(", ")));
		}
		if !self.scan_errors.is_empty() {
			let services: Vec<&str> = self.scan_errors.iter().map(|e| e.service.as_str()).collect();
			parts.push(format!("unscanned services: {}", services.join(", ")));
		}
		if parts.is_empty() {
			format!("{} service(s) in sync", self.scanned_services.len())
		} else {
			parts.join("; ")
		}
	}
}

/// Compares registered methods with service source files under a root
pub struct DriftDetector {
	source_root: PathBuf,
}

impl DriftDetector {
	pub fn new(source_root: impl Into<PathBuf>) -> Self {
		Self {
			source_root: source_root.into(),
		}
	}

	/// Candidate source files for a module path such as `services::casefile`
	pub fn source_candidates(&self, module_path: &str) -> Vec<PathBuf> {
		let relative: PathBuf = module_path
			.trim_start_matches("crate::")
			.split("::")
			.filter(|segment| !segment.is_empty())
			.collect();
		vec![
			self.source_root.join(&relative).with_extension("rs"),
			self.source_root.join(&relative).join("mod.rs"),
		]
	}

	pub fn detect(&self, registry: &Registry) -> DriftReport {
		let mut report = DriftReport::default();

		let mut services: BTreeMap<String, String> = registry
			.services()
			.entries()
			.map(|entry| (entry.name.clone(), entry.module_path.clone()))
			.collect();
		let mut registered: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
		for method in registry.list_methods() {
			services
				.entry(method.metadata.service_name.clone())
				.or_insert_with(|| method.metadata.module_path.clone());
			registered
				.entry(method.metadata.service_name.clone())
				.or_default()
				.insert(method.name().to_string());
		}

		for (service, module_path) in services {
			let implemented = match self.scan_service(&service, &module_path) {
				Ok(methods) => methods,
				Err(error) => {
					warn!(
						target: "registry",
						service = %service,
						path = %error.path.display(),
						error = %error.message,
						"drift scan skipped service"
					);
					report.scan_errors.push(error);
					continue;
				},
			};
			let declared = registered.remove(&service).unwrap_or_default();

			report.missing_in_yaml.extend(
				implemented
					.difference(&declared)
					.map(|method| format!("{service}.{method}")),
			);
			report.missing_in_code.extend(
				declared
					.difference(&implemented)
					.map(|method| format!("{service}.{method}")),
			);
			debug!(
				target: "registry",
				service = %service,
				implemented = implemented.len(),
				declared = declared.len(),
				"scanned service source"
			);
			report.scanned_services.push(service);
		}

		report
	}

	fn scan_service(&self, service: &str, module_path: &str) -> Result<BTreeSet<String>, ScanError> {
		let scan_error = |path: &Path, message: String| ScanError {
			service: service.to_string(),
			path: path.to_path_buf(),
			message,
		};

		if module_path.trim().is_empty() {
			return Err(scan_error(&self.source_root, "service has no module path".to_string()));
		}
		let candidates = self.source_candidates(module_path);
		let Some(path) = candidates.iter().find(|p| p.is_file()) else {
			return Err(scan_error(&candidates[0], "source file not found".to_string()));
		};

		let source = fs_err::read_to_string(path).map_err(|e| scan_error(path, e.to_string()))?;
		public_async_methods(&source, service).map_err(|e| scan_error(path, e.to_string()))
	}
}

/// Public async methods of the inherent impl blocks of `type_name`
///
/// Trait impls and names starting with `_` are ignored.
pub fn public_async_methods(source: &str, type_name: &str) -> Result<BTreeSet<String>, syn::Error> {
	let file = syn::parse_file(source)?;
	let mut collector = MethodCollector {
		type_name,
		methods: BTreeSet::new(),
	};
	collector.visit_file(&file);
	Ok(collector.methods)
}

struct MethodCollector<'a> {
	type_name: &'a str,
	methods: BTreeSet<String>,
}

impl<'ast> Visit<'ast> for MethodCollector<'_> {
	fn visit_item_impl(&mut self, item: &'ast syn::ItemImpl) {
		if item.trait_.is_some() {
			return;
		}
		let syn::Type::Path(ty) = item.self_ty.as_ref() else {
			return;
		};
		if !ty.path.segments.last().is_some_and(|s| s.ident == self.type_name) {
			return;
		}

		for impl_item in &item.items {
			let syn::ImplItem::Fn(function) = impl_item else {
				continue;
			};
			let name = function.sig.ident.to_string();
			if matches!(function.vis, syn::Visibility::Public(_))
				&& function.sig.asyncness.is_some()
				&& !name.starts_with('_')
			{
				self.methods.insert(name);
			}
		}
	}
}
