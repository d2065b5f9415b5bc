// YAML method inventory
//
// The inventory lists methods per service:
//
//   services:
//     - name: CasefileService
//       module: services::casefile
//       methods:
//         - name: create_casefile
//           classification: { domain: workspace, ... }
//           models: { request: CreateCasefileRequest, response: CreateCasefileResponse }
//
// Model references resolve through a `ModelCatalog` populated by the
// services. Unresolvable models and malformed methods are logged and
// tolerated; an unparsable file is not.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::error::RegistryError;
use super::methods::MethodRegistration;
use super::schema::ModelSchema;
use super::types::{Classification, MethodBusinessRules, MethodDefinition, MethodParameterDef, default_version};

/// Static map from `module.Name` to model descriptors
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
	models: HashMap<String, Arc<ModelSchema>>,
}

impl ModelCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register the model derived from `T` under `module`
	pub fn register<T: JsonSchema>(&mut self, module: &str) {
		self.insert(module, ModelSchema::of::<T>());
	}

	pub fn insert(&mut self, module: &str, model: ModelSchema) {
		let key = format!("{}.{}", module, model.name);
		self.models.insert(key, Arc::new(model));
	}

	/// Look up `name` in `module`, or `name` itself when already qualified
	pub fn resolve(&self, module: &str, name: &str) -> Option<Arc<ModelSchema>> {
		self
			.models
			.get(&format!("{}.{}", module, name))
			.or_else(|| self.models.get(name))
			.cloned()
	}

	pub fn len(&self) -> usize {
		self.models.len()
	}

	pub fn is_empty(&self) -> bool {
		self.models.is_empty()
	}
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
	#[serde(default)]
	services: Vec<InventoryService>,
}

#[derive(Debug, Deserialize)]
struct InventoryService {
	name: String,

	#[serde(default)]
	module: String,

	/// Kept untyped so one malformed method does not reject the file
	#[serde(default)]
	methods: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct InventoryMethod {
	name: String,

	#[serde(default)]
	description: String,

	#[serde(default = "default_version")]
	version: String,

	classification: Classification,

	#[serde(default)]
	models: Option<ModelRefs>,

	#[serde(default)]
	business_rules: Option<MethodBusinessRules>,

	/// Explicit parameters, authoritative over the request model
	#[serde(default)]
	parameters: Option<Vec<MethodParameterDef>>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelRefs {
	#[serde(default)]
	module: Option<String>,

	#[serde(default)]
	request: Option<String>,

	#[serde(default)]
	response: Option<String>,
}

/// Load method definitions from an inventory file
///
/// A missing file yields no methods and a warning.
pub fn load_inventory(path: &Path, catalog: &ModelCatalog) -> Result<Vec<MethodDefinition>, RegistryError> {
	if !path.exists() {
		warn!(target: "registry", path = %path.display(), "method inventory not found");
		return Ok(Vec::new());
	}

	let content = fs_err::read_to_string(path)?;
	let methods = parse_inventory(&content, catalog).map_err(|e| RegistryError::yaml(path, e))?;
	info!(
		target: "registry",
		path = %path.display(),
		methods = methods.len(),
		"loaded method inventory"
	);
	Ok(methods)
}

/// Parse inventory YAML into method definitions
pub fn parse_inventory(content: &str, catalog: &ModelCatalog) -> Result<Vec<MethodDefinition>, serde_yaml::Error> {
	let file: InventoryFile = serde_yaml::from_str(content)?;
	let mut methods = Vec::new();

	for service in file.services {
		for raw in &service.methods {
			let method: InventoryMethod = match serde_yaml::from_value(raw.clone()) {
				Ok(method) => method,
				Err(e) => {
					warn!(
						target: "registry",
						service = %service.name,
						error = %e,
						"skipping malformed inventory method"
					);
					continue;
				},
			};

			let name = format!("{}.{}", service.name, method.name);
			match build_method(&service, method, catalog) {
				Ok(definition) => {
					debug!(target: "registry", method = %name, "parsed inventory method");
					methods.push(definition);
				},
				Err(e) => {
					warn!(target: "registry", method = %name, error = %e, "skipping inventory method");
				},
			}
		}
	}

	Ok(methods)
}

fn build_method(
	service: &InventoryService,
	method: InventoryMethod,
	catalog: &ModelCatalog,
) -> Result<MethodDefinition, RegistryError> {
	let key = format!("{}.{}", service.name, method.name);
	let refs = method.models.unwrap_or_default();
	let model_module = refs.module.as_deref().unwrap_or(&service.module);

	let mut registration = MethodRegistration::new(method.name, method.description)
		.service(&service.name, &service.module)
		.classification(method.classification)
		.version(method.version);

	if let Some(rules) = method.business_rules {
		registration = registration.business_rules(rules);
	}

	if let Some(request) = refs.request.as_deref() {
		match catalog.resolve(model_module, request) {
			Some(model) => registration = registration.request_model(model.as_ref().clone()),
			None => {
				warn!(target: "registry", method = %key, model = request, "request model not found");
			},
		}
	}
	if let Some(response) = refs.response.as_deref() {
		match catalog.resolve(model_module, response) {
			Some(model) => registration = registration.response_model(model.as_ref().clone()),
			None => {
				warn!(target: "registry", method = %key, model = response, "response model not found");
			},
		}
	}

	for parameter in method.parameters.unwrap_or_default() {
		registration = registration.parameter(parameter);
	}

	registration.build()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::schema::{FieldSchema, FieldType};
	use crate::registry::types::{Capability, Subdomain};

	fn catalog() -> ModelCatalog {
		let payload = Arc::new(
			ModelSchema::builder("NotePayload")
				.field(FieldSchema::new("body", FieldType::Str).max_length(500))
				.build(),
		);
		let mut catalog = ModelCatalog::new();
		catalog.insert(
			"services::notes",
			ModelSchema::builder("AddNoteRequest")
				.field(FieldSchema::new("user_id", FieldType::Str))
				.field(FieldSchema::new("payload", FieldType::Model("NotePayload".into())).with_nested(payload))
				.build(),
		);
		catalog
	}

	const INVENTORY: &str = r#"
services:
  - name: NoteService
    module: services::notes
    methods:
      - name: add_note
        description: Attach a note
        version: 1.1.0
        classification:
          domain: workspace
          subdomain: casefile
          capability: update
          complexity: atomic
          maturity: beta
          integration_tier: internal
        models:
          request: AddNoteRequest
          response: AddNoteResponse
        business_rules:
          requires_casefile: true
      - name: broken
        classification:
          domain: not_a_domain
          subdomain: casefile
          capability: read
          complexity: atomic
          maturity: beta
          integration_tier: internal
      - name: explicit
        description: Explicit parameters
        classification:
          domain: workspace
          subdomain: casefile
          capability: search
          complexity: atomic
          maturity: stable
          integration_tier: internal
        parameters:
          - name: query
            param_type: str
            min_length: 2
"#;

	#[test]
	fn test_parse_inventory() {
		let methods = parse_inventory(INVENTORY, &catalog()).unwrap();
		assert_eq!(methods.len(), 2);

		let add = &methods[0];
		assert_eq!(add.key(), "NoteService.add_note");
		assert_eq!(add.metadata.version, "1.1.0");
		assert_eq!(add.metadata.module_path, "services::notes");
		assert_eq!(add.classification().capability, Capability::Update);
		assert_eq!(add.classification().subdomain, Subdomain::Casefile);
		assert!(add.business_rules.requires_casefile);
		assert!(add.request_model.is_some());
		assert!(add.response_model.is_none());
		assert_eq!(add.parameters.len(), 1);
		assert_eq!(add.parameters[0].name, "body");
		assert_eq!(add.parameters[0].constraints.max_length, Some(500));

		let explicit = &methods[1];
		assert!(explicit.request_model.is_none());
		assert_eq!(explicit.parameters[0].name, "query");
		assert_eq!(explicit.parameters[0].constraints.min_length, Some(2));
	}

	#[test]
	fn test_unparsable_file_is_an_error() {
		assert!(parse_inventory("services: [", &ModelCatalog::new()).is_err());
	}

	#[test]
	fn test_missing_file_yields_no_methods() {
		let dir = tempfile::tempdir().unwrap();
		let methods = load_inventory(&dir.path().join("missing.yaml"), &ModelCatalog::new()).unwrap();
		assert!(methods.is_empty());
	}

	#[test]
	fn test_catalog_resolves_qualified_names() {
		let catalog = catalog();
		assert!(catalog.resolve("services::notes", "AddNoteRequest").is_some());
		assert!(catalog.resolve("elsewhere", "services::notes.AddNoteRequest").is_some());
		assert!(catalog.resolve("elsewhere", "AddNoteRequest").is_none());
	}
}
