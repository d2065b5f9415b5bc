// Method registration
//
// Methods carry metadata only: registering one never wraps or alters the
// operation it describes.

use std::sync::Arc;

use indexmap::IndexMap;
use schemars::JsonSchema;
use tracing::{debug, warn};

use super::compiled::CompiledModel;
use super::error::RegistryError;
use super::extract::extract_method_parameters;
use super::schema::ModelSchema;
use super::types::{
	Classification, MethodBusinessRules, MethodDefinition, MethodKey, MethodMetadata,
	MethodParameterDef, default_version,
};

/// Builder for a method definition
#[derive(Debug, Clone)]
pub struct MethodRegistration {
	name: String,
	description: String,
	version: String,
	service_name: Option<String>,
	module_path: Option<String>,
	classification: Option<Classification>,
	business_rules: MethodBusinessRules,
	request_model: Option<ModelSchema>,
	response_model: Option<ModelSchema>,
	parameters: Option<Vec<MethodParameterDef>>,
}

impl MethodRegistration {
	pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: description.into(),
			version: default_version(),
			service_name: None,
			module_path: None,
			classification: None,
			business_rules: MethodBusinessRules::default(),
			request_model: None,
			response_model: None,
			parameters: None,
		}
	}

	pub fn service(mut self, name: impl Into<String>, module_path: impl Into<String>) -> Self {
		self.service_name = Some(name.into());
		self.module_path = Some(module_path.into());
		self
	}

	pub fn classification(mut self, classification: Classification) -> Self {
		self.classification = Some(classification);
		self
	}

	pub fn version(mut self, version: impl Into<String>) -> Self {
		self.version = version.into();
		self
	}

	pub fn business_rules(mut self, rules: MethodBusinessRules) -> Self {
		self.business_rules = rules;
		self
	}

	pub fn requires_auth(mut self, requires_auth: bool) -> Self {
		self.business_rules.requires_auth = requires_auth;
		self
	}

	pub fn permissions<I, S>(mut self, permissions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.business_rules.required_permissions = permissions.into_iter().map(Into::into).collect();
		self
	}

	pub fn requires_casefile(mut self, requires_casefile: bool) -> Self {
		self.business_rules.requires_casefile = requires_casefile;
		self
	}

	pub fn timeout_seconds(mut self, seconds: u64) -> Self {
		self.business_rules.timeout_seconds = seconds;
		self
	}

	pub fn deprecated(
		mut self,
		since: impl Into<String>,
		removal_version: Option<String>,
		replacement: Option<String>,
	) -> Self {
		self.business_rules.deprecated_since = Some(since.into());
		self.business_rules.removal_version = removal_version;
		self.business_rules.replacement_method = replacement;
		self
	}

	pub fn disabled(mut self) -> Self {
		self.business_rules.enabled = false;
		self
	}

	/// Request contract inferred from the request type
	pub fn request<T: JsonSchema>(self) -> Self {
		self.request_model(ModelSchema::of::<T>())
	}

	/// Response contract inferred from the response type
	pub fn response<T: JsonSchema>(self) -> Self {
		self.response_model(ModelSchema::of::<T>())
	}

	pub fn request_model(mut self, model: ModelSchema) -> Self {
		self.request_model = Some(model);
		self
	}

	pub fn response_model(mut self, model: ModelSchema) -> Self {
		self.response_model = Some(model);
		self
	}

	/// Add an explicit parameter; explicit parameters replace extracted ones
	pub fn parameter(mut self, parameter: MethodParameterDef) -> Self {
		self.parameters.get_or_insert_with(Vec::new).push(parameter);
		self
	}

	pub fn build(self) -> Result<MethodDefinition, RegistryError> {
		let service_name = self
			.service_name
			.filter(|s| !s.is_empty())
			.ok_or_else(|| RegistryError::invalid_method(&self.name, "service name is required"))?;
		let classification = self
			.classification
			.ok_or_else(|| RegistryError::invalid_method(&self.name, "classification is required"))?;

		let parameters = self
			.parameters
			.unwrap_or_else(|| extract_method_parameters(self.request_model.as_ref()));
		let request_model = self
			.request_model
			.map(|model| CompiledModel::compile(model).map(Arc::new))
			.transpose()?;

		Ok(MethodDefinition {
			metadata: MethodMetadata {
				name: self.name,
				description: self.description,
				version: self.version,
				service_name,
				module_path: self.module_path.unwrap_or_default(),
				classification,
			},
			business_rules: self.business_rules,
			parameters,
			request_model,
			response_model: self.response_model.map(Arc::new),
		})
	}
}

/// Method table keyed by the compound `Service.method` key
#[derive(Default)]
pub struct MethodRegistry {
	methods: IndexMap<MethodKey, Arc<MethodDefinition>>,
	overwritten: Vec<MethodKey>,
}

impl MethodRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a method, replacing any earlier definition under the same key
	///
	/// Replacing a different definition logs a warning and records the key.
	pub fn register(&mut self, method: MethodDefinition) -> MethodKey {
		let key = method.key();

		if let Some(existing) = self.methods.get(&key) {
			let same = serde_json::to_value(existing.as_ref()).ok() == serde_json::to_value(&method).ok();
			if same {
				debug!(target: "registry", method = %key, "identical method re-registered");
			} else {
				warn!(target: "registry", method = %key, "method key collision, last registration wins");
				self.overwritten.push(key.clone());
			}
		} else {
			debug!(target: "registry", method = %key, "registered method");
		}

		self.methods.insert(key.clone(), Arc::new(method));
		key
	}

	pub fn get(&self, key: &str) -> Option<&Arc<MethodDefinition>> {
		self.methods.get(key)
	}

	pub fn len(&self) -> usize {
		self.methods.len()
	}

	pub fn is_empty(&self) -> bool {
		self.methods.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<MethodDefinition>> {
		self.methods.values()
	}

	/// Keys whose definition was replaced by a different one
	pub fn overwritten(&self) -> &[MethodKey] {
		&self.overwritten
	}

	pub(crate) fn into_parts(self) -> (IndexMap<MethodKey, Arc<MethodDefinition>>, Vec<MethodKey>) {
		(self.methods, self.overwritten)
	}
}
