// Tool registration and execution wrapper

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::compiled::CompiledModel;
use super::envelope::{Envelope, ToolContext, ToolError, ToolResponse};
use super::error::RegistryError;
use super::extract::extract_parameters;
use super::schema::ModelSchema;
use super::types::{MethodRef, ParameterMapping, ToolDefinition, ToolParameterDef, default_version};

/// Implementation behind a tool
///
/// Receives arguments already validated against the tool's params model.
#[async_trait]
pub trait ToolHandler: Send + Sync {
	async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Adapter turning an async closure into a `ToolHandler`
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
	F: Fn(ToolContext, Map<String, Value>) -> Fut + Send + Sync,
	Fut: Future<Output = Result<Value, ToolError>> + Send,
{
	async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Value, ToolError> {
		(self.0)(ctx.clone(), args).await
	}
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
	F: Fn(ToolContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
	Arc::new(FnHandler(f))
}

/// Normalize a raw handler result into a plain object
pub fn normalize_result(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		Value::Null => Map::new(),
		other => {
			let mut map = Map::new();
			map.insert("value".into(), other);
			map
		},
	}
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic payload".to_string()
	}
}

impl ToolDefinition {
	/// Run the tool and wrap the outcome in a response envelope
	///
	/// Validation failures, handler errors and panics all produce a FAILED
	/// envelope.
	pub async fn execute(&self, ctx: &ToolContext, args: Map<String, Value>) -> ToolResponse {
		let envelope = Envelope::start(&self.name, ctx);
		let started = Instant::now();
		let outcome = self.run(ctx, args).await;
		let elapsed_ms = started.elapsed().as_millis() as u64;

		match outcome {
			Ok(value) => {
				debug!(target: "registry", tool = %self.name, elapsed_ms, "tool completed");
				envelope.completed(normalize_result(value), elapsed_ms)
			},
			Err(error) => {
				warn!(
					target: "registry",
					tool = %self.name,
					kind = error.kind(),
					error = %error,
					"tool execution failed"
				);
				envelope.failed(&error, elapsed_ms)
			},
		}
	}

	async fn run(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Value, ToolError> {
		let validated = self.params_model.validate(&args).map_err(ToolError::Validation)?;

		let Some(handler) = &self.handler else {
			return Err(ToolError::execution(format!(
				"tool '{}' has no implementation",
				self.name
			)));
		};

		AssertUnwindSafe(handler.call(ctx, validated))
			.catch_unwind()
			.await
			.map_err(|panic| ToolError::Panic(panic_message(panic)))?
	}
}

/// Builder for code-registered tools
pub struct ToolRegistration {
	name: String,
	description: String,
	category: String,
	version: String,
	tags: Vec<String>,
	service: Option<String>,
	method_reference: Option<MethodRef>,
	method_name: Option<String>,
	parameters: Option<Vec<ToolParameterDef>>,
	parameter_mapping: Option<ParameterMapping>,
	metadata: IndexMap<String, Value>,
	handler: Option<Arc<dyn ToolHandler>>,
	params_model: ModelSchema,
}

impl ToolRegistration {
	pub fn new(name: impl Into<String>, params_model: ModelSchema) -> Self {
		Self {
			name: name.into(),
			description: String::new(),
			category: "general".to_string(),
			version: default_version(),
			tags: Vec::new(),
			service: None,
			method_reference: None,
			method_name: None,
			parameters: None,
			parameter_mapping: None,
			metadata: IndexMap::new(),
			handler: None,
			params_model,
		}
	}

	/// Tool whose params model is derived from `T`
	pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
		Self::new(name, ModelSchema::of::<T>())
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn category(mut self, category: impl Into<String>) -> Self {
		self.category = category.into();
		self
	}

	pub fn version(mut self, version: impl Into<String>) -> Self {
		self.version = version.into();
		self
	}

	pub fn tags<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.tags = tags.into_iter().map(Into::into).collect();
		self
	}

	pub fn service(mut self, service: impl Into<String>) -> Self {
		self.service = Some(service.into());
		self
	}

	pub fn method_name(mut self, method: impl Into<String>) -> Self {
		self.method_name = Some(method.into());
		self
	}

	pub fn method_reference(mut self, reference: MethodRef) -> Self {
		self.service.get_or_insert_with(|| reference.service.clone());
		self.method_reference = Some(reference);
		self
	}

	/// Declare parameters explicitly instead of extracting them
	pub fn parameters(mut self, parameters: Vec<ToolParameterDef>) -> Self {
		self.parameters = Some(parameters);
		self
	}

	pub fn parameter_mapping(mut self, mapping: ParameterMapping) -> Self {
		self.parameter_mapping = Some(mapping);
		self
	}

	pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}

	pub fn handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
		self.handler = Some(handler);
		self
	}

	/// Compile the params model and freeze the definition
	///
	/// Fails when a field constraint cannot be compiled, such as an invalid
	/// pattern.
	pub fn build(self) -> Result<ToolDefinition, RegistryError> {
		let parameters = self
			.parameters
			.unwrap_or_else(|| extract_parameters(&self.params_model));
		let params_model = CompiledModel::compile(self.params_model)?;

		Ok(ToolDefinition {
			name: self.name,
			description: self.description,
			category: self.category,
			version: self.version,
			tags: self.tags,
			service: self.service,
			method_reference: self.method_reference,
			method_name: self.method_name,
			parameters,
			parameter_mapping: self.parameter_mapping,
			metadata: self.metadata,
			handler: self.handler,
			params_model: Arc::new(params_model),
		})
	}
}

/// Name-keyed tool table used during bootstrap
#[derive(Default)]
pub struct ToolRegistry {
	tools: IndexMap<String, Arc<ToolDefinition>>,
	duplicates: Vec<String>,
}

impl ToolRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a tool, returning the name it was stored under
	///
	/// Identical re-registration is a no-op. A different tool with a taken
	/// name is stored as `{service}_{name}`; without a service, or when that
	/// name is taken too, registration fails and the name is recorded.
	pub fn register(&mut self, mut tool: ToolDefinition) -> Result<String, RegistryError> {
		let Some(existing) = self.tools.get(&tool.name) else {
			debug!(target: "registry", tool = %tool.name, "registered tool");
			let name = tool.name.clone();
			self.tools.insert(name.clone(), Arc::new(tool));
			return Ok(name);
		};

		if existing.same_declaration(&tool) {
			debug!(target: "registry", tool = %tool.name, "identical tool re-registered");
			return Ok(tool.name);
		}

		let original = tool.name.clone();
		if let Some(service) = tool.service.clone().filter(|s| !s.is_empty()) {
			tool.name = format!("{}_{}", service.to_lowercase(), original);
			match self.tools.get(&tool.name) {
				None => {
					warn!(
						target: "registry",
						tool = %original,
						renamed = %tool.name,
						"tool name collision, registered under service-prefixed name"
					);
					let name = tool.name.clone();
					self.tools.insert(name.clone(), Arc::new(tool));
					return Ok(name);
				},
				Some(prefixed) if prefixed.same_declaration(&tool) => return Ok(tool.name),
				Some(_) => {},
			}
		}

		warn!(target: "registry", tool = %original, "duplicate tool name");
		self.duplicates.push(original.clone());
		Err(RegistryError::DuplicateToolName(original))
	}

	pub fn get(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
		self.tools.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.tools.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.tools.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tools.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDefinition>> {
		self.tools.values()
	}

	/// Names that could not be registered because of collisions
	pub fn duplicates(&self) -> &[String] {
		&self.duplicates
	}

	pub(crate) fn into_parts(self) -> (IndexMap<String, Arc<ToolDefinition>>, Vec<String>) {
		(self.tools, self.duplicates)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::registry::envelope::ToolStatus;
	use crate::registry::schema::{FieldSchema, FieldType};

	fn greet_model() -> ModelSchema {
		ModelSchema::builder("GreetParams")
			.field(FieldSchema::new("name", FieldType::Str).min_length(1))
			.field(FieldSchema::new("times", FieldType::Int).with_default(json!(1)))
			.build()
	}

	fn greet_tool() -> ToolDefinition {
		ToolRegistration::new("greet", greet_model())
			.description("Greets someone")
			.category("demo")
			.service("GreetingService")
			.handler(handler_fn(|ctx, args| async move {
				Ok::<_, ToolError>(json!({
					"greeting": format!("hello {}", args["name"].as_str().unwrap_or_default()),
					"times": args["times"],
					"user": ctx.user_id,
				}))
			}))
			.build()
			.unwrap()
	}

	fn args(value: Value) -> Map<String, Value> {
		value.as_object().cloned().unwrap()
	}

	struct PanickingHandler;

	#[async_trait]
	impl ToolHandler for PanickingHandler {
		async fn call(&self, _ctx: &ToolContext, _args: Map<String, Value>) -> Result<Value, ToolError> {
			tokio::time::sleep(Duration::from_millis(1)).await;
			panic!("handler exploded");
		}
	}

	#[test]
	fn test_parameters_extracted_from_model() {
		let tool = greet_tool();
		assert_eq!(tool.parameters.len(), 2);
		assert_eq!(tool.parameters[0].name, "name");
		assert!(tool.parameters[0].required);
		assert_eq!(tool.parameters[1].param_type, "int");
		assert!(!tool.parameters[1].required);
	}

	#[tokio::test]
	async fn test_execute_success() {
		let response = greet_tool()
			.execute(&ToolContext::new("u-1"), args(json!({"name": "ada", "times": "3"})))
			.await;

		assert_eq!(response.status, ToolStatus::Completed);
		let result = response.result().unwrap();
		assert_eq!(result["greeting"], "hello ada");
		assert_eq!(result["times"], 3);
		assert_eq!(result["user"], "u-1");
		assert_eq!(response.metadata.tool_name, "greet");
	}

	#[tokio::test]
	async fn test_execute_validation_failure() {
		let response = greet_tool()
			.execute(&ToolContext::default(), args(json!({"times": 2})))
			.await;

		assert_eq!(response.status, ToolStatus::Failed);
		assert_eq!(response.error_kind(), Some("ValidationError"));
		assert_eq!(response.error.unwrap().validation_errors[0].loc, "name");
	}

	#[tokio::test]
	async fn test_handler_error_becomes_failed_envelope() {
		let tool = ToolRegistration::new("boom", ModelSchema::empty("Empty"))
			.handler(handler_fn(|_, _| async { Err::<Value, _>(ToolError::execution("backend unavailable")) }))
			.build()
			.unwrap();

		let response = tool.execute(&ToolContext::default(), Map::new()).await;
		assert_eq!(response.error_kind(), Some("ExecutionError"));
		assert_eq!(response.error.unwrap().message, "backend unavailable");
	}

	#[tokio::test]
	async fn test_handler_panic_is_contained() {
		let tool = ToolRegistration::new("panics", ModelSchema::empty("Empty"))
			.handler(Arc::new(PanickingHandler))
			.build()
			.unwrap();

		let response = tool.execute(&ToolContext::default(), Map::new()).await;
		assert_eq!(response.status, ToolStatus::Failed);
		assert_eq!(response.error_kind(), Some("PanicError"));
		assert!(response.error.unwrap().message.contains("handler exploded"));
	}

	#[tokio::test]
	async fn test_non_object_results_are_wrapped() {
		let tool = ToolRegistration::new("count", ModelSchema::empty("Empty"))
			.handler(handler_fn(|_, _| async { Ok::<_, ToolError>(json!(42)) }))
			.build()
			.unwrap();

		let response = tool.execute(&ToolContext::default(), Map::new()).await;
		assert_eq!(response.result().unwrap()["value"], 42);
	}

	#[test]
	fn test_identical_registration_is_idempotent() {
		let mut registry = ToolRegistry::new();
		registry.register(greet_tool()).unwrap();
		let name = registry.register(greet_tool()).unwrap();

		assert_eq!(name, "greet");
		assert_eq!(registry.len(), 1);
		assert!(registry.duplicates().is_empty());
	}

	#[test]
	fn test_collision_is_prefixed_with_service() {
		let mut registry = ToolRegistry::new();
		registry.register(greet_tool()).unwrap();

		let other = ToolRegistration::new("greet", greet_model())
			.description("Greets differently")
			.service("WelcomeService")
			.build()
			.unwrap();
		let name = registry.register(other).unwrap();

		assert_eq!(name, "welcomeservice_greet");
		assert_eq!(registry.len(), 2);
		assert!(registry.get("greet").is_some());
	}

	#[test]
	fn test_collision_without_service_is_recorded() {
		let mut registry = ToolRegistry::new();
		registry.register(greet_tool()).unwrap();

		let other = ToolRegistration::new("greet", ModelSchema::empty("Empty")).build().unwrap();
		assert_matches!(
			registry.register(other),
			Err(RegistryError::DuplicateToolName(name)) if name == "greet"
		);
		assert_eq!(registry.duplicates(), ["greet".to_string()]);
	}

	#[test]
	fn test_invalid_pattern_rejected_at_build() {
		let model = ModelSchema::builder("LookupParams")
			.field(FieldSchema::new("code", FieldType::Str).pattern("([a-z"))
			.build();

		assert_matches!(
			ToolRegistration::new("lookup", model).build(),
			Err(RegistryError::InvalidSchema(err)) if err.field == "code"
		);
	}

	#[tokio::test]
	async fn test_execute_rejects_exclusive_bound() {
		let model = ModelSchema::builder("PageParams")
			.field(FieldSchema::new("page", FieldType::Int).exclusive_minimum(0.0))
			.build();
		let tool = ToolRegistration::new("page", model)
			.handler(handler_fn(|_, args| async move { Ok::<_, ToolError>(Value::Object(args)) }))
			.build()
			.unwrap();

		let response = tool.execute(&ToolContext::default(), args(json!({"page": 0}))).await;
		assert_eq!(response.error_kind(), Some("ValidationError"));
		assert_eq!(response.error.unwrap().validation_errors[0].loc, "page");

		let response = tool.execute(&ToolContext::default(), args(json!({"page": 1}))).await;
		assert_eq!(response.result().unwrap()["page"], 1);
	}
}
