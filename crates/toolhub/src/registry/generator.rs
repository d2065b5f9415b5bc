// YAML-driven tool generation
//
// A tool spec declares business parameters and the method it wraps. The
// generated tool validates arguments against a synthesized model (declared
// parameters plus orchestration fields), splits them into method and tool
// parameters, and routes the call through the service factory map.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::compiled::CompiledModel;
use super::envelope::{ToolContext, ToolError};
use super::error::RegistryError;
use super::extract::{field_from_parameter, model_from_parameters};
use super::schema::{FieldSchema, FieldType, ModelSchema, describe_errors};
use super::tools::{ToolHandler, normalize_result};
use super::types::{
	MethodDefinition, MethodRef, ParameterMapping, ToolDefinition, ToolParameterDef, default_version,
};
use crate::services::{ServiceError, ServiceRegistry};

/// The only implementation type generated tools support
pub const METHOD_WRAPPER: &str = "method_wrapper";

/// Fields every generated tool accepts on top of its declared parameters
pub const ORCHESTRATION_FIELDS: &[&str] = &[
	"execution_type",
	"method_name",
	"parameter_mapping",
	"dry_run",
	"timeout_seconds",
];

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

fn default_category() -> String {
	"general".to_string()
}

/// Declarative tool spec, one per YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
	pub name: String,

	#[serde(default)]
	pub description: String,

	#[serde(default = "default_category")]
	pub category: String,

	#[serde(default = "default_version")]
	pub version: String,

	#[serde(default)]
	pub tags: Vec<String>,

	#[serde(default)]
	pub parameters: Vec<ToolParameterDef>,

	pub implementation: ImplementationSpec,

	#[serde(default)]
	pub method_reference: Option<MethodRef>,

	#[serde(default)]
	pub metadata: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationSpec {
	#[serde(rename = "type")]
	pub kind: String,

	#[serde(default)]
	pub method_wrapper: Option<MethodWrapperSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodWrapperSpec {
	#[serde(default)]
	pub parameter_mapping: ParameterMapping,
}

impl ToolSpec {
	pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
		serde_yaml::from_str(content)
	}

	/// Method reference, falling back to the metadata keys
	pub fn target(&self) -> Option<MethodRef> {
		if let Some(reference) = &self.method_reference {
			return Some(reference.clone());
		}
		["method_reference", "method_name"]
			.iter()
			.find_map(|key| match self.metadata.get(*key)? {
				Value::String(s) => MethodRef::parse(s),
				Value::Object(obj) => Some(MethodRef::new(
					obj.get("service")?.as_str()?,
					obj.get("method")?.as_str()?,
				)),
				_ => None,
			})
	}
}

/// Read every `*.yaml` / `*.yml` tool spec in `dir`, sorted by file name
///
/// A missing directory yields no specs. Unparsable files are logged and
/// skipped.
pub fn load_tool_specs(dir: &Path) -> Result<Vec<ToolSpec>, RegistryError> {
	if !dir.is_dir() {
		warn!(target: "registry", dir = %dir.display(), "tool spec directory not found");
		return Ok(Vec::new());
	}

	let mut paths: Vec<PathBuf> = fs_err::read_dir(dir)?
		.filter_map(|entry| entry.ok().map(|e| e.path()))
		.filter(|p| {
			p.extension()
				.and_then(|ext| ext.to_str())
				.is_some_and(|ext| ext == "yaml" || ext == "yml")
		})
		.collect();
	paths.sort();

	let mut specs = Vec::with_capacity(paths.len());
	for path in paths {
		let content = fs_err::read_to_string(&path)?;
		match ToolSpec::parse(&content) {
			Ok(spec) => specs.push(spec),
			Err(e) => {
				let error = RegistryError::yaml(&path, e);
				warn!(target: "registry", error = %error, "skipping tool spec");
			},
		}
	}
	Ok(specs)
}

fn orchestration_fields(target: Option<&MethodRef>) -> Vec<FieldSchema> {
	let method_name = FieldSchema::new("method_name", FieldType::Str);
	let method_name = match target {
		Some(target) => method_name.with_default(Value::String(target.key())),
		None => method_name.optional(),
	};

	vec![
		FieldSchema::new("execution_type", FieldType::Str).with_default(json!(METHOD_WRAPPER)),
		method_name,
		FieldSchema::new(
			"parameter_mapping",
			FieldType::Dict(Box::new(FieldType::Str), Box::new(FieldType::Any)),
		)
		.optional(),
		FieldSchema::new("dry_run", FieldType::Bool).with_default(json!(false)),
		FieldSchema::new("timeout_seconds", FieldType::Int)
			.with_default(json!(DEFAULT_TIMEOUT_SECONDS))
			.min_value(1.0)
			.max_value(MAX_TIMEOUT_SECONDS as f64),
	]
}

/// Split validated arguments into method and tool parameters
///
/// Orchestration fields and names listed as tool parameters go to the tool;
/// everything else goes to the method.
pub fn split_arguments(
	args: &Map<String, Value>,
	mapping: &ParameterMapping,
) -> (Map<String, Value>, Map<String, Value>) {
	let mut method_args = Map::new();
	let mut tool_args = Map::new();

	for (name, value) in args {
		if ORCHESTRATION_FIELDS.contains(&name.as_str()) || mapping.is_tool_param(name) {
			tool_args.insert(name.clone(), value.clone());
		} else {
			method_args.insert(name.clone(), value.clone());
		}
	}
	(method_args, tool_args)
}

/// Build an executable tool from a spec
///
/// `method` is the referenced method when it is already registered. A tool
/// with no declared parameters takes its business parameters from it.
pub fn generate_tool(
	spec: ToolSpec,
	method: Option<Arc<MethodDefinition>>,
	services: Arc<ServiceRegistry>,
) -> Result<ToolDefinition, RegistryError> {
	if spec.implementation.kind != METHOD_WRAPPER {
		return Err(RegistryError::UnsupportedImplementation {
			tool: spec.name,
			kind: spec.implementation.kind,
		});
	}

	let target = spec.target();
	let mapping = spec
		.implementation
		.method_wrapper
		.map(|w| w.parameter_mapping)
		.unwrap_or_default();

	let business_fields: Vec<FieldSchema> = match (&spec.parameters[..], &method) {
		([], Some(method)) => method
			.parameters
			.iter()
			.map(|p| field_from_parameter(&ToolParameterDef::from(p)))
			.collect(),
		(declared, _) => model_from_parameters(&spec.name, declared).fields,
	};
	let params_model = ModelSchema {
		name: format!("{}_params", spec.name),
		description: Some(spec.description.clone()).filter(|d| !d.is_empty()),
		fields: business_fields,
	}
	.extended(format!("{}_params", spec.name), orchestration_fields(target.as_ref()));

	let handler = target.clone().map(|target| {
		Arc::new(MethodWrapperHandler {
			tool_name: spec.name.clone(),
			target,
			method: method.clone(),
			mapping: mapping.clone(),
			services,
		}) as Arc<dyn ToolHandler>
	});

	if method.is_none() {
		if let Some(target) = &target {
			warn!(
				target: "registry",
				tool = %spec.name,
				method = %target,
				"tool references a method that is not registered"
			);
		}
	}
	let params_model = CompiledModel::compile(params_model)?;
	debug!(
		target: "registry",
		tool = %spec.name,
		fields = params_model.schema().len(),
		"generated method wrapper tool"
	);

	Ok(ToolDefinition {
		name: spec.name,
		description: spec.description,
		category: spec.category,
		version: spec.version,
		tags: spec.tags,
		service: target.as_ref().map(|t| t.service.clone()),
		method_reference: spec.method_reference,
		method_name: None,
		parameters: spec.parameters,
		parameter_mapping: Some(mapping),
		metadata: spec.metadata,
		handler,
		params_model: Arc::new(params_model),
	})
}

/// Routes a generated tool call to its method
pub struct MethodWrapperHandler {
	tool_name: String,
	target: MethodRef,
	method: Option<Arc<MethodDefinition>>,
	mapping: ParameterMapping,
	services: Arc<ServiceRegistry>,
}

impl MethodWrapperHandler {
	fn build_request(
		&self,
		ctx: &ToolContext,
		method: &MethodDefinition,
		method_args: Map<String, Value>,
	) -> Result<Value, ToolError> {
		let id = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);

		let mut request = Map::new();
		request.insert("user_id".into(), id(&ctx.user_id));
		request.insert("session_id".into(), id(&ctx.session_id));
		request.insert("casefile_id".into(), id(&ctx.casefile_id));
		request.insert("payload".into(), Value::Object(method_args));

		match &method.request_model {
			Some(model) => model
				.validate(&request)
				.map(Value::Object)
				.map_err(|errors| ToolError::request_build(method.key(), describe_errors(&errors))),
			None => Ok(Value::Object(request)),
		}
	}
}

#[async_trait]
impl ToolHandler for MethodWrapperHandler {
	async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Value, ToolError> {
		let (method_args, tool_args) = split_arguments(&args, &self.mapping);
		let key = self.target.key();

		if tool_args.get("dry_run").and_then(Value::as_bool).unwrap_or(false) {
			debug!(target: "registry", tool = %self.tool_name, method = %key, "dry run");
			return Ok(json!({
				"dry_run": true,
				"tool": self.tool_name,
				"method": key,
				"method_params": method_args,
				"tool_params": tool_args,
			}));
		}

		let Some(method) = &self.method else {
			return Err(ToolError::MethodNotFound(key));
		};

		let service = self
			.services
			.instantiate(&self.target.service)
			.ok_or_else(|| ToolError::ServiceInstantiation(self.target.service.clone()))?;

		let request = self.build_request(ctx, method, method_args)?;

		let seconds = tool_args
			.get("timeout_seconds")
			.and_then(Value::as_u64)
			.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

		let response = match timeout(
			Duration::from_secs(seconds),
			service.call(&self.target.method, request),
		)
		.await
		{
			Ok(Ok(response)) => response,
			Ok(Err(ServiceError::MethodNotFound(_))) => return Err(ToolError::MethodNotFound(key)),
			Ok(Err(e)) => return Err(ToolError::execution(e.to_string())),
			Err(_elapsed) => return Err(ToolError::Timeout { method: key, seconds }),
		};

		Ok(Value::Object(normalize_result(response)))
	}
}
