// Registry types for methods and tools
//
// Two layers share one parameter vocabulary:
// - Methods: internal business operations with typed request/response models
// - Tools: externally invocable wrappers, optionally delegating to a method

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::compiled::CompiledModel;
use super::schema::{Constraints, ModelSchema};
use super::tools::ToolHandler;

/// Canonical method key, always the compound `Service.method` form
pub type MethodKey = String;

/// Reference from a tool to a method (`{service, method}` in YAML)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
	pub service: String,
	pub method: String,
}

impl MethodRef {
	pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
		Self {
			service: service.into(),
			method: method.into(),
		}
	}

	/// Parse a compound `Service.method` key
	pub fn parse(key: &str) -> Option<Self> {
		let (service, method) = key.split_once('.')?;
		if service.is_empty() || method.is_empty() {
			return None;
		}
		Some(Self::new(service, method))
	}

	pub fn key(&self) -> MethodKey {
		self.to_string()
	}
}

impl fmt::Display for MethodRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.service, self.method)
	}
}

macro_rules! taxonomy {
	($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		pub enum $name {
			$(
				#[serde(rename = $text)]
				$variant,
			)+
		}

		impl $name {
			pub const ALL: &'static [$name] = &[$($name::$variant),+];

			pub fn as_str(&self) -> &'static str {
				match self {
					$($name::$variant => $text,)+
				}
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(self.as_str())
			}
		}

		impl FromStr for $name {
			type Err = String;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::ALL
					.iter()
					.copied()
					.find(|v| v.as_str() == s)
					.ok_or_else(|| format!("unknown {} '{}'", stringify!($name), s))
			}
		}
	};
}

taxonomy! {
	/// Top-level business area
	Domain {
		Workspace => "workspace",
		Communication => "communication",
		Automation => "automation",
		System => "system",
	}
}

taxonomy! {
	/// Area within a domain
	Subdomain {
		Casefile => "casefile",
		ToolSession => "tool_session",
		ChatSession => "chat_session",
		Acl => "acl",
		Gmail => "gmail",
		Drive => "drive",
		Sheets => "sheets",
		Registry => "registry",
	}
}

taxonomy! {
	/// What an operation does to its subject
	Capability {
		Create => "create",
		Read => "read",
		Update => "update",
		Delete => "delete",
		List => "list",
		Search => "search",
		Process => "process",
		Execute => "execute",
	}
}

taxonomy! {
	Complexity {
		Atomic => "atomic",
		Composite => "composite",
		Pipeline => "pipeline",
	}
}

taxonomy! {
	Maturity {
		Experimental => "experimental",
		Beta => "beta",
		Stable => "stable",
		Deprecated => "deprecated",
	}
}

taxonomy! {
	/// Whether an operation stays inside the platform or calls out
	IntegrationTier {
		Internal => "internal",
		External => "external",
		Hybrid => "hybrid",
	}
}

/// Fixed six-part classification of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
	pub domain: Domain,
	pub subdomain: Subdomain,
	pub capability: Capability,
	pub complexity: Complexity,
	pub maturity: Maturity,
	pub integration_tier: IntegrationTier,
}

impl Classification {
	/// Hierarchical path `domain/subdomain/capability/<leaf>`
	pub fn path(&self, leaf: &str) -> String {
		format!("{}/{}/{}/{}", self.domain, self.subdomain, self.capability, leaf)
	}
}

fn default_true() -> bool {
	true
}

pub(crate) fn default_version() -> String {
	"1.0.0".to_string()
}

fn default_timeout_seconds() -> u64 {
	30
}

/// Parameter descriptor on the method layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodParameterDef {
	pub name: String,

	/// Declared type string (`str`, `int`, `List[str]`, ...)
	pub param_type: String,

	#[serde(default = "default_true")]
	pub required: bool,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	#[serde(default, alias = "default", skip_serializing_if = "Option::is_none")]
	pub default_value: Option<Value>,

	#[serde(flatten)]
	pub constraints: Constraints,
}

/// Parameter descriptor on the tool layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterDef {
	pub name: String,

	/// Declared type string, JSON flavoured in YAML specs (`integer`, `array`)
	#[serde(rename = "type")]
	pub param_type: String,

	#[serde(default = "default_true")]
	pub required: bool,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<Value>,

	#[serde(flatten)]
	pub constraints: Constraints,
}

impl From<&MethodParameterDef> for ToolParameterDef {
	fn from(param: &MethodParameterDef) -> Self {
		Self {
			name: param.name.clone(),
			param_type: param.param_type.clone(),
			required: param.required,
			description: param.description.clone(),
			default: param.default_value.clone(),
			constraints: param.constraints.clone(),
		}
	}
}

/// Declared split of tool arguments into method and orchestration parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
	#[serde(default)]
	pub method_params: Vec<String>,

	#[serde(default)]
	pub tool_params: Vec<String>,
}

impl ParameterMapping {
	/// Unclassified parameters belong to the method
	pub fn is_tool_param(&self, name: &str) -> bool {
		self.tool_params.iter().any(|p| p == name)
	}
}

/// Operational rules attached to a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBusinessRules {
	#[serde(default = "default_true")]
	pub enabled: bool,

	#[serde(default)]
	pub requires_auth: bool,

	#[serde(default)]
	pub required_permissions: Vec<String>,

	#[serde(default)]
	pub requires_casefile: bool,

	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deprecated_since: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub removal_version: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub replacement_method: Option<String>,
}

impl Default for MethodBusinessRules {
	fn default() -> Self {
		Self {
			enabled: true,
			requires_auth: false,
			required_permissions: Vec::new(),
			requires_casefile: false,
			timeout_seconds: default_timeout_seconds(),
			deprecated_since: None,
			removal_version: None,
			replacement_method: None,
		}
	}
}

impl MethodBusinessRules {
	pub fn is_deprecated(&self) -> bool {
		self.deprecated_since.is_some()
	}
}

/// Identity and classification of a method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodMetadata {
	pub name: String,
	pub description: String,
	pub version: String,
	pub service_name: String,
	pub module_path: String,
	pub classification: Classification,
}

/// A registered business operation
#[derive(Debug, Clone, Serialize)]
pub struct MethodDefinition {
	pub metadata: MethodMetadata,

	pub business_rules: MethodBusinessRules,

	pub parameters: Vec<MethodParameterDef>,

	/// Absent when the model reference could not be resolved
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_model: Option<Arc<CompiledModel>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_model: Option<Arc<ModelSchema>>,
}

impl MethodDefinition {
	pub fn name(&self) -> &str {
		&self.metadata.name
	}

	pub fn service_name(&self) -> &str {
		&self.metadata.service_name
	}

	pub fn classification(&self) -> &Classification {
		&self.metadata.classification
	}

	pub fn reference(&self) -> MethodRef {
		MethodRef::new(&self.metadata.service_name, &self.metadata.name)
	}

	/// Compound `Service.method` key
	pub fn key(&self) -> MethodKey {
		self.reference().key()
	}

	pub fn parameter(&self, name: &str) -> Option<&MethodParameterDef> {
		self.parameters.iter().find(|p| p.name == name)
	}
}

/// A registered tool
#[derive(Clone, Serialize)]
pub struct ToolDefinition {
	pub name: String,

	pub description: String,

	pub category: String,

	pub version: String,

	pub tags: Vec<String>,

	/// Service that owns the tool, used to disambiguate name collisions
	#[serde(skip_serializing_if = "Option::is_none")]
	pub service: Option<String>,

	/// Structured method reference (YAML specs)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub method_reference: Option<MethodRef>,

	/// Method name, bare or compound (code registrations)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub method_name: Option<String>,

	/// Explicit parameters; empty means inherit from the referenced method
	pub parameters: Vec<ToolParameterDef>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameter_mapping: Option<ParameterMapping>,

	pub metadata: IndexMap<String, Value>,

	#[serde(skip)]
	pub handler: Option<Arc<dyn ToolHandler>>,

	#[serde(skip)]
	pub params_model: Arc<CompiledModel>,
}

impl fmt::Debug for ToolDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ToolDefinition")
			.field("name", &self.name)
			.field("category", &self.category)
			.field("version", &self.version)
			.field("method_reference", &self.method_reference)
			.field("method_name", &self.method_name)
			.field("parameters", &self.parameters)
			.field("has_handler", &self.handler.is_some())
			.finish_non_exhaustive()
	}
}

impl ToolDefinition {
	/// Method this tool points at, as declared
	///
	/// Tries `method_reference`, then `method_name`, then the
	/// `method_reference` / `method_name` metadata keys. The result may be a
	/// bare name; resolve it against the method table before use.
	pub fn method_key(&self) -> Option<String> {
		if let Some(reference) = &self.method_reference {
			return Some(reference.key());
		}
		if let Some(name) = &self.method_name {
			return Some(name.clone());
		}
		["method_reference", "method_name"]
			.iter()
			.find_map(|key| match self.metadata.get(*key)? {
				Value::String(s) if !s.is_empty() => Some(s.clone()),
				Value::Object(obj) => {
					let service = obj.get("service")?.as_str()?;
					let method = obj.get("method")?.as_str()?;
					Some(MethodRef::new(service, method).key())
				},
				_ => None,
			})
	}

	/// Whether the tool inherits its parameters from its method
	pub fn inherits_parameters(&self) -> bool {
		self.parameters.is_empty()
	}

	/// Same declared content (handler identity is not compared)
	pub fn same_declaration(&self, other: &ToolDefinition) -> bool {
		let ours = serde_json::to_value(self).ok();
		let theirs = serde_json::to_value(other).ok();
		ours.is_some() && ours == theirs && self.params_model == other.params_model
	}
}
