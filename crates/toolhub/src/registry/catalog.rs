// Registry bootstrap and query API
//
// `RegistryBuilder` is the mutable bootstrap stage; `build()` freezes it into
// a `Registry` shared read-only (behind `Arc`) by every tool invocation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::envelope::{self, ToolContext, ToolError, ToolResponse};
use super::error::RegistryError;
use super::generator::{ToolSpec, generate_tool, load_tool_specs};
use super::inventory::{ModelCatalog, load_inventory};
use super::methods::{MethodRegistration, MethodRegistry};
use super::schema::FieldError;
use super::tools::{ToolRegistration, ToolRegistry};
use super::types::{
	Capability, Classification, Complexity, Domain, IntegrationTier, Maturity, MethodDefinition,
	MethodKey, Subdomain, ToolDefinition, ToolParameterDef,
};
use crate::services::ServiceRegistry;

/// Mutable registry used during single-threaded bootstrap
pub struct RegistryBuilder {
	services: Arc<ServiceRegistry>,
	models: ModelCatalog,
	methods: MethodRegistry,
	tools: ToolRegistry,
}

impl RegistryBuilder {
	pub fn new(services: ServiceRegistry) -> Self {
		let models = services.model_catalog();
		Self {
			services: Arc::new(services),
			models,
			methods: MethodRegistry::new(),
			tools: ToolRegistry::new(),
		}
	}

	pub fn services(&self) -> &ServiceRegistry {
		&self.services
	}

	pub fn models(&self) -> &ModelCatalog {
		&self.models
	}

	pub fn methods(&self) -> &MethodRegistry {
		&self.methods
	}

	pub fn tools(&self) -> &ToolRegistry {
		&self.tools
	}

	pub fn register_method(&mut self, registration: MethodRegistration) -> Result<MethodKey, RegistryError> {
		Ok(self.methods.register(registration.build()?))
	}

	pub fn register_method_definition(&mut self, method: MethodDefinition) -> MethodKey {
		self.methods.register(method)
	}

	/// Register the methods services declare in code
	pub fn register_service_methods(&mut self) -> Result<usize, RegistryError> {
		let registrations = self.services.method_registrations();
		let count = registrations.len();
		for registration in registrations {
			self.register_method(registration)?;
		}
		Ok(count)
	}

	/// Register every method of an inventory file
	pub fn load_inventory(&mut self, path: &Path) -> Result<usize, RegistryError> {
		let methods = load_inventory(path, &self.models)?;
		let count = methods.len();
		for method in methods {
			self.methods.register(method);
		}
		Ok(count)
	}

	pub fn register_tool(&mut self, registration: ToolRegistration) -> Result<String, RegistryError> {
		self.tools.register(registration.build()?)
	}

	pub fn register_tool_definition(&mut self, tool: ToolDefinition) -> Result<String, RegistryError> {
		self.tools.register(tool)
	}

	/// Generate and register a tool from its spec
	///
	/// The referenced method should be registered first so the tool can
	/// inherit its parameters and validate requests against its model.
	pub fn register_tool_spec(&mut self, spec: ToolSpec) -> Result<String, RegistryError> {
		let method = spec.target().and_then(|t| self.methods.get(&t.key()).cloned());
		let tool = generate_tool(spec, method, self.services.clone())?;
		self.tools.register(tool)
	}

	/// Generate tools from every spec in `dir`
	///
	/// Specs that cannot be turned into tools are logged and skipped.
	pub fn load_tool_specs(&mut self, dir: &Path) -> Result<usize, RegistryError> {
		let mut count = 0;
		for spec in load_tool_specs(dir)? {
			let name = spec.name.clone();
			match self.register_tool_spec(spec) {
				Ok(_) => count += 1,
				Err(e) => warn!(target: "registry", tool = %name, error = %e, "skipping tool spec"),
			}
		}
		info!(target: "registry", dir = %dir.display(), tools = count, "loaded tool specs");
		Ok(count)
	}

	pub fn build(self) -> Registry {
		let (methods, overwritten_methods) = self.methods.into_parts();
		let (tools, duplicate_tools) = self.tools.into_parts();
		debug!(
			target: "registry",
			methods = methods.len(),
			tools = tools.len(),
			"registry frozen"
		);

		Registry {
			methods,
			tools,
			services: self.services,
			overwritten_methods,
			duplicate_tools,
		}
	}
}

/// Frozen catalog of methods and tools
pub struct Registry {
	methods: IndexMap<MethodKey, Arc<MethodDefinition>>,
	tools: IndexMap<String, Arc<ToolDefinition>>,
	services: Arc<ServiceRegistry>,
	overwritten_methods: Vec<MethodKey>,
	duplicate_tools: Vec<String>,
}

impl Registry {
	/// Method by compound `Service.method` key
	pub fn get_method(&self, key: &str) -> Option<&Arc<MethodDefinition>> {
		self.methods.get(key)
	}

	/// Method by compound key, or by bare name when exactly one service has it
	pub fn resolve_method(&self, reference: &str) -> Option<&Arc<MethodDefinition>> {
		if let Some(method) = self.methods.get(reference) {
			return Some(method);
		}
		let mut matches = self.methods.values().filter(|m| m.name() == reference);
		let first = matches.next()?;
		matches.next().is_none().then_some(first)
	}

	/// Method a tool points at, if it resolves
	pub fn method_for_tool(&self, tool: &ToolDefinition) -> Option<&Arc<MethodDefinition>> {
		self.resolve_method(&tool.method_key()?)
	}

	pub fn get_tool_definition(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
		self.tools.get(name)
	}

	pub fn validate_tool_exists(&self, name: &str) -> bool {
		self.tools.contains_key(name)
	}

	/// Effective parameters of a tool
	///
	/// Explicit parameters win; a tool without any inherits the parameters of
	/// the method it references.
	pub fn get_tool_parameters(&self, name: &str) -> Option<Vec<ToolParameterDef>> {
		let tool = self.tools.get(name)?;
		if !tool.inherits_parameters() {
			return Some(tool.parameters.clone());
		}
		let inherited = self
			.method_for_tool(tool)
			.map(|method| method.parameters.iter().map(ToolParameterDef::from).collect())
			.unwrap_or_default();
		Some(inherited)
	}

	fn tools_where(&self, predicate: impl Fn(&Classification) -> bool) -> Vec<&Arc<ToolDefinition>> {
		self
			.tools
			.values()
			.filter(|tool| {
				self
					.method_for_tool(tool)
					.is_some_and(|method| predicate(method.classification()))
			})
			.collect()
	}

	pub fn get_tools_by_domain(&self, domain: Domain) -> Vec<&Arc<ToolDefinition>> {
		self.tools_where(|c| c.domain == domain)
	}

	pub fn get_tools_by_subdomain(&self, subdomain: Subdomain) -> Vec<&Arc<ToolDefinition>> {
		self.tools_where(|c| c.subdomain == subdomain)
	}

	pub fn get_tools_by_capability(&self, capability: Capability) -> Vec<&Arc<ToolDefinition>> {
		self.tools_where(|c| c.capability == capability)
	}

	pub fn get_tools_by_complexity(&self, complexity: Complexity) -> Vec<&Arc<ToolDefinition>> {
		self.tools_where(|c| c.complexity == complexity)
	}

	pub fn get_tools_by_maturity(&self, maturity: Maturity) -> Vec<&Arc<ToolDefinition>> {
		self.tools_where(|c| c.maturity == maturity)
	}

	pub fn get_tools_by_integration_tier(&self, tier: IntegrationTier) -> Vec<&Arc<ToolDefinition>> {
		self.tools_where(|c| c.integration_tier == tier)
	}

	/// `domain/subdomain/capability/tool_name` of a tool with a classified method
	pub fn get_hierarchical_tool_path(&self, name: &str) -> Option<String> {
		let tool = self.tools.get(name)?;
		let method = self.method_for_tool(tool)?;
		Some(method.classification().path(&tool.name))
	}

	pub fn list_tools(&self) -> impl Iterator<Item = &Arc<ToolDefinition>> {
		self.tools.values()
	}

	pub fn list_methods(&self) -> impl Iterator<Item = &Arc<MethodDefinition>> {
		self.methods.values()
	}

	pub fn method_count(&self) -> usize {
		self.methods.len()
	}

	pub fn tool_count(&self) -> usize {
		self.tools.len()
	}

	pub fn services(&self) -> &ServiceRegistry {
		&self.services
	}

	/// Method keys replaced by a different definition during bootstrap
	pub fn overwritten_methods(&self) -> &[MethodKey] {
		&self.overwritten_methods
	}

	/// Tool names rejected as duplicates during bootstrap
	pub fn duplicate_tools(&self) -> &[String] {
		&self.duplicate_tools
	}

	/// Bare method names registered by more than one service
	pub fn ambiguous_method_names(&self) -> Vec<String> {
		let mut counts: HashMap<&str, usize> = HashMap::new();
		for method in self.methods.values() {
			*counts.entry(method.name()).or_default() += 1;
		}
		let mut names: Vec<String> = counts
			.into_iter()
			.filter(|(_, n)| *n > 1)
			.map(|(name, _)| name.to_string())
			.collect();
		names.sort();
		names
	}

	/// Execute a tool by name
	///
	/// Unknown tools, disabled methods and missing casefile context produce
	/// FAILED envelopes without running the tool.
	pub async fn execute_tool(&self, name: &str, ctx: &ToolContext, args: Map<String, Value>) -> ToolResponse {
		let Some(tool) = self.tools.get(name) else {
			warn!(target: "registry", tool = name, "execution requested for unknown tool");
			return envelope::failure(name, ctx, &ToolError::ToolNotFound(name.to_string()));
		};

		if let Some(method) = self.method_for_tool(tool) {
			let rules = &method.business_rules;
			if !rules.enabled {
				return envelope::failure(name, ctx, &ToolError::MethodDisabled(method.key()));
			}
			if rules.requires_casefile && ctx.casefile_id.is_none() {
				let error = FieldError::value_error(
					"casefile_id",
					format!("{} requires a casefile context", method.key()),
				);
				return envelope::failure(name, ctx, &ToolError::Validation(vec![error]));
			}
			if let Some(since) = &rules.deprecated_since {
				warn!(
					target: "registry",
					tool = name,
					method = %method.key(),
					since = %since,
					replacement = rules.replacement_method.as_deref().unwrap_or("none"),
					"calling deprecated method"
				);
			}
		}

		tool.execute(ctx, args).await
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::registry::envelope::ToolStatus;
	use crate::registry::schema::{FieldSchema, FieldType, ModelSchema};
	use crate::registry::tools::handler_fn;

	fn classification(subdomain: Subdomain, capability: Capability) -> Classification {
		Classification {
			domain: Domain::Workspace,
			subdomain,
			capability,
			complexity: Complexity::Atomic,
			maturity: Maturity::Stable,
			integration_tier: IntegrationTier::Internal,
		}
	}

	fn search_request() -> ModelSchema {
		let payload = ModelSchema::builder("SearchPayload")
			.field(FieldSchema::new("query", FieldType::Str).min_length(2))
			.field(
				FieldSchema::new("limit", FieldType::Int)
					.with_default(json!(10))
					.max_value(50.0),
			)
			.build();
		ModelSchema::builder("SearchRequest")
			.field(FieldSchema::new("user_id", FieldType::Str))
			.field(FieldSchema::new("payload", FieldType::Model("SearchPayload".into())).with_nested(Arc::new(payload)))
			.build()
	}

	fn echo_tool(name: &str, method: &str) -> ToolRegistration {
		ToolRegistration::new(name, ModelSchema::empty("Empty"))
			.method_name(method)
			.handler(handler_fn(|_, _| async { Ok::<_, ToolError>(json!({"ok": true})) }))
	}

	fn builder() -> RegistryBuilder {
		let mut builder = RegistryBuilder::new(ServiceRegistry::new());
		builder
			.register_method(
				MethodRegistration::new("search_casefiles", "Search casefiles")
					.service("CasefileService", "services::casefile")
					.classification(classification(Subdomain::Casefile, Capability::Search))
					.request_model(search_request()),
			)
			.unwrap();
		builder
			.register_method(
				MethodRegistration::new("close_session", "Close a session")
					.service("ToolSessionService", "services::tool_session")
					.classification(classification(Subdomain::ToolSession, Capability::Update))
					.requires_casefile(true),
			)
			.unwrap();
		builder
			.register_method(
				MethodRegistration::new("close_session", "Close a chat session")
					.service("ChatService", "services::chat")
					.classification(classification(Subdomain::ChatSession, Capability::Update))
					.disabled(),
			)
			.unwrap();
		builder
			.register_tool(echo_tool("search_tool", "search_casefiles"))
			.unwrap();
		builder
			.register_tool(echo_tool("close_tool", "ToolSessionService.close_session"))
			.unwrap();
		builder
			.register_tool(echo_tool("chat_close_tool", "ChatService.close_session"))
			.unwrap();
		builder
	}

	#[test]
	fn test_resolve_method_by_key_and_unique_bare_name() {
		let registry = builder().build();

		assert!(registry.get_method("CasefileService.search_casefiles").is_some());
		assert!(registry.get_method("search_casefiles").is_none());
		assert_eq!(
			registry.resolve_method("search_casefiles").unwrap().key(),
			"CasefileService.search_casefiles"
		);
		assert!(registry.resolve_method("close_session").is_none());
		assert_eq!(registry.ambiguous_method_names(), vec!["close_session".to_string()]);
	}

	#[test]
	fn test_tool_parameters_inherit_from_method() {
		let registry = builder().build();
		let params = registry.get_tool_parameters("search_tool").unwrap();

		let method = registry.get_method("CasefileService.search_casefiles").unwrap();
		let expected: Vec<ToolParameterDef> = method.parameters.iter().map(ToolParameterDef::from).collect();
		assert_eq!(params, expected);
		assert_eq!(params[0].name, "query");
		assert_eq!(params[0].constraints.min_length, Some(2));
		assert_eq!(params[1].default, Some(json!(10)));

		assert!(registry.get_tool_parameters("missing").is_none());
	}

	#[test]
	fn test_classification_queries() {
		let registry = builder().build();

		assert_eq!(registry.get_tools_by_domain(Domain::Workspace).len(), 3);
		assert_eq!(registry.get_tools_by_domain(Domain::Communication).len(), 0);
		let search: Vec<&str> = registry
			.get_tools_by_capability(Capability::Search)
			.iter()
			.map(|t| t.name.as_str())
			.collect();
		assert_eq!(search, vec!["search_tool"]);
		assert_eq!(registry.get_tools_by_subdomain(Subdomain::ChatSession).len(), 1);
		assert_eq!(registry.get_tools_by_complexity(Complexity::Atomic).len(), 3);
		assert_eq!(registry.get_tools_by_maturity(Maturity::Beta).len(), 0);
		assert_eq!(registry.get_tools_by_integration_tier(IntegrationTier::Internal).len(), 3);
	}

	#[test]
	fn test_hierarchical_path() {
		let registry = builder().build();
		assert_eq!(
			registry.get_hierarchical_tool_path("search_tool").as_deref(),
			Some("workspace/casefile/search/search_tool")
		);
		assert!(registry.get_hierarchical_tool_path("missing").is_none());
	}

	#[tokio::test]
	async fn test_execute_tool_gating() {
		let registry = builder().build();
		let ctx = ToolContext::new("u-1");

		let response = registry.execute_tool("missing", &ctx, Map::new()).await;
		assert_eq!(response.error_kind(), Some("ToolNotFoundError"));

		let response = registry.execute_tool("chat_close_tool", &ctx, Map::new()).await;
		assert_eq!(response.error_kind(), Some("MethodDisabledError"));

		let response = registry.execute_tool("close_tool", &ctx, Map::new()).await;
		assert_eq!(response.error_kind(), Some("ValidationError"));

		let response = registry
			.execute_tool("close_tool", &ctx.clone().with_casefile("cf-1"), Map::new())
			.await;
		assert_eq!(response.status, ToolStatus::Completed);
	}

	#[tokio::test]
	async fn test_generated_tool_calls_bundled_service() {
		let mut builder = RegistryBuilder::new(ServiceRegistry::with_defaults());
		assert_eq!(builder.register_service_methods().unwrap(), 3);

		let spec = ToolSpec::parse(
			r#"
name: create_session_tool
description: Open a tool session
implementation:
  type: method_wrapper
method_reference:
  service: ToolSessionService
  method: create_session
"#,
		)
		.unwrap();
		builder.register_tool_spec(spec).unwrap();
		let registry = Arc::new(builder.build());

		let tool = registry.get_tool_definition("create_session_tool").unwrap();
		assert!(tool.inherits_parameters());
		assert_eq!(
			registry.get_tool_parameters("create_session_tool").unwrap()[0].name,
			"casefile_id"
		);

		let response = registry
			.execute_tool(
				"create_session_tool",
				&ToolContext::new("u-7"),
				json!({"casefile_id": "cf_1"}).as_object().cloned().unwrap(),
			)
			.await;
		assert_eq!(response.status, ToolStatus::Completed, "{:?}", response.error);
		let session = &response.result().unwrap()["session"];
		assert_eq!(session["user_id"], "u-7");
		assert_eq!(session["casefile_id"], "cf_1");
	}

	#[test]
	fn test_tool_spec_with_invalid_pattern_is_rejected() {
		let spec = r#"
name: find_casefile
description: Find a casefile by code
parameters:
  - name: code
    type: string
    pattern: "([a-z"
implementation:
  type: method_wrapper
method_reference:
  service: CasefileService
  method: search_casefiles
"#;
		let mut builder = builder();
		assert_matches!(
			builder.register_tool_spec(ToolSpec::parse(spec).unwrap()),
			Err(RegistryError::InvalidSchema(err)) if err.field == "code"
		);

		let dir = tempfile::tempdir().unwrap();
		fs_err::write(dir.path().join("find_casefile.yaml"), spec).unwrap();
		assert_eq!(builder.load_tool_specs(dir.path()).unwrap(), 0);
		assert!(builder.build().get_tool_definition("find_casefile").is_none());
	}
}
