// Integration tests for the bundled registry: queries and tool execution

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use toolhub::config::RegistryConfig;
use toolhub::registry::generator::ToolSpec;
use toolhub::registry::{
	Capability, Domain, Subdomain, ToolContext, ToolParameterDef, ToolStatus,
};
use toolhub::services::ServiceRegistry;
use toolhub::validation::{Report, check_consistency};
use toolhub::{Registry, RegistryBuilder, RegistryLoader};

fn bundled_registry() -> anyhow::Result<Arc<Registry>> {
	let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
	let config = RegistryConfig {
		inventory: manifest.join("../../config/methods_inventory.yaml"),
		tools_dir: manifest.join("../../config/tools"),
		source_root: manifest.join("src"),
		..RegistryConfig::default()
	};
	Ok(RegistryLoader::new(config).load()?.registry)
}

fn args(value: Value) -> Map<String, Value> {
	value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_classification_queries() -> anyhow::Result<()> {
	let registry = bundled_registry()?;

	assert_eq!(registry.get_tools_by_domain(Domain::Workspace).len(), 7);
	assert_eq!(registry.get_tools_by_subdomain(Subdomain::Casefile).len(), 4);
	assert_eq!(registry.get_tools_by_subdomain(Subdomain::ToolSession).len(), 3);

	let creators: Vec<&str> = registry
		.get_tools_by_capability(Capability::Create)
		.iter()
		.map(|t| t.name.as_str())
		.collect();
	assert_eq!(creators, vec!["create_casefile_tool", "create_session_tool"]);

	assert_eq!(
		registry.get_hierarchical_tool_path("list_casefiles_tool").as_deref(),
		Some("workspace/casefile/list/list_casefiles_tool")
	);
	assert!(registry.validate_tool_exists("close_session_tool"));
	assert!(!registry.validate_tool_exists("delete_casefile_tool"));
	Ok(())
}

#[test]
fn test_parameter_inheritance() -> anyhow::Result<()> {
	let registry = bundled_registry()?;

	let inherited = registry.get_tool_parameters("get_casefile_tool").expect("tool exists");
	let method = registry.get_method("CasefileService.get_casefile").expect("method exists");
	let expected: Vec<ToolParameterDef> = method.parameters.iter().map(ToolParameterDef::from).collect();
	assert_eq!(inherited, expected);
	assert_eq!(inherited[0].name, "casefile_id");
	assert!(inherited[0].required);

	let explicit = registry.get_tool_parameters("list_casefiles_tool").expect("tool exists");
	let names: Vec<&str> = explicit.iter().map(|p| p.name.as_str()).collect();
	assert_eq!(names, vec!["limit", "tag"]);
	assert_eq!(explicit[0].param_type, "integer");
	Ok(())
}

#[tokio::test]
async fn test_casefile_tools_round_trip_through_service() -> anyhow::Result<()> {
	let registry = bundled_registry()?;
	let ctx = ToolContext::new("analyst-1").with_correlation("corr-9");

	let created = registry
		.execute_tool(
			"create_casefile_tool",
			&ctx,
			args(json!({"title": "Quarterly review", "tags": ["finance"]})),
		)
		.await;
	assert_eq!(created.status, ToolStatus::Completed, "{:?}", created.error);
	assert_eq!(created.metadata.tool_name, "create_casefile_tool");
	assert_eq!(created.payload.correlation["correlation_id"], "corr-9");
	let casefile = &created.result().expect("result")["casefile"];
	assert_eq!(casefile["owner_id"], "analyst-1");
	let casefile_id = casefile["id"].as_str().expect("id").to_string();

	let fetched = registry
		.execute_tool("get_casefile_tool", &ctx, args(json!({"casefile_id": casefile_id})))
		.await;
	assert_eq!(fetched.status, ToolStatus::Completed, "{:?}", fetched.error);
	assert_eq!(fetched.result().expect("result")["casefile"]["title"], "Quarterly review");

	let listed = registry
		.execute_tool("list_casefiles_tool", &ctx, args(json!({"tag": "finance"})))
		.await;
	assert_eq!(listed.status, ToolStatus::Completed, "{:?}", listed.error);
	assert_eq!(listed.result().expect("result")["total"], 1);

	let other_user = registry
		.execute_tool("list_casefiles_tool", &ToolContext::new("analyst-2"), Map::new())
		.await;
	assert_eq!(other_user.result().expect("result")["total"], 0);
	Ok(())
}

#[tokio::test]
async fn test_failures_are_reported_in_the_envelope() -> anyhow::Result<()> {
	let registry = bundled_registry()?;
	let ctx = ToolContext::new("analyst-1");

	let out_of_range = registry
		.execute_tool("list_casefiles_tool", &ctx, args(json!({"limit": 500})))
		.await;
	assert_eq!(out_of_range.status, ToolStatus::Failed);
	assert_eq!(out_of_range.error_kind(), Some("ValidationError"));
	let error = out_of_range.error.as_ref().expect("error");
	assert_eq!(error.validation_errors[0].loc, "limit");

	let missing = registry
		.execute_tool("get_casefile_tool", &ctx, args(json!({"casefile_id": "cf_missing"})))
		.await;
	assert_eq!(missing.error_kind(), Some("ExecutionError"));

	let unknown = registry.execute_tool("delete_casefile_tool", &ctx, Map::new()).await;
	assert_eq!(unknown.error_kind(), Some("ToolNotFoundError"));

	let preview = registry
		.execute_tool(
			"create_casefile_tool",
			&ctx,
			args(json!({"title": "Draft", "dry_run": true})),
		)
		.await;
	assert_eq!(preview.status, ToolStatus::Completed);
	let result = preview.result().expect("result");
	assert_eq!(result["dry_run"], true);
	assert_eq!(result["method"], "CasefileService.create_casefile");
	assert_eq!(result["method_params"]["title"], "Draft");
	Ok(())
}

#[test]
fn test_identical_tool_spec_registers_once() -> anyhow::Result<()> {
	let mut builder = RegistryBuilder::new(ServiceRegistry::with_defaults());
	builder.register_service_methods()?;

	let spec = ToolSpec::parse(
		r#"
name: get_session_tool
description: Fetch a tool session
implementation:
  type: method_wrapper
method_reference:
  service: ToolSessionService
  method: get_session
"#,
	)?;
	assert_eq!(builder.register_tool_spec(spec.clone())?, "get_session_tool");
	assert_eq!(builder.register_tool_spec(spec)?, "get_session_tool");

	let registry = builder.build();
	assert_eq!(registry.tool_count(), 1);
	assert!(registry.duplicate_tools().is_empty());
	assert!(!check_consistency(&registry).has_errors());
	Ok(())
}
