// Dual-schema method/tool registry
//
// This module provides:
// - Schema descriptors and parameter extraction shared by both layers
// - Parameter models compiled into validators at registration
// - Method registration (code builders and the YAML inventory)
// - Tool registration with the validating execution wrapper
// - YAML-driven tool generation routed through the service factory map
// - The frozen `Registry` and its query API

pub mod catalog;
pub mod compiled;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod generator;
pub mod inventory;
pub mod methods;
pub mod schema;
pub mod tools;
pub mod types;

pub use catalog::{Registry, RegistryBuilder};
pub use compiled::{CompiledModel, SchemaError};
pub use envelope::{ToolContext, ToolError, ToolResponse, ToolStatus};
pub use error::RegistryError;
pub use extract::{extract_method_parameters, extract_parameters};
pub use generator::{MethodWrapperHandler, ToolSpec, generate_tool};
pub use inventory::ModelCatalog;
pub use methods::{MethodRegistration, MethodRegistry};
pub use schema::{Constraints, FieldError, FieldSchema, FieldType, ModelSchema};
pub use tools::{ToolHandler, ToolRegistration, ToolRegistry, handler_fn};
pub use types::{
	Capability, Classification, Complexity, Domain, IntegrationTier, Maturity, MethodBusinessRules,
	MethodDefinition, MethodKey, MethodMetadata, MethodParameterDef, MethodRef, ParameterMapping,
	Subdomain, ToolDefinition, ToolParameterDef,
};
