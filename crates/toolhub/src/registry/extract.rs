// Parameter extraction from model descriptors
//
// Both registration paths describe their parameters from a `ModelSchema`.
// Methods follow the payload envelope convention: when the request model has
// a `payload` field holding a nested model, that model's fields are the
// method's parameters.

use std::sync::Arc;

use super::schema::{FieldSchema, FieldType, ModelSchema};
use super::types::{MethodParameterDef, ToolParameterDef};

/// Name of the envelope field wrapping a method's business parameters
pub const PAYLOAD_FIELD: &str = "payload";

/// Tool parameters for every field of `model`, in declaration order
pub fn extract_parameters(model: &ModelSchema) -> Vec<ToolParameterDef> {
	model
		.fields
		.iter()
		.map(|field| ToolParameterDef {
			name: field.name.clone(),
			param_type: field.field_type.unwrap_optional().to_string(),
			required: field.required,
			description: field.description.clone(),
			default: field.default.clone(),
			constraints: field.constraints.clone(),
		})
		.collect()
}

/// Method parameters of a request model
///
/// A missing model yields an empty list.
pub fn extract_method_parameters(model: Option<&ModelSchema>) -> Vec<MethodParameterDef> {
	let Some(model) = model else {
		return Vec::new();
	};

	let source = model
		.field(PAYLOAD_FIELD)
		.and_then(|payload| payload.nested.as_deref())
		.unwrap_or(model);

	source
		.fields
		.iter()
		.map(|field| MethodParameterDef {
			name: field.name.clone(),
			param_type: field.field_type.unwrap_optional().to_string(),
			required: field.required,
			description: field.description.clone(),
			default_value: field.default.clone(),
			constraints: field.constraints.clone(),
		})
		.collect()
}

/// Field descriptor for a declared tool parameter
pub fn field_from_parameter(param: &ToolParameterDef) -> FieldSchema {
	let mut field = FieldSchema::new(&param.name, FieldType::parse(&param.param_type))
		.with_constraints(param.constraints.clone());

	if let Some(description) = &param.description {
		field = field.describe(description);
	}
	match &param.default {
		Some(default) => field.with_default(default.clone()),
		None if !param.required => field.optional(),
		None => field,
	}
}

/// Model descriptor for a list of declared tool parameters
pub fn model_from_parameters(name: impl Into<String>, params: &[ToolParameterDef]) -> ModelSchema {
	ModelSchema {
		name: name.into(),
		description: None,
		fields: params.iter().map(field_from_parameter).collect(),
	}
}

/// Payload model of a request model, when it follows the envelope convention
pub fn payload_model(model: &ModelSchema) -> Option<Arc<ModelSchema>> {
	model.field(PAYLOAD_FIELD)?.nested.clone()
}
