// Compiled parameter models
//
// A `CompiledModel` pairs a `ModelSchema` with one JSON Schema validator per
// field, built once when the owning method or tool is registered. Validation
// runs a lax coercion pass first (numeric strings, boolean words) and then
// checks structure and constraints against the compiled validators.

use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, Validator};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::{FieldError, FieldType, ModelSchema, json_kind};

/// A field declaration that cannot be compiled into a validator
#[derive(Error, Debug)]
#[error("invalid schema for field '{field}' of {model}: {message}")]
pub struct SchemaError {
	pub model: String,
	pub field: String,
	pub message: String,
}

struct CompiledField {
	validator: Validator,
	nested: Option<CompiledModel>,
}

/// A parameter model with its validators compiled
pub struct CompiledModel {
	model: Arc<ModelSchema>,
	fields: Vec<CompiledField>,
}

impl CompiledModel {
	/// Compile every field of `model`, nested models included
	pub fn compile(model: impl Into<Arc<ModelSchema>>) -> Result<Self, SchemaError> {
		let model = model.into();
		let fields = model
			.fields
			.iter()
			.map(|field| -> Result<CompiledField, SchemaError> {
				let validator = jsonschema::options()
					.with_draft(Draft::Draft202012)
					.build(&field.json_schema())
					.map_err(|err| SchemaError {
						model: model.name.clone(),
						field: field.name.clone(),
						message: err.to_string(),
					})?;
				let nested = field.nested.clone().map(CompiledModel::compile).transpose()?;
				Ok(CompiledField { validator, nested })
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self { model, fields })
	}

	pub fn schema(&self) -> &ModelSchema {
		&self.model
	}

	pub fn name(&self) -> &str {
		&self.model.name
	}

	/// Validate and coerce arguments against this model
	///
	/// Missing defaults are filled in and unknown keys are dropped. All
	/// failures are collected rather than stopping at the first one.
	pub fn validate(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, Vec<FieldError>> {
		let mut errors = Vec::new();
		let validated = self.validate_at("", args, &mut errors);
		if errors.is_empty() {
			Ok(validated)
		} else {
			Err(errors)
		}
	}

	fn validate_at(&self, prefix: &str, args: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Map<String, Value> {
		let mut out = Map::new();

		for (field, compiled) in self.model.fields.iter().zip(&self.fields) {
			let loc = join_loc(prefix, &field.name);
			match args.get(&field.name) {
				None => {
					if let Some(default) = &field.default {
						out.insert(field.name.clone(), default.clone());
					} else if field.required {
						errors.push(FieldError::missing(loc));
					}
				},
				Some(Value::Null) => {
					let nullable = matches!(field.field_type, FieldType::Optional(_) | FieldType::Any);
					if field.required && !nullable {
						errors.push(FieldError::type_error(loc, "value must not be null"));
					} else {
						out.insert(field.name.clone(), Value::Null);
					}
				},
				Some(value) => {
					let before = errors.len();
					let coerced = coerce(&field.field_type, compiled.nested.as_ref(), value, &loc, errors);
					if let Some(coerced) = coerced {
						if errors.len() == before {
							errors.extend(
								compiled
									.validator
									.iter_errors(&coerced)
									.map(|err| FieldError::value_error(loc.as_str(), err.to_string())),
							);
						}
						out.insert(field.name.clone(), coerced);
					}
				},
			}
		}

		out
	}
}

impl PartialEq for CompiledModel {
	fn eq(&self, other: &Self) -> bool {
		self.model == other.model
	}
}

impl fmt::Debug for CompiledModel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CompiledModel")
			.field("name", &self.model.name)
			.field("fields", &self.fields.len())
			.finish()
	}
}

impl Serialize for CompiledModel {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.model.serialize(serializer)
	}
}

fn join_loc(prefix: &str, name: &str) -> String {
	if prefix.is_empty() {
		name.to_string()
	} else {
		format!("{}.{}", prefix, name)
	}
}

/// Coerce a value into `ty`, pushing errors on failure
fn coerce(
	ty: &FieldType,
	nested: Option<&CompiledModel>,
	value: &Value,
	loc: &str,
	errors: &mut Vec<FieldError>,
) -> Option<Value> {
	let fail = |errors: &mut Vec<FieldError>, expected: &str| {
		errors.push(FieldError::type_error(loc, format!("expected {}, got {}", expected, json_kind(value))));
		None
	};

	match ty {
		FieldType::Any => Some(value.clone()),
		FieldType::Str => match value {
			Value::String(_) => Some(value.clone()),
			_ => fail(errors, "a string"),
		},
		FieldType::Int => match value {
			Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
			Value::Number(n) => match n.as_f64() {
				// i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
				Some(f) if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
					Some(Value::from(f as i64))
				},
				Some(f) if f.is_finite() && f.fract() == 0.0 => {
					errors.push(FieldError::type_error(loc, format!("{} is outside the integer range", f)));
					None
				},
				_ => fail(errors, "an integer"),
			},
			Value::String(s) => match s.trim().parse::<i64>() {
				Ok(i) => Some(Value::from(i)),
				Err(_) => fail(errors, "an integer"),
			},
			_ => fail(errors, "an integer"),
		},
		FieldType::Float => {
			let parsed = match value {
				Value::Number(n) => n.as_f64(),
				Value::String(s) => s.trim().parse::<f64>().ok(),
				_ => None,
			};
			match parsed.and_then(serde_json::Number::from_f64) {
				Some(n) => Some(Value::Number(n)),
				None => fail(errors, "a number"),
			}
		},
		FieldType::Bool => match value {
			Value::Bool(_) => Some(value.clone()),
			Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
				"true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
				"false" | "0" | "no" | "off" => Some(Value::Bool(false)),
				_ => fail(errors, "a boolean"),
			},
			Value::Number(n) => match n.as_i64() {
				Some(0) => Some(Value::Bool(false)),
				Some(1) => Some(Value::Bool(true)),
				_ => fail(errors, "a boolean"),
			},
			_ => fail(errors, "a boolean"),
		},
		FieldType::List(inner) => match value {
			Value::Array(items) => {
				let before = errors.len();
				let coerced: Vec<Value> = items
					.iter()
					.enumerate()
					.filter_map(|(i, item)| coerce(inner, nested, item, &format!("{}.{}", loc, i), errors))
					.collect();
				(errors.len() == before).then_some(Value::Array(coerced))
			},
			_ => fail(errors, "a list"),
		},
		FieldType::Dict(_, inner) => match value {
			Value::Object(entries) => {
				let before = errors.len();
				let mut coerced = Map::new();
				for (key, item) in entries {
					if let Some(v) = coerce(inner, nested, item, &format!("{}.{}", loc, key), errors) {
						coerced.insert(key.clone(), v);
					}
				}
				(errors.len() == before).then_some(Value::Object(coerced))
			},
			_ => fail(errors, "an object"),
		},
		FieldType::Optional(inner) => match value {
			Value::Null => Some(Value::Null),
			_ => coerce(inner, nested, value, loc, errors),
		},
		FieldType::Union(variants) => {
			for variant in variants {
				let mut scratch = Vec::new();
				if let Some(v) = coerce(variant, None, value, loc, &mut scratch) {
					if scratch.is_empty() {
						return Some(v);
					}
				}
			}
			fail(errors, &ty.to_string())
		},
		FieldType::Model(name) => match (value, nested) {
			(Value::Object(obj), Some(model)) => {
				let before = errors.len();
				let validated = model.validate_at(loc, obj, errors);
				(errors.len() == before).then_some(Value::Object(validated))
			},
			(Value::Object(_), None) => Some(value.clone()),
			_ => fail(errors, &format!("an object ({})", name)),
		},
	}
}
