// Parameter model descriptors
//
// A `ModelSchema` is the explicit description of a parameter model shared by
// methods and tools. It is either built by hand (builder API, YAML specs) or
// derived once from a type's schemars JSON Schema, and is then cached in an
// `Arc` on the definition that owns it. Nothing re-derives a schema per call.
// Argument validation lives in `compiled`, which renders each field back to
// JSON Schema and compiles it once.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};

/// Guards against self-referential models when walking `$defs`
const MAX_MODEL_DEPTH: usize = 8;

/// Canonical parameter type
///
/// Rendered as the type strings used across both schema layers:
/// `str`, `int`, `float`, `bool`, `List[T]`, `Dict[K, V]`, `Optional[T]`,
/// `Union[A, B]`, a nested model name, or `Any`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
	Str,
	Int,
	Float,
	Bool,
	List(Box<FieldType>),
	Dict(Box<FieldType>, Box<FieldType>),
	Optional(Box<FieldType>),
	Union(Vec<FieldType>),
	Model(String),
	Any,
}

impl FieldType {
	/// Parse a declared type string.
	///
	/// Accepts both the canonical spelling (`int`, `List[str]`) and the JSON
	/// flavoured spelling used in YAML specs (`integer`, `array`).
	pub fn parse(declared: &str) -> Self {
		let declared = declared.trim();

		if let Some((head, inner)) = split_generic(declared) {
			let args = split_top_level(inner);
			return match head.trim().to_ascii_lowercase().as_str() {
				"list" | "array" | "sequence" | "set" => {
					FieldType::List(Box::new(args.first().map_or(FieldType::Any, |a| FieldType::parse(a))))
				},
				"dict" | "mapping" | "object" => {
					let key = args.first().map_or(FieldType::Str, |a| FieldType::parse(a));
					let value = args.get(1).map_or(FieldType::Any, |a| FieldType::parse(a));
					FieldType::Dict(Box::new(key), Box::new(value))
				},
				"optional" => {
					FieldType::Optional(Box::new(args.first().map_or(FieldType::Any, |a| FieldType::parse(a))))
				},
				"union" => {
					let variants: Vec<FieldType> = args
						.iter()
						.filter(|a| !is_none_literal(a))
						.map(|a| FieldType::parse(a))
						.collect();
					let nullable = variants.len() < args.len();
					match (variants.len(), nullable) {
						(1, true) => FieldType::Optional(Box::new(variants.into_iter().next().unwrap_or(FieldType::Any))),
						(0, _) => FieldType::Any,
						_ => FieldType::Union(variants),
					}
				},
				_ => FieldType::Model(declared.to_string()),
			};
		}

		match declared.to_ascii_lowercase().as_str() {
			"str" | "string" => FieldType::Str,
			"int" | "integer" => FieldType::Int,
			"float" | "number" => FieldType::Float,
			"bool" | "boolean" => FieldType::Bool,
			"list" | "array" => FieldType::List(Box::new(FieldType::Any)),
			"dict" | "object" => FieldType::Dict(Box::new(FieldType::Str), Box::new(FieldType::Any)),
			"" | "any" => FieldType::Any,
			_ => FieldType::Model(declared.to_string()),
		}
	}

	/// Strip one level of `Optional`
	pub fn unwrap_optional(&self) -> &FieldType {
		match self {
			FieldType::Optional(inner) => inner,
			other => other,
		}
	}

	pub fn is_numeric(&self) -> bool {
		matches!(self.unwrap_optional(), FieldType::Int | FieldType::Float)
	}

	/// JSON Schema of the type, without constraints
	///
	/// Nested models render as a plain object; their fields are checked by
	/// the nested model's own compiled schema.
	pub fn json_schema(&self) -> Value {
		match self {
			FieldType::Str => json!({"type": "string"}),
			FieldType::Int => json!({"type": "integer"}),
			FieldType::Float => json!({"type": "number"}),
			FieldType::Bool => json!({"type": "boolean"}),
			FieldType::List(inner) => json!({"type": "array", "items": inner.json_schema()}),
			FieldType::Dict(_, value) => json!({"type": "object", "additionalProperties": value.json_schema()}),
			FieldType::Optional(inner) => json!({"anyOf": [inner.json_schema(), {"type": "null"}]}),
			FieldType::Union(variants) => {
				json!({"anyOf": variants.iter().map(FieldType::json_schema).collect::<Vec<_>>()})
			},
			FieldType::Model(_) => json!({"type": "object"}),
			FieldType::Any => json!({}),
		}
	}
}

impl fmt::Display for FieldType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FieldType::Str => f.write_str("str"),
			FieldType::Int => f.write_str("int"),
			FieldType::Float => f.write_str("float"),
			FieldType::Bool => f.write_str("bool"),
			FieldType::List(inner) => write!(f, "List[{}]", inner),
			FieldType::Dict(key, value) => write!(f, "Dict[{}, {}]", key, value),
			FieldType::Optional(inner) => write!(f, "Optional[{}]", inner),
			FieldType::Union(variants) => {
				f.write_str("Union[")?;
				for (i, variant) in variants.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{}", variant)?;
				}
				f.write_str("]")
			},
			FieldType::Model(name) => f.write_str(name),
			FieldType::Any => f.write_str("Any"),
		}
	}
}

impl Serialize for FieldType {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

fn is_none_literal(s: &str) -> bool {
	matches!(s.trim(), "None" | "none" | "null" | "NoneType")
}

fn split_generic(s: &str) -> Option<(&str, &str)> {
	let open = s.find('[')?;
	let body = s.strip_suffix(']')?;
	Some((&s[..open], &body[open + 1..]))
}

fn split_top_level(s: &str) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut depth = 0i32;
	let mut start = 0;

	for (i, c) in s.char_indices() {
		match c {
			'[' => depth += 1,
			']' => depth -= 1,
			',' if depth == 0 => {
				parts.push(s[start..i].trim());
				start = i + 1;
			},
			_ => {},
		}
	}

	let last = s[start..].trim();
	if !last.is_empty() {
		parts.push(last);
	}
	parts
}

/// Documented value constraints carried by a parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_value: Option<f64>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_value: Option<f64>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exclusive_minimum: Option<f64>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exclusive_maximum: Option<f64>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_length: Option<usize>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_length: Option<usize>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pattern: Option<String>,
}

impl Constraints {
	pub fn is_empty(&self) -> bool {
		self.min_value.is_none()
			&& self.max_value.is_none()
			&& self.exclusive_minimum.is_none()
			&& self.exclusive_maximum.is_none()
			&& self.min_length.is_none()
			&& self.max_length.is_none()
			&& self.pattern.is_none()
	}

	/// Read JSON Schema validation keywords
	fn from_json_schema(schema: &Value) -> Self {
		let number = |key: &str| schema.get(key).and_then(Value::as_f64);
		let length = |keys: &[&str]| {
			keys
				.iter()
				.find_map(|k| schema.get(*k).and_then(Value::as_u64))
				.map(|n| n as usize)
		};

		Self {
			min_value: number("minimum"),
			max_value: number("maximum"),
			exclusive_minimum: number("exclusiveMinimum"),
			exclusive_maximum: number("exclusiveMaximum"),
			min_length: length(&["minLength", "minItems"]),
			max_length: length(&["maxLength", "maxItems"]),
			pattern: schema.get("pattern").and_then(Value::as_str).map(str::to_string),
		}
	}

	/// Fill unset constraints from `other`
	fn or(self, other: Constraints) -> Self {
		Self {
			min_value: self.min_value.or(other.min_value),
			max_value: self.max_value.or(other.max_value),
			exclusive_minimum: self.exclusive_minimum.or(other.exclusive_minimum),
			exclusive_maximum: self.exclusive_maximum.or(other.exclusive_maximum),
			min_length: self.min_length.or(other.min_length),
			max_length: self.max_length.or(other.max_length),
			pattern: self.pattern.or(other.pattern),
		}
	}

	/// Write the matching JSON Schema keywords into `schema`
	///
	/// Length bounds apply to strings and lists alike, so both keyword
	/// families are written; each only constrains its own instance type.
	fn write_json_schema(&self, schema: &mut Map<String, Value>) {
		let numbers = [
			("minimum", self.min_value),
			("maximum", self.max_value),
			("exclusiveMinimum", self.exclusive_minimum),
			("exclusiveMaximum", self.exclusive_maximum),
		];
		for (keyword, bound) in numbers {
			if let Some(bound) = bound {
				schema.insert(keyword.into(), json!(bound));
			}
		}
		if let Some(min) = self.min_length {
			schema.insert("minLength".into(), json!(min));
			schema.insert("minItems".into(), json!(min));
		}
		if let Some(max) = self.max_length {
			schema.insert("maxLength".into(), json!(max));
			schema.insert("maxItems".into(), json!(max));
		}
		if let Some(pattern) = &self.pattern {
			schema.insert("pattern".into(), json!(pattern));
		}
	}
}

/// A single field of a parameter model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
	pub name: String,

	#[serde(rename = "type")]
	pub field_type: FieldType,

	pub required: bool,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub default: Option<Value>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	#[serde(flatten)]
	pub constraints: Constraints,

	/// Field schema of a nested model (directly, or as list/dict element)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub nested: Option<Arc<ModelSchema>>,
}

impl FieldSchema {
	/// Create a required field
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			required: true,
			default: None,
			description: None,
			constraints: Constraints::default(),
			nested: None,
		}
	}

	/// Mark the field as optional without a default
	pub fn optional(mut self) -> Self {
		self.required = false;
		self
	}

	/// Set a default value (makes the field optional)
	pub fn with_default(mut self, default: Value) -> Self {
		self.required = false;
		self.default = Some(default);
		self
	}

	pub fn describe(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn with_constraints(mut self, constraints: Constraints) -> Self {
		self.constraints = constraints;
		self
	}

	pub fn min_value(mut self, min: f64) -> Self {
		self.constraints.min_value = Some(min);
		self
	}

	pub fn max_value(mut self, max: f64) -> Self {
		self.constraints.max_value = Some(max);
		self
	}

	pub fn exclusive_minimum(mut self, min: f64) -> Self {
		self.constraints.exclusive_minimum = Some(min);
		self
	}

	pub fn exclusive_maximum(mut self, max: f64) -> Self {
		self.constraints.exclusive_maximum = Some(max);
		self
	}

	pub fn min_length(mut self, min: usize) -> Self {
		self.constraints.min_length = Some(min);
		self
	}

	pub fn max_length(mut self, max: usize) -> Self {
		self.constraints.max_length = Some(max);
		self
	}

	pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
		self.constraints.pattern = Some(pattern.into());
		self
	}

	pub fn with_nested(mut self, model: Arc<ModelSchema>) -> Self {
		self.nested = Some(model);
		self
	}

	/// JSON Schema of the field's value, constraints included
	pub fn json_schema(&self) -> Value {
		let mut schema = match self.field_type.json_schema() {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		self.constraints.write_json_schema(&mut schema);
		Value::Object(schema)
	}
}

/// Kind of field validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
	Missing,
	TypeError,
	ValueError,
}

/// A single validation failure, located by dotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
	pub loc: String,
	pub message: String,
	#[serde(rename = "type")]
	pub kind: FieldErrorKind,
}

impl FieldError {
	pub fn missing(loc: impl Into<String>) -> Self {
		Self {
			loc: loc.into(),
			message: "field required".to_string(),
			kind: FieldErrorKind::Missing,
		}
	}

	pub fn type_error(loc: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			loc: loc.into(),
			message: message.into(),
			kind: FieldErrorKind::TypeError,
		}
	}

	pub fn value_error(loc: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			loc: loc.into(),
			message: message.into(),
			kind: FieldErrorKind::ValueError,
		}
	}
}

impl fmt::Display for FieldError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.loc, self.message)
	}
}

/// Join field errors into a single human readable line
pub fn describe_errors(errors: &[FieldError]) -> String {
	errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Immutable description of a parameter model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSchema {
	pub name: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	pub fields: Vec<FieldSchema>,
}

impl ModelSchema {
	pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
		ModelSchemaBuilder {
			schema: Self::empty(name),
		}
	}

	/// A model without fields
	pub fn empty(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: None,
			fields: Vec::new(),
		}
	}

	/// Derive the descriptor of a Rust type from its JSON Schema
	pub fn of<T: JsonSchema>() -> Self {
		let schema = schemars::schema_for!(T);
		Self::from_json_schema(&T::schema_name(), schema.as_value())
	}

	/// Build a descriptor from a JSON Schema document
	///
	/// Object properties become fields in declaration order. References into
	/// `$defs` are resolved into nested models, and nullable types are
	/// unwrapped one level at the field boundary.
	pub fn from_json_schema(name: &str, root: &Value) -> Self {
		let no_defs = Map::new();
		let defs = root
			.get("$defs")
			.or_else(|| root.get("definitions"))
			.and_then(Value::as_object)
			.unwrap_or(&no_defs);

		SchemaWalker { defs }.model(name, root, 0)
	}

	pub fn field(&self, name: &str) -> Option<&FieldSchema> {
		self.fields.iter().find(|f| f.name == name)
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Copy this model under a new name with extra fields appended
	///
	/// Fields already present keep their original declaration.
	pub fn extended(&self, name: impl Into<String>, extra: Vec<FieldSchema>) -> Self {
		let mut fields = self.fields.clone();
		for field in extra {
			if !fields.iter().any(|f| f.name == field.name) {
				fields.push(field);
			}
		}
		Self {
			name: name.into(),
			description: self.description.clone(),
			fields,
		}
	}
}

/// Builder for hand-declared models
pub struct ModelSchemaBuilder {
	schema: ModelSchema,
}

impl ModelSchemaBuilder {
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.schema.description = Some(description.into());
		self
	}

	pub fn field(mut self, field: FieldSchema) -> Self {
		self.schema.fields.push(field);
		self
	}

	pub fn build(self) -> ModelSchema {
		self.schema
	}
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

/// Intermediate result of resolving a JSON Schema node
struct Resolved {
	field_type: FieldType,
	constraints: Constraints,
	nested: Option<Arc<ModelSchema>>,
}

impl Resolved {
	fn of(field_type: FieldType, constraints: Constraints) -> Self {
		Self {
			field_type,
			constraints,
			nested: None,
		}
	}

	/// Nullable types are unwrapped at the field boundary and kept below it
	fn nullable(mut self, nullable: bool, top: bool) -> Self {
		if nullable && !top {
			self.field_type = FieldType::Optional(Box::new(self.field_type));
		}
		self
	}
}

struct SchemaWalker<'a> {
	defs: &'a Map<String, Value>,
}

impl SchemaWalker<'_> {
	fn model(&self, name: &str, schema: &Value, depth: usize) -> ModelSchema {
		let required: HashSet<&str> = schema
			.get("required")
			.and_then(Value::as_array)
			.map(|r| r.iter().filter_map(Value::as_str).collect())
			.unwrap_or_default();

		let fields = schema
			.get("properties")
			.and_then(Value::as_object)
			.map(|props| {
				props
					.iter()
					.map(|(field_name, field_schema)| {
						self.field(field_name, field_schema, required.contains(field_name.as_str()), depth)
					})
					.collect()
			})
			.unwrap_or_default();

		ModelSchema {
			name: name.to_string(),
			description: schema.get("description").and_then(Value::as_str).map(str::to_string),
			fields,
		}
	}

	fn field(&self, name: &str, schema: &Value, listed_required: bool, depth: usize) -> FieldSchema {
		let resolved = self.resolve(schema, depth, true);
		let default = schema.get("default").cloned();

		FieldSchema {
			name: name.to_string(),
			field_type: resolved.field_type,
			required: listed_required && default.is_none(),
			default,
			description: schema.get("description").and_then(Value::as_str).map(str::to_string),
			constraints: resolved.constraints,
			nested: resolved.nested,
		}
	}

	fn resolve(&self, schema: &Value, depth: usize, top: bool) -> Resolved {
		let constraints = Constraints::from_json_schema(schema);

		if depth > MAX_MODEL_DEPTH {
			return Resolved::of(FieldType::Any, constraints);
		}

		if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
			let mut resolved = self.resolve_ref(reference, depth);
			resolved.constraints = constraints.or(resolved.constraints);
			return resolved;
		}

		if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
			if all_of.len() == 1 {
				let mut resolved = self.resolve(&all_of[0], depth, top);
				resolved.constraints = constraints.or(resolved.constraints);
				return resolved;
			}
		}

		let variants = schema
			.get("anyOf")
			.or_else(|| schema.get("oneOf"))
			.and_then(Value::as_array);
		if let Some(variants) = variants {
			let non_null: Vec<&Value> = variants.iter().filter(|v| !is_null_schema(v)).collect();
			let nullable = non_null.len() < variants.len();

			if !non_null.is_empty() && non_null.iter().all(|v| v.get("const").is_some()) {
				let literals: Vec<Value> = non_null.iter().filter_map(|v| v.get("const").cloned()).collect();
				return Resolved::of(literal_type(&literals), constraints).nullable(nullable, top);
			}

			if non_null.len() == 1 {
				let mut resolved = self.resolve(non_null[0], depth, false);
				resolved.constraints = constraints.or(resolved.constraints);
				return resolved.nullable(nullable, top);
			}

			let types = non_null
				.iter()
				.map(|v| self.resolve(v, depth, false).field_type)
				.collect();
			return Resolved::of(FieldType::Union(types), constraints).nullable(nullable, top);
		}

		match schema.get("type") {
			Some(Value::String(name)) => self.resolve_named(name, schema, depth, constraints),
			Some(Value::Array(names)) => {
				let non_null: Vec<&str> = names
					.iter()
					.filter_map(Value::as_str)
					.filter(|n| *n != "null")
					.collect();
				let nullable = non_null.len() < names.len();
				let resolved = if non_null.len() == 1 {
					self.resolve_named(non_null[0], schema, depth, constraints)
				} else {
					let types = non_null
						.iter()
						.map(|n| self.resolve_named(n, schema, depth, Constraints::default()).field_type)
						.collect();
					Resolved::of(FieldType::Union(types), constraints)
				};
				resolved.nullable(nullable, top)
			},
			_ => {
				if let Some(values) = schema.get("enum").and_then(Value::as_array) {
					Resolved::of(literal_type(values), constraints)
				} else if let Some(value) = schema.get("const") {
					Resolved::of(literal_type(std::slice::from_ref(value)), constraints)
				} else if schema.get("properties").is_some() {
					self.inline_model(schema, depth, constraints)
				} else {
					Resolved::of(FieldType::Any, constraints)
				}
			},
		}
	}

	fn resolve_named(&self, name: &str, schema: &Value, depth: usize, constraints: Constraints) -> Resolved {
		match name {
			"string" => Resolved::of(FieldType::Str, constraints),
			"integer" => Resolved::of(FieldType::Int, constraints),
			"number" => Resolved::of(FieldType::Float, constraints),
			"boolean" => Resolved::of(FieldType::Bool, constraints),
			"array" => {
				let items = schema
					.get("items")
					.map(|items| self.resolve(items, depth, false))
					.unwrap_or_else(|| Resolved::of(FieldType::Any, Constraints::default()));
				Resolved {
					field_type: FieldType::List(Box::new(items.field_type)),
					constraints,
					nested: items.nested,
				}
			},
			"object" => {
				if schema.get("properties").is_some() {
					return self.inline_model(schema, depth, constraints);
				}
				let values = match schema.get("additionalProperties") {
					Some(ap @ Value::Object(_)) => self.resolve(ap, depth, false),
					_ => Resolved::of(FieldType::Any, Constraints::default()),
				};
				Resolved {
					field_type: FieldType::Dict(Box::new(FieldType::Str), Box::new(values.field_type)),
					constraints,
					nested: values.nested,
				}
			},
			_ => Resolved::of(FieldType::Any, constraints),
		}
	}

	fn resolve_ref(&self, reference: &str, depth: usize) -> Resolved {
		let name = reference.rsplit('/').next().unwrap_or(reference);
		let Some(target) = self.defs.get(name) else {
			return Resolved::of(FieldType::Model(name.to_string()), Constraints::default());
		};

		if target.get("properties").is_some() {
			return Resolved {
				field_type: FieldType::Model(name.to_string()),
				constraints: Constraints::default(),
				nested: Some(Arc::new(self.model(name, target, depth + 1))),
			};
		}

		// Enums and newtypes resolve to their underlying representation
		self.resolve(target, depth + 1, false)
	}

	fn inline_model(&self, schema: &Value, depth: usize, constraints: Constraints) -> Resolved {
		let name = schema.get("title").and_then(Value::as_str).unwrap_or("object");
		Resolved {
			field_type: FieldType::Model(name.to_string()),
			constraints,
			nested: Some(Arc::new(self.model(name, schema, depth + 1))),
		}
	}
}

fn is_null_schema(schema: &Value) -> bool {
	schema.get("type").and_then(Value::as_str) == Some("null")
}

fn literal_type(values: &[Value]) -> FieldType {
	let kinds: HashSet<&str> = values.iter().map(json_kind).collect();
	match kinds.into_iter().collect::<Vec<_>>().as_slice() {
		["string"] => FieldType::Str,
		["boolean"] => FieldType::Bool,
		["number"] => {
			if values.iter().all(|v| v.is_i64() || v.is_u64()) {
				FieldType::Int
			} else {
				FieldType::Float
			}
		},
		_ => FieldType::Any,
	}
}
