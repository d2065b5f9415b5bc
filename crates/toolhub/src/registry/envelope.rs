// Tool execution envelope
//
// Every tool invocation produces a `ToolResponse`, successful or not. Errors
// are carried inside the envelope and never surface to the caller as `Err`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::schema::{FieldError, describe_errors};

/// Caller identity and correlation passed to every invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContext {
	pub user_id: Option<String>,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub correlation_id: Option<String>,
}

impl ToolContext {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self {
			user_id: Some(user_id.into()),
			..Default::default()
		}
	}

	pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
		self.session_id = Some(session_id.into());
		self
	}

	pub fn with_casefile(mut self, casefile_id: impl Into<String>) -> Self {
		self.casefile_id = Some(casefile_id.into());
		self
	}

	pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
		self.correlation_id = Some(correlation_id.into());
		self
	}
}

/// Tool execution failures
#[derive(Error, Debug, Clone)]
pub enum ToolError {
	#[error("parameter validation failed: {}", describe_errors(.0))]
	Validation(Vec<FieldError>),

	#[error("failed to instantiate service '{0}'")]
	ServiceInstantiation(String),

	#[error("failed to build request for '{method}': {message}")]
	RequestBuild { method: String, message: String },

	#[error("'{method}' timed out after {seconds}s")]
	Timeout { method: String, seconds: u64 },

	#[error("method '{0}' not found")]
	MethodNotFound(String),

	#[error("method '{0}' is disabled")]
	MethodDisabled(String),

	#[error("{0}")]
	Execution(String),

	#[error("tool implementation panicked: {0}")]
	Panic(String),

	#[error("tool '{0}' not found in registry")]
	ToolNotFound(String),
}

impl ToolError {
	pub fn request_build(method: impl Into<String>, message: impl Into<String>) -> Self {
		Self::RequestBuild {
			method: method.into(),
			message: message.into(),
		}
	}

	pub fn execution(message: impl Into<String>) -> Self {
		Self::Execution(message.into())
	}

	/// Stable error type name reported in envelopes
	pub fn kind(&self) -> &'static str {
		match self {
			ToolError::Validation(_) => "ValidationError",
			ToolError::ServiceInstantiation(_) => "ServiceInstantiationError",
			ToolError::RequestBuild { .. } => "RequestDTOBuildError",
			ToolError::Timeout { .. } => "TimeoutError",
			ToolError::MethodNotFound(_) => "MethodNotFoundError",
			ToolError::MethodDisabled(_) => "MethodDisabledError",
			ToolError::Execution(_) => "ExecutionError",
			ToolError::Panic(_) => "PanicError",
			ToolError::ToolNotFound(_) => "ToolNotFoundError",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
	Completed,
	Failed,
}

/// Lifecycle event recorded during an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
	pub event_type: String,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

impl ToolEvent {
	pub fn new(event_type: impl Into<String>) -> Self {
		Self {
			event_type: event_type.into(),
			timestamp: Utc::now(),
			detail: None,
		}
	}

	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
	pub result: Option<Map<String, Value>>,
	pub events: Vec<ToolEvent>,
	pub correlation: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
	pub tool_name: String,
	pub execution_time_ms: u64,
	pub user_id: Option<String>,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorInfo {
	#[serde(rename = "type")]
	pub kind: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub validation_errors: Vec<FieldError>,
}

impl From<&ToolError> for ToolErrorInfo {
	fn from(error: &ToolError) -> Self {
		let validation_errors = match error {
			ToolError::Validation(errors) => errors.clone(),
			_ => Vec::new(),
		};
		Self {
			kind: error.kind().to_string(),
			message: error.to_string(),
			validation_errors,
		}
	}
}

/// Standard response of a tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
	pub request_id: Uuid,
	pub status: ToolStatus,
	pub payload: ToolPayload,
	pub metadata: ResponseMetadata,
	pub error: Option<ToolErrorInfo>,
}

impl ToolResponse {
	pub fn is_success(&self) -> bool {
		self.status == ToolStatus::Completed
	}

	pub fn result(&self) -> Option<&Map<String, Value>> {
		self.payload.result.as_ref()
	}

	pub fn error_kind(&self) -> Option<&str> {
		self.error.as_ref().map(|e| e.kind.as_str())
	}
}

/// Accumulates envelope state for one invocation
pub(crate) struct Envelope {
	request_id: Uuid,
	tool_name: String,
	ctx: ToolContext,
	started_at: DateTime<Utc>,
	events: Vec<ToolEvent>,
}

impl Envelope {
	pub(crate) fn start(tool_name: &str, ctx: &ToolContext) -> Self {
		Self {
			request_id: Uuid::new_v4(),
			tool_name: tool_name.to_string(),
			ctx: ctx.clone(),
			started_at: Utc::now(),
			events: vec![ToolEvent::new("tool_started")],
		}
	}

	pub(crate) fn completed(mut self, result: Map<String, Value>, elapsed_ms: u64) -> ToolResponse {
		self.events.push(ToolEvent::new("tool_completed"));
		self.finish(ToolStatus::Completed, Some(result), None, elapsed_ms)
	}

	pub(crate) fn failed(mut self, error: &ToolError, elapsed_ms: u64) -> ToolResponse {
		self
			.events
			.push(ToolEvent::new("tool_failed").with_detail(error.kind()));
		self.finish(ToolStatus::Failed, None, Some(ToolErrorInfo::from(error)), elapsed_ms)
	}

	fn finish(
		self,
		status: ToolStatus,
		result: Option<Map<String, Value>>,
		error: Option<ToolErrorInfo>,
		elapsed_ms: u64,
	) -> ToolResponse {
		let mut correlation = Map::new();
		correlation.insert("request_id".into(), Value::String(self.request_id.to_string()));
		if let Some(id) = &self.ctx.correlation_id {
			correlation.insert("correlation_id".into(), Value::String(id.clone()));
		}

		ToolResponse {
			request_id: self.request_id,
			status,
			payload: ToolPayload {
				result,
				events: self.events,
				correlation,
			},
			metadata: ResponseMetadata {
				tool_name: self.tool_name,
				execution_time_ms: elapsed_ms,
				user_id: self.ctx.user_id,
				session_id: self.ctx.session_id,
				casefile_id: self.ctx.casefile_id,
				started_at: self.started_at,
			},
			error,
		}
	}
}

/// Failure envelope produced without running a tool
pub fn failure(tool_name: &str, ctx: &ToolContext, error: &ToolError) -> ToolResponse {
	Envelope::start(tool_name, ctx).failed(error, 0)
}
