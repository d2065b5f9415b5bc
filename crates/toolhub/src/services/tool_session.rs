// Tool session service
//
// Tracks agent tool sessions. Unlike the casefile service, its methods are
// declared in code next to the implementation.

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Service, ServiceError, decode, encode};
use crate::registry::methods::MethodRegistration;
use crate::registry::types::{
	Capability, Classification, Complexity, Domain, IntegrationTier, Maturity, Subdomain,
};

const SERVICE_NAME: &str = "ToolSessionService";
const MODULE_PATH: &str = "services::tool_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Active,
	Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolSession {
	pub id: String,
	pub user_id: String,
	pub casefile_id: Option<String>,
	pub status: SessionStatus,
	pub created_at: String,
	pub closed_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionPayload {
	/// Casefile the session works on
	pub casefile_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionRequest {
	pub user_id: String,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	#[serde(default)]
	pub payload: CreateSessionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionPayload {
	#[schemars(length(min = 1))]
	pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionRequest {
	pub user_id: String,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub payload: SessionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionResponse {
	pub session: ToolSession,
}

#[derive(Debug, Default)]
pub struct ToolSessionService {
	sessions: RwLock<IndexMap<String, ToolSession>>,
}

impl ToolSessionService {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn create_session(
		&self,
		request: CreateSessionRequest,
	) -> Result<SessionResponse, ServiceError> {
		let session = ToolSession {
			id: format!("ts_{}", Uuid::new_v4().simple()),
			user_id: request.user_id,
			casefile_id: request.payload.casefile_id.or(request.casefile_id),
			status: SessionStatus::Active,
			created_at: Utc::now().to_rfc3339(),
			closed_at: None,
		};

		self
			.sessions
			.write()
			.await
			.insert(session.id.clone(), session.clone());
		Ok(SessionResponse { session })
	}

	pub async fn get_session(&self, request: SessionRequest) -> Result<SessionResponse, ServiceError> {
		let id = request.payload.session_id;
		let session = self
			.sessions
			.read()
			.await
			.get(&id)
			.filter(|s| s.user_id == request.user_id)
			.cloned()
			.ok_or_else(|| ServiceError::not_found("session", id))?;
		Ok(SessionResponse { session })
	}

	pub async fn close_session(&self, request: SessionRequest) -> Result<SessionResponse, ServiceError> {
		let id = request.payload.session_id;
		let mut sessions = self.sessions.write().await;
		let session = sessions
			.get_mut(&id)
			.filter(|s| s.user_id == request.user_id)
			.ok_or_else(|| ServiceError::not_found("session", id.clone()))?;

		if session.status == SessionStatus::Active {
			session.status = SessionStatus::Closed;
			session.closed_at = Some(Utc::now().to_rfc3339());
		}
		Ok(SessionResponse {
			session: session.clone(),
		})
	}
}

fn classification(capability: Capability) -> Classification {
	Classification {
		domain: Domain::Workspace,
		subdomain: Subdomain::ToolSession,
		capability,
		complexity: Complexity::Atomic,
		maturity: Maturity::Stable,
		integration_tier: IntegrationTier::Internal,
	}
}

#[async_trait]
impl Service for ToolSessionService {
	fn name(&self) -> &'static str {
		SERVICE_NAME
	}

	fn module_path(&self) -> &'static str {
		MODULE_PATH
	}

	async fn call(&self, method: &str, request: Value) -> Result<Value, ServiceError> {
		match method {
			"create_session" => encode(&self.create_session(decode(request)?).await?),
			"get_session" => encode(&self.get_session(decode(request)?).await?),
			"close_session" => encode(&self.close_session(decode(request)?).await?),
			other => Err(ServiceError::MethodNotFound(other.to_string())),
		}
	}

	fn method_registrations(&self) -> Vec<MethodRegistration> {
		vec![
			MethodRegistration::new("create_session", "Open a new tool session")
				.service(SERVICE_NAME, MODULE_PATH)
				.classification(classification(Capability::Create))
				.requires_auth(true)
				.request::<CreateSessionRequest>()
				.response::<SessionResponse>(),
			MethodRegistration::new("get_session", "Fetch a tool session owned by the caller")
				.service(SERVICE_NAME, MODULE_PATH)
				.classification(classification(Capability::Read))
				.requires_auth(true)
				.request::<SessionRequest>()
				.response::<SessionResponse>(),
			MethodRegistration::new("close_session", "Close an active tool session")
				.service(SERVICE_NAME, MODULE_PATH)
				.classification(classification(Capability::Update))
				.requires_auth(true)
				.timeout_seconds(10)
				.request::<SessionRequest>()
				.response::<SessionResponse>(),
		]
	}
}
