// Casefile service
//
// In-memory casefile store. Its methods are declared in the YAML inventory;
// the service only contributes the request/response models they reference.

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Service, ServiceError, decode, encode};
use crate::registry::inventory::ModelCatalog;

const SERVICE_NAME: &str = "CasefileService";
const MODULE_PATH: &str = "services::casefile";

/// A casefile grouping the work of one investigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Casefile {
	pub id: String,
	pub title: String,
	pub description: Option<String>,
	pub owner_id: String,
	pub tags: Vec<String>,
	pub session_ids: Vec<String>,
	/// RFC 3339 creation time
	pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateCasefilePayload {
	/// Casefile title
	#[schemars(length(min = 1, max = 200))]
	pub title: String,
	/// Free-form summary
	pub description: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateCasefileRequest {
	pub user_id: String,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub payload: CreateCasefilePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateCasefileResponse {
	pub casefile: Casefile,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetCasefilePayload {
	pub casefile_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetCasefileRequest {
	pub user_id: String,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub payload: GetCasefilePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetCasefileResponse {
	pub casefile: Casefile,
}

fn default_limit() -> i64 {
	25
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListCasefilesPayload {
	/// Maximum number of casefiles returned
	#[serde(default = "default_limit")]
	#[schemars(range(min = 1, max = 100))]
	pub limit: i64,
	/// Only casefiles carrying this tag
	pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListCasefilesRequest {
	pub user_id: String,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub payload: ListCasefilesPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListCasefilesResponse {
	pub casefiles: Vec<Casefile>,
	pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddSessionPayload {
	pub casefile_id: String,
	pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddSessionToCasefileRequest {
	pub user_id: String,
	pub session_id: Option<String>,
	pub casefile_id: Option<String>,
	pub payload: AddSessionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddSessionToCasefileResponse {
	pub casefile: Casefile,
}

#[derive(Debug, Default)]
pub struct CasefileService {
	casefiles: RwLock<IndexMap<String, Casefile>>,
}

impl CasefileService {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn create_casefile(
		&self,
		request: CreateCasefileRequest,
	) -> Result<CreateCasefileResponse, ServiceError> {
		let title = request.payload.title.trim();
		if title.is_empty() {
			return Err(ServiceError::InvalidRequest("title must not be blank".into()));
		}

		let casefile = Casefile {
			id: format!("cf_{}", Uuid::new_v4().simple()),
			title: title.to_string(),
			description: request.payload.description,
			owner_id: request.user_id,
			tags: request.payload.tags,
			session_ids: request.session_id.into_iter().collect(),
			created_at: Utc::now().to_rfc3339(),
		};

		self
			.casefiles
			.write()
			.await
			.insert(casefile.id.clone(), casefile.clone());
		Ok(CreateCasefileResponse { casefile })
	}

	pub async fn get_casefile(
		&self,
		request: GetCasefileRequest,
	) -> Result<GetCasefileResponse, ServiceError> {
		let id = request.payload.casefile_id;
		let casefile = self
			.casefiles
			.read()
			.await
			.get(&id)
			.cloned()
			.ok_or_else(|| ServiceError::not_found("casefile", id))?;
		Ok(GetCasefileResponse { casefile })
	}

	pub async fn list_casefiles(
		&self,
		request: ListCasefilesRequest,
	) -> Result<ListCasefilesResponse, ServiceError> {
		let limit = usize::try_from(request.payload.limit.max(0)).unwrap_or_default();
		let tag = request.payload.tag;

		let casefiles = self.casefiles.read().await;
		let matching: Vec<&Casefile> = casefiles
			.values()
			.filter(|c| c.owner_id == request.user_id)
			.filter(|c| tag.as_ref().is_none_or(|t| c.tags.contains(t)))
			.collect();

		Ok(ListCasefilesResponse {
			total: matching.len(),
			casefiles: matching.into_iter().take(limit).cloned().collect(),
		})
	}

	pub async fn add_session_to_casefile(
		&self,
		request: AddSessionToCasefileRequest,
	) -> Result<AddSessionToCasefileResponse, ServiceError> {
		let AddSessionPayload {
			casefile_id,
			session_id,
		} = request.payload;

		let mut casefiles = self.casefiles.write().await;
		let casefile = casefiles
			.get_mut(&casefile_id)
			.ok_or_else(|| ServiceError::not_found("casefile", casefile_id.clone()))?;
		if !casefile.session_ids.contains(&session_id) {
			casefile.session_ids.push(session_id);
		}
		Ok(AddSessionToCasefileResponse {
			casefile: casefile.clone(),
		})
	}
}

#[async_trait]
impl Service for CasefileService {
	fn name(&self) -> &'static str {
		SERVICE_NAME
	}

	fn module_path(&self) -> &'static str {
		MODULE_PATH
	}

	async fn call(&self, method: &str, request: Value) -> Result<Value, ServiceError> {
		match method {
			"create_casefile" => encode(&self.create_casefile(decode(request)?).await?),
			"get_casefile" => encode(&self.get_casefile(decode(request)?).await?),
			"list_casefiles" => encode(&self.list_casefiles(decode(request)?).await?),
			"add_session_to_casefile" => encode(&self.add_session_to_casefile(decode(request)?).await?),
			other => Err(ServiceError::MethodNotFound(other.to_string())),
		}
	}

	fn register_models(&self, catalog: &mut ModelCatalog) {
		catalog.register::<CreateCasefileRequest>(MODULE_PATH);
		catalog.register::<CreateCasefileResponse>(MODULE_PATH);
		catalog.register::<GetCasefileRequest>(MODULE_PATH);
		catalog.register::<GetCasefileResponse>(MODULE_PATH);
		catalog.register::<ListCasefilesRequest>(MODULE_PATH);
		catalog.register::<ListCasefilesResponse>(MODULE_PATH);
		catalog.register::<AddSessionToCasefileRequest>(MODULE_PATH);
		catalog.register::<AddSessionToCasefileResponse>(MODULE_PATH);
	}
}
