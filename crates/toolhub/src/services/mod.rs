// Service boundary
//
// Business services sit behind a name-keyed factory map. Generated tools
// resolve `Service.method` references through it, so only references to an
// unregistered service fail at runtime.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::registry::inventory::ModelCatalog;
use crate::registry::methods::MethodRegistration;

pub mod casefile;
pub mod tool_session;

pub use casefile::CasefileService;
pub use tool_session::ToolSessionService;

/// Errors raised by service implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
	#[error("method '{0}' is not implemented by this service")]
	MethodNotFound(String),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("{kind} '{id}' not found")]
	NotFound { kind: &'static str, id: String },

	#[error("{0}")]
	Internal(String),
}

impl ServiceError {
	pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
		Self::NotFound { kind, id: id.into() }
	}
}

/// A business service reachable from generated tools
#[async_trait]
pub trait Service: Send + Sync {
	/// Registered service name, e.g. `CasefileService`
	fn name(&self) -> &'static str;

	/// Module path of the service source, e.g. `services::casefile`
	fn module_path(&self) -> &'static str;

	/// Invoke `method` with a request object `{user_id, session_id, casefile_id, payload}`
	async fn call(&self, method: &str, request: Value) -> Result<Value, ServiceError>;

	/// Request and response models referenced from the method inventory
	fn register_models(&self, _catalog: &mut ModelCatalog) {}

	/// Methods declared in code rather than in the inventory
	fn method_registrations(&self) -> Vec<MethodRegistration> {
		Vec::new()
	}
}

/// Decode a service request into its typed form
pub fn decode<T: DeserializeOwned>(request: Value) -> Result<T, ServiceError> {
	serde_json::from_value(request).map_err(|e| ServiceError::InvalidRequest(e.to_string()))
}

/// Encode a typed service response
pub fn encode<T: Serialize>(response: &T) -> Result<Value, ServiceError> {
	serde_json::to_value(response).map_err(|e| ServiceError::Internal(e.to_string()))
}

type ServiceFactory = Arc<dyn Fn() -> Arc<dyn Service> + Send + Sync>;

/// Factory entry for one service
pub struct ServiceEntry {
	pub name: String,
	pub module_path: String,
	factory: ServiceFactory,
}

impl fmt::Debug for ServiceEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceEntry")
			.field("name", &self.name)
			.field("module_path", &self.module_path)
			.finish_non_exhaustive()
	}
}

/// Name-keyed service factory map
#[derive(Default, Debug)]
pub struct ServiceRegistry {
	entries: IndexMap<String, ServiceEntry>,
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry holding the bundled services
	pub fn with_defaults() -> Self {
		let mut services = Self::new();
		services.register_shared(Arc::new(CasefileService::new()));
		services.register_shared(Arc::new(ToolSessionService::new()));
		services
	}

	/// Register a factory producing a fresh instance per call
	pub fn register<F>(&mut self, name: impl Into<String>, module_path: impl Into<String>, factory: F)
	where
		F: Fn() -> Arc<dyn Service> + Send + Sync + 'static,
	{
		let name = name.into();
		self.entries.insert(
			name.clone(),
			ServiceEntry {
				name,
				module_path: module_path.into(),
				factory: Arc::new(factory),
			},
		);
	}

	/// Register a single instance shared by every call
	pub fn register_shared(&mut self, service: Arc<dyn Service>) {
		let name = service.name();
		let module_path = service.module_path();
		self.register(name, module_path, move || service.clone());
	}

	pub fn instantiate(&self, name: &str) -> Option<Arc<dyn Service>> {
		self.entries.get(name).map(|entry| (entry.factory)())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.entries.contains_key(name)
	}

	pub fn entries(&self) -> impl Iterator<Item = &ServiceEntry> {
		self.entries.values()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Collect the models every service exposes to the inventory
	pub fn model_catalog(&self) -> ModelCatalog {
		let mut catalog = ModelCatalog::new();
		for entry in self.entries.values() {
			(entry.factory)().register_models(&mut catalog);
		}
		catalog
	}

	/// Collect the code-declared methods of every service
	pub fn method_registrations(&self) -> Vec<MethodRegistration> {
		self
			.entries
			.values()
			.flat_map(|entry| (entry.factory)().method_registrations())
			.collect()
	}
}
