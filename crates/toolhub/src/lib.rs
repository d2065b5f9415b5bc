// toolhub: dual-schema Method/Tool registry
//
// Business operations ("methods") are exposed to the agent execution layer
// through independently declared "tools". This crate owns:
// - the schema descriptors shared by both layers
// - code and YAML registration paths for methods and tools
// - the frozen `Registry` value consumed at runtime
// - the validation pipeline that keeps the two schemas consistent

pub mod config;
pub mod registry;
pub mod services;
pub mod validation;

pub use registry::{Registry, RegistryBuilder, RegistryError};
pub use validation::{LoadResult, LoaderError, RegistryLoader, ValidationMode};
