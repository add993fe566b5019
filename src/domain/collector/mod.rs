//! Collector domain - collector types, provider bindings and the registry

mod entity;
mod registry;

pub use entity::{
    validate_collector_type, CollectorConfig, CollectorType, CollectorValidationError,
    ProviderBinding, MAX_COLLECTOR_TYPE_LENGTH,
};
pub use registry::{CollectorRegistry, RegistryHandle};
