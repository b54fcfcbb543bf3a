//! ActiveRecord-style models over a REST backend.
//! Records track changes against their last sync, validate their fields and
//! persist association graphs through an injected HTTP client.

pub mod error;
pub mod logging;
pub mod model;
pub mod registry;
pub mod service;
pub mod sync;
pub mod validation;

pub use error::{AssociationError, RecordError, RecordResult};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingConfig,
    LoggingError,
};
pub use model::definition::{
    AssociationDef, AssociationKind, AssociationOptions, ErrorMessage, MessageContext, ModelDef,
    ModelDefBuilder,
};
pub use model::filter::Filter;
pub use model::record::{Change, ChangeSet, Record, RecordOptions};
pub use registry::{ModelRegistry, RegistryError};
pub use service::record_service::{Collection, RecordService};
pub use sync::http::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
pub use sync::request::{Operation, SyncOptions};
pub use validation::{ErrorMap, FieldErrors};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
