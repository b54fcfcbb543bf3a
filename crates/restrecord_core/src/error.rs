//! Record lifecycle errors.
//!
//! # Invariants
//! - Transport failures are carried unchanged.
//! - Malformed response shapes use fixed, stable descriptions.

use crate::registry::RegistryError;
use crate::sync::http::TransportError;
use crate::validation::ErrorMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RecordResult<T> = Result<T, RecordError>;

/// Response body was not an object where a single record was expected.
pub const INVALID_RECORD_RESPONSE: &str = "Not a valid response type";
/// Response body was neither an array nor a paginated envelope.
pub const INVALID_COLLECTION_RESPONSE: &str = "Not a valid response, expecting an array";

/// Errors raised by association helpers on a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationError {
    /// The related record has not been persisted yet.
    NewRecord,
    /// The record to remove is not a member of the collection.
    NotFound,
    UnknownAssociation { model: String, association: String },
    /// Declared with the other kind (belongs-to vs has-many).
    WrongKind { model: String, association: String },
    /// A belongs-to association declared without a foreign-key name.
    MissingKey { model: String, association: String },
}

impl Display for AssociationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewRecord => write!(f, "can't be new"),
            Self::NotFound => write!(f, "model not found"),
            Self::UnknownAssociation { model, association } => {
                write!(f, "model `{model}` declares no association `{association}`")
            }
            Self::WrongKind { model, association } => write!(
                f,
                "association `{association}` of model `{model}` has a different kind"
            ),
            Self::MissingKey { model, association } => write!(
                f,
                "association `{association}` of model `{model}` has no foreign key"
            ),
        }
    }
}

impl Error for AssociationError {}

#[derive(Debug)]
pub enum RecordError {
    /// Validation failed; carries the record's error map.
    Validation(ErrorMap),
    /// The injected HTTP client failed.
    Transport(TransportError),
    /// The response body had the wrong shape.
    InvalidResponse(&'static str),
    /// Neither a URL override nor a URL root is available.
    MissingUrl { model: String },
    Registry(RegistryError),
    Association(AssociationError),
    /// A belongs-to parent was still new after its own save.
    AssociationNotPersisted { association: String },
    /// A has-many child model does not declare the inverse belongs-to.
    MissingInverseAssociation { model: String, parent: String },
    /// Children need a foreign key but the parent has no identifier yet.
    ParentNotPersisted { model: String },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(errors) => {
                write!(f, "validation failed for fields: ")?;
                let fields = errors.keys().map(String::as_str).collect::<Vec<_>>();
                write!(f, "{}", fields.join(", "))
            }
            Self::Transport(err) => write!(f, "{err}"),
            Self::InvalidResponse(message) => write!(f, "{message}"),
            Self::MissingUrl { model } => write!(
                f,
                "model `{model}` has no url: set a url root or a per-record url"
            ),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Association(err) => write!(f, "{err}"),
            Self::AssociationNotPersisted { association } => {
                write!(f, "associated `{association}` record was not persisted")
            }
            Self::MissingInverseAssociation { model, parent } => write!(
                f,
                "model `{model}` must declare a belongs-to association to `{parent}`"
            ),
            Self::ParentNotPersisted { model } => write!(
                f,
                "`{model}` has no identifier after saving, children cannot reference it"
            ),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Association(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for RecordError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<RegistryError> for RecordError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<AssociationError> for RecordError {
    fn from(value: AssociationError) -> Self {
        Self::Association(value)
    }
}
