//! Engine-level error taxonomy. Every variant is recoverable: sessions turn
//! them into field errors or notices rather than aborting.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::enrichment::LookupError;
use crate::schema::ValidationErrors;

#[derive(Error, Debug)]
pub enum FormError {
    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not save record: {0}")]
    Persistence(String),

    #[error("A save is already in progress")]
    SubmitInFlight,

    #[error("No signed-in user")]
    Unauthenticated,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field is not a flag: {0}")]
    NotAFlag(String),
}

impl FormError {
    /// Worth offering the same action again without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FormError::Network(_) | FormError::Persistence(_) | FormError::SubmitInFlight
        )
    }
}

impl From<DatabaseError> for FormError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                FormError::NotFound(format!("{entity_type} {id}"))
            }
            e if e.is_transient() => FormError::Network(e.to_string()),
            e => FormError::Persistence(e.to_string()),
        }
    }
}

impl From<LookupError> for FormError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(code) => FormError::NotFound(format!("postal code {code}")),
            e => FormError::Network(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for FormError {
    fn from(errors: ValidationErrors) -> Self {
        FormError::Validation(errors)
    }
}
