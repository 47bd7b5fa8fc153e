//! Error types for the submission pipeline
//!
//! Validation failures, business-rule rejections and persistence failures are
//! all surfaced through [`Error`]. Callers that need to branch on the failure
//! (for example to pick an HTTP status) should match on [`Error::kind`].

use crate::domain::FormStatus;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias used by the services
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    FormNotPublished,
    FormClosed,
    MissingRequiredField,
    PersistenceFailure,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::FormNotPublished => "form_not_published",
            Self::FormClosed => "form_closed",
            Self::MissingRequiredField => "missing_required_field",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

/// Errors returned by the form and submission services
#[derive(Debug, Error)]
pub enum Error {
    /// Structural or domain validation failed; nothing was written
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// The referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Submissions are only accepted by published forms
    #[error("form {form_id} is not published (status: {status})")]
    FormNotPublished { form_id: Uuid, status: FormStatus },

    /// Closed forms reject schema changes
    #[error("form {form_id} is closed")]
    FormClosed { form_id: Uuid },

    /// Required fields without an answer in the submission
    #[error("missing answers for {} required field(s)", field_ids.len())]
    MissingRequiredField { field_ids: Vec<Uuid> },

    /// The store failed; any open transaction was rolled back
    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::FormNotPublished { .. } => ErrorKind::FormNotPublished,
            Error::FormClosed { .. } => ErrorKind::FormClosed,
            Error::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Error::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => Error::NotFound { entity, id },
            other => Error::Persistence(other),
        }
    }
}

/// Domain validation failures, one per rule
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("form title is required")]
    MissingTitle,

    #[error("form description is required")]
    MissingDescription,

    #[error("field order must be greater than zero, got {0}")]
    InvalidFieldOrder(i32),

    #[error("field type `{0}` requires options but none were provided")]
    MissingOptions(&'static str),

    #[error("field is not attached to a form")]
    MissingFieldFormId,

    #[error("response form id is missing")]
    MissingFormId,

    #[error("respondent info is missing")]
    MissingRespondent,

    #[error("answer field id is missing")]
    MissingFieldId,

    #[error("answer value has a blank language key")]
    BlankValueKey,

    #[error("vector response answer id is missing")]
    MissingResponseAnswerId,

    #[error("embedding is missing")]
    MissingEmbedding,

    #[error("embedding component {index} is not a finite number")]
    NonFiniteEmbedding { index: usize },

    #[error("form {form_id} has no fields")]
    FormHasNoFields { form_id: Uuid },

    #[error("field {field_id} does not belong to form {form_id}")]
    FieldNotOnForm { field_id: Uuid, form_id: Uuid },

    #[error("field {field_id} is answered more than once")]
    DuplicateAnswer { field_id: Uuid },

    #[error("vector references answer {answer_id} outside this submission")]
    VectorAnswerNotInSubmission { answer_id: Uuid },

    #[error("{id_kind} id is required")]
    MissingId { id_kind: &'static str },

    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validation_error_maps_to_invalid_input() {
        let err: Error = ValidationError::MissingRespondent.into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("respondent"));
    }

    #[test]
    fn test_store_not_found_becomes_not_found() {
        let id = Uuid::new_v4();
        let err: Error = StoreError::NotFound { entity: "form", id }.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), format!("form {id} not found"));
    }

    #[test]
    fn test_store_timeout_becomes_persistence_failure() {
        let err: Error = StoreError::Timeout {
            operation: "responses.create",
            after: Duration::from_millis(5),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(err.to_string().contains("responses.create"));
    }

    #[test]
    fn test_missing_required_field_message_counts_fields() {
        let err = Error::MissingRequiredField {
            field_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        assert_eq!(err.to_string(), "missing answers for 2 required field(s)");
    }

    #[test]
    fn test_kind_labels_are_snake_case() {
        assert_eq!(ErrorKind::FormNotPublished.label(), "form_not_published");
        assert_eq!(ErrorKind::PersistenceFailure.label(), "persistence_failure");
    }
}
