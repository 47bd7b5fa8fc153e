//! Persistence gateway
//!
//! One async trait per entity store. Every implementation runs its calls
//! through an [`Executor`] so the configured query timeout applies uniformly,
//! and the response store can open a [`Transaction`] whose handles share one
//! commit/rollback unit.

mod executor;
pub mod memory;
mod transaction;

pub use executor::Executor;
pub use transaction::with_transaction;

use crate::domain::{Form, FormField, FormStatus, Response, ResponseAnswer, ResponseAnswerVector};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures surfaced by a store implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{operation}: {entity} {id} already exists")]
    Conflict {
        operation: &'static str,
        entity: &'static str,
        id: Uuid,
    },

    #[error("{operation}: constraint violated: {reason}")]
    Constraint {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation}: timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation}: transaction is no longer active")]
    TransactionClosed { operation: &'static str },

    #[error("transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    #[error("transactions do not nest")]
    NestedTransaction,
}

/// Gateway-wide settings shared by every store of one backend
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    /// Upper bound for every single store call
    pub query_timeout: Duration,
    /// Deleting a response also deletes its answers and their vectors
    pub cascade_delete: bool,
    /// Required embedding length; any non-empty length when unset
    pub embedding_dimensions: Option<usize>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            cascade_delete: false,
            embedding_dimensions: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFilter {
    pub status: Option<FormStatus>,
    /// Case-insensitive substring of the title
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormFieldFilter {
    pub form_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseAnswerFilter {
    pub response_id: Option<Uuid>,
    pub field_id: Option<Uuid>,
}

/// Form persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FormStore: Send + Sync {
    async fn create(&self, form: &Form) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Form>;

    async fn update(&self, form: &Form) -> StoreResult<()>;

    /// Delete a form together with its fields
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Forms matching `filter`, newest first
    async fn list(&self, filter: FormFilter) -> StoreResult<Vec<Form>>;
}

/// Form field persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FormFieldStore: Send + Sync {
    async fn create(&self, field: &FormField) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<FormField>;

    async fn update(&self, field: &FormField) -> StoreResult<()>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Fields matching `filter`, ordered by position
    async fn list(&self, filter: FormFieldFilter) -> StoreResult<Vec<FormField>>;
}

/// Response persistence and the entry point for transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn create(&self, response: &Response) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Response>;

    /// Responses of a form, latest submission first
    async fn list_by_form_id(&self, form_id: Uuid) -> StoreResult<Vec<Response>>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Open a transaction. Fails with [`StoreError::NestedTransaction`] on a
    /// store that is itself bound to a transaction.
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// Answer persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseAnswerStore: Send + Sync {
    async fn create(&self, answer: &ResponseAnswer) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<ResponseAnswer>;

    async fn list(&self, filter: ResponseAnswerFilter) -> StoreResult<Vec<ResponseAnswer>>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}

/// Embedding persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseAnswerVectorStore: Send + Sync {
    async fn create(&self, vector: &ResponseAnswerVector) -> StoreResult<()>;

    /// Insert every vector or none of them
    async fn create_bulk(&self, vectors: &[ResponseAnswerVector]) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<ResponseAnswerVector>;

    /// The answer's earliest vector, by creation time and then id
    async fn get_by_response_answer_id(
        &self,
        response_answer_id: Uuid,
    ) -> StoreResult<ResponseAnswerVector>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}

/// Store handles bound to one open transaction
#[derive(Clone)]
pub struct TxStores {
    pub responses: Arc<dyn ResponseStore>,
    pub answers: Arc<dyn ResponseAnswerStore>,
    pub vectors: Arc<dyn ResponseAnswerVectorStore>,
}

/// An open transaction
///
/// Dropping it without calling [`Transaction::commit`] rolls it back, so an
/// early return, a panic or a cancelled future never leaves staged writes
/// behind. Handles from [`Transaction::stores`] stop working once the
/// transaction ends.
#[async_trait]
pub trait Transaction: Send {
    fn stores(&self) -> TxStores;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
