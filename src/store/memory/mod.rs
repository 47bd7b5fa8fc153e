//! In-memory store backend
//!
//! Committed rows live in [`Tables`] behind one async `RwLock`. A transaction
//! buffers its writes in a private [`Staged`] set: reads inside the
//! transaction see their own writes, other readers see nothing until commit
//! applies the whole set under a single write lock. Rolling back, or dropping
//! the transaction, discards the set.

mod answers;
mod forms;
mod responses;

pub use answers::{MemoryResponseAnswerStore, MemoryResponseAnswerVectorStore};
pub use forms::{MemoryFormFieldStore, MemoryFormStore};
pub use responses::MemoryResponseStore;

use super::{Executor, GatewaySettings, StoreError, StoreResult, Transaction, TxStores};
use crate::domain::{Form, FormField, Response, ResponseAnswer, ResponseAnswerVector};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Number of committed rows per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub forms: usize,
    pub fields: usize,
    pub responses: usize,
    pub answers: usize,
    pub vectors: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) forms: HashMap<Uuid, Form>,
    pub(crate) fields: HashMap<Uuid, FormField>,
    pub(crate) responses: HashMap<Uuid, Response>,
    pub(crate) answers: HashMap<Uuid, ResponseAnswer>,
    pub(crate) vectors: HashMap<Uuid, ResponseAnswerVector>,
}

impl Tables {
    /// Remove a response, and with `cascade` its answers and their vectors
    fn remove_response(&mut self, id: Uuid, cascade: bool) {
        self.responses.remove(&id);
        if !cascade {
            return;
        }
        let answer_ids: HashSet<Uuid> = self
            .answers
            .values()
            .filter(|a| a.response_id == id)
            .map(|a| a.id)
            .collect();
        self.answers.retain(|aid, _| !answer_ids.contains(aid));
        self.vectors
            .retain(|_, v| !answer_ids.contains(&v.response_answer_id));
    }
}

/// Writes buffered by an open transaction
#[derive(Debug, Default)]
pub(crate) struct Staged {
    responses: HashMap<Uuid, Response>,
    answers: HashMap<Uuid, ResponseAnswer>,
    vectors: HashMap<Uuid, ResponseAnswerVector>,
    deleted_responses: HashSet<Uuid>,
    deleted_answers: HashSet<Uuid>,
    deleted_vectors: HashSet<Uuid>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.responses.is_empty()
            && self.answers.is_empty()
            && self.vectors.is_empty()
            && self.deleted_responses.is_empty()
            && self.deleted_answers.is_empty()
            && self.deleted_vectors.is_empty()
    }

    /// Apply to `tables` after checking nothing committed meanwhile conflicts
    fn commit_into(self, tables: &mut Tables, cascade: bool) -> StoreResult<()> {
        const OP: &str = "transaction.commit";

        let conflict = |entity: &'static str, id: Uuid| StoreError::Conflict {
            operation: OP,
            entity,
            id,
        };
        if let Some(id) = self.responses.keys().find(|id| tables.responses.contains_key(id)) {
            return Err(conflict("response", *id));
        }
        if let Some(id) = self.answers.keys().find(|id| tables.answers.contains_key(id)) {
            return Err(conflict("response answer", *id));
        }
        if let Some(id) = self.vectors.keys().find(|id| tables.vectors.contains_key(id)) {
            return Err(conflict("response answer vector", *id));
        }
        for answer in self.answers.values() {
            if !tables.fields.contains_key(&answer.field_id) {
                return Err(StoreError::Constraint {
                    operation: OP,
                    reason: format!("form field {} was removed", answer.field_id),
                });
            }
            if !self.responses.contains_key(&answer.response_id)
                && !tables.responses.contains_key(&answer.response_id)
            {
                return Err(StoreError::Constraint {
                    operation: OP,
                    reason: format!("response {} was removed", answer.response_id),
                });
            }
        }
        for vector in self.vectors.values() {
            if !self.answers.contains_key(&vector.response_answer_id)
                && !tables.answers.contains_key(&vector.response_answer_id)
            {
                return Err(StoreError::Constraint {
                    operation: OP,
                    reason: format!("response answer {} was removed", vector.response_answer_id),
                });
            }
        }

        tables.responses.extend(self.responses);
        tables.answers.extend(self.answers);
        tables.vectors.extend(self.vectors);
        for id in self.deleted_responses {
            tables.remove_response(id, cascade);
        }
        for id in self.deleted_answers {
            tables.answers.remove(&id);
        }
        for id in self.deleted_vectors {
            tables.vectors.remove(&id);
        }
        Ok(())
    }
}

/// Committed rows overlaid with a transaction's staged writes
pub(crate) struct View<'a> {
    committed: &'a Tables,
    staged: Option<&'a Staged>,
}

fn lookup<'a, T>(
    committed: &'a HashMap<Uuid, T>,
    staged: Option<(&'a HashMap<Uuid, T>, &'a HashSet<Uuid>)>,
    id: &Uuid,
) -> Option<&'a T> {
    if let Some((rows, deleted)) = staged {
        if let Some(row) = rows.get(id) {
            return Some(row);
        }
        if deleted.contains(id) {
            return None;
        }
    }
    committed.get(id)
}

fn merged<'a, T>(
    committed: &'a HashMap<Uuid, T>,
    staged: Option<(&'a HashMap<Uuid, T>, &'a HashSet<Uuid>)>,
) -> Vec<&'a T> {
    match staged {
        None => committed.values().collect(),
        Some((rows, deleted)) => committed
            .iter()
            .filter(|(id, _)| !deleted.contains(id) && !rows.contains_key(id))
            .map(|(_, row)| row)
            .chain(rows.values())
            .collect(),
    }
}

impl<'a> View<'a> {
    pub(crate) fn new(committed: &'a Tables, staged: Option<&'a Staged>) -> Self {
        Self { committed, staged }
    }

    pub(crate) fn form_exists(&self, id: Uuid) -> bool {
        self.committed.forms.contains_key(&id)
    }

    pub(crate) fn field_exists(&self, id: Uuid) -> bool {
        self.committed.fields.contains_key(&id)
    }

    pub(crate) fn response(&self, id: Uuid) -> Option<&'a Response> {
        let staged = self.staged.map(|s| (&s.responses, &s.deleted_responses));
        lookup(&self.committed.responses, staged, &id)
    }

    pub(crate) fn responses(&self) -> Vec<&'a Response> {
        let staged = self.staged.map(|s| (&s.responses, &s.deleted_responses));
        merged(&self.committed.responses, staged)
    }

    pub(crate) fn answer(&self, id: Uuid) -> Option<&'a ResponseAnswer> {
        let staged = self.staged.map(|s| (&s.answers, &s.deleted_answers));
        lookup(&self.committed.answers, staged, &id)
    }

    pub(crate) fn answers(&self) -> Vec<&'a ResponseAnswer> {
        let staged = self.staged.map(|s| (&s.answers, &s.deleted_answers));
        merged(&self.committed.answers, staged)
    }

    pub(crate) fn vector(&self, id: Uuid) -> Option<&'a ResponseAnswerVector> {
        let staged = self.staged.map(|s| (&s.vectors, &s.deleted_vectors));
        lookup(&self.committed.vectors, staged, &id)
    }

    pub(crate) fn vectors(&self) -> Vec<&'a ResponseAnswerVector> {
        let staged = self.staged.map(|s| (&s.vectors, &s.deleted_vectors));
        merged(&self.committed.vectors, staged)
    }
}

/// A single write against the response-side tables
pub(crate) enum Mutation {
    InsertResponse(Response),
    InsertAnswer(ResponseAnswer),
    InsertVectors(Vec<ResponseAnswerVector>),
    DeleteResponse(Uuid),
    DeleteAnswer(Uuid),
    DeleteVector(Uuid),
}

impl Mutation {
    /// Enforce keys and references before anything is written
    fn check(
        &self,
        view: &View<'_>,
        settings: &GatewaySettings,
        operation: &'static str,
    ) -> StoreResult<()> {
        let constraint = |reason: String| StoreError::Constraint { operation, reason };
        let conflict = |entity: &'static str, id: Uuid| StoreError::Conflict {
            operation,
            entity,
            id,
        };

        match self {
            Mutation::InsertResponse(response) => {
                if response.id.is_nil() {
                    return Err(constraint("response id must be set".to_string()));
                }
                if view.response(response.id).is_some() {
                    return Err(conflict("response", response.id));
                }
                if !view.form_exists(response.form_id) {
                    return Err(constraint(format!(
                        "form {} does not exist",
                        response.form_id
                    )));
                }
            }
            Mutation::InsertAnswer(answer) => {
                if answer.id.is_nil() {
                    return Err(constraint("response answer id must be set".to_string()));
                }
                if view.answer(answer.id).is_some() {
                    return Err(conflict("response answer", answer.id));
                }
                if view.response(answer.response_id).is_none() {
                    return Err(constraint(format!(
                        "response {} does not exist",
                        answer.response_id
                    )));
                }
                if !view.field_exists(answer.field_id) {
                    return Err(constraint(format!(
                        "form field {} does not exist",
                        answer.field_id
                    )));
                }
            }
            Mutation::InsertVectors(vectors) => {
                let mut batch = HashSet::with_capacity(vectors.len());
                for vector in vectors {
                    if vector.id.is_nil() {
                        return Err(constraint("vector id must be set".to_string()));
                    }
                    if view.vector(vector.id).is_some() || !batch.insert(vector.id) {
                        return Err(conflict("response answer vector", vector.id));
                    }
                    if view.answer(vector.response_answer_id).is_none() {
                        return Err(constraint(format!(
                            "response answer {} does not exist",
                            vector.response_answer_id
                        )));
                    }
                    if let Some(expected) = settings.embedding_dimensions {
                        if vector.dimensions() != expected {
                            return Err(constraint(format!(
                                "embedding has {} dimensions, expected {expected}",
                                vector.dimensions()
                            )));
                        }
                    }
                }
            }
            Mutation::DeleteResponse(id) => {
                if view.response(*id).is_none() {
                    return Err(StoreError::NotFound {
                        entity: "response",
                        id: *id,
                    });
                }
            }
            Mutation::DeleteAnswer(id) => {
                if view.answer(*id).is_none() {
                    return Err(StoreError::NotFound {
                        entity: "response answer",
                        id: *id,
                    });
                }
            }
            Mutation::DeleteVector(id) => {
                if view.vector(*id).is_none() {
                    return Err(StoreError::NotFound {
                        entity: "response answer vector",
                        id: *id,
                    });
                }
            }
        }
        Ok(())
    }

    fn apply(self, tables: &mut Tables, cascade: bool) {
        match self {
            Mutation::InsertResponse(r) => {
                tables.responses.insert(r.id, r);
            }
            Mutation::InsertAnswer(a) => {
                tables.answers.insert(a.id, a);
            }
            Mutation::InsertVectors(vs) => {
                tables.vectors.extend(vs.into_iter().map(|v| (v.id, v)));
            }
            Mutation::DeleteResponse(id) => tables.remove_response(id, cascade),
            Mutation::DeleteAnswer(id) => {
                tables.answers.remove(&id);
            }
            Mutation::DeleteVector(id) => {
                tables.vectors.remove(&id);
            }
        }
    }

    fn stage(self, staged: &mut Staged) {
        match self {
            Mutation::InsertResponse(r) => {
                staged.responses.insert(r.id, r);
            }
            Mutation::InsertAnswer(a) => {
                staged.answers.insert(a.id, a);
            }
            Mutation::InsertVectors(vs) => {
                staged.vectors.extend(vs.into_iter().map(|v| (v.id, v)));
            }
            Mutation::DeleteResponse(id) => {
                staged.responses.remove(&id);
                staged.deleted_responses.insert(id);
            }
            Mutation::DeleteAnswer(id) => {
                staged.answers.remove(&id);
                staged.deleted_answers.insert(id);
            }
            Mutation::DeleteVector(id) => {
                staged.vectors.remove(&id);
                staged.deleted_vectors.insert(id);
            }
        }
    }
}

const TX_ACTIVE: u8 = 0;
const TX_POISONED: u8 = 1;
const TX_CLOSED: u8 = 2;

/// State shared by a transaction and the handles bound to it
pub(crate) struct TxState {
    id: Uuid,
    status: AtomicU8,
    staged: Mutex<Staged>,
}

impl TxState {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: AtomicU8::new(TX_ACTIVE),
            staged: Mutex::new(Staged::default()),
        }
    }

    fn ensure_active(&self, operation: &'static str) -> StoreResult<()> {
        match self.status.load(Ordering::Acquire) {
            TX_ACTIVE => Ok(()),
            TX_POISONED => Err(StoreError::TransactionAborted {
                reason: "an earlier statement in this transaction failed".to_string(),
            }),
            _ => Err(StoreError::TransactionClosed { operation }),
        }
    }

    fn poison(&self) {
        let _ = self.status.compare_exchange(
            TX_ACTIVE,
            TX_POISONED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark closed, returning the previous status
    fn close(&self) -> u8 {
        self.status.swap(TX_CLOSED, Ordering::AcqRel)
    }

    fn discard(&self) {
        if let Ok(mut staged) = self.staged.try_lock() {
            *staged = Staged::default();
        }
    }
}

/// Execution context a store handle was constructed with
#[derive(Clone)]
pub(crate) enum Scope {
    Pool,
    Tx(Arc<TxState>),
}

impl Scope {
    /// Failed statements other than a missing row poison the transaction
    fn observe<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if let (Scope::Tx(tx), Err(err)) = (self, &result) {
            if !matches!(err, StoreError::NotFound { .. }) {
                tx.poison();
            }
        }
        result
    }
}

pub(crate) struct Shared {
    tables: RwLock<Tables>,
    settings: GatewaySettings,
}

impl Shared {
    /// Run a read against the view matching `scope`
    pub(crate) async fn read<R, F>(
        &self,
        exec: &Executor,
        scope: &Scope,
        operation: &'static str,
        query: F,
    ) -> StoreResult<R>
    where
        F: FnOnce(&View<'_>) -> StoreResult<R> + Send,
        R: Send,
    {
        let result = exec
            .run(operation, async {
                let tables = self.tables.read().await;
                match scope {
                    Scope::Pool => query(&View::new(&tables, None)),
                    Scope::Tx(tx) => {
                        tx.ensure_active(operation)?;
                        let staged = tx.staged.lock().await;
                        query(&View::new(&tables, Some(&*staged)))
                    }
                }
            })
            .await;
        scope.observe(result)
    }

    /// Check and apply `mutation`, or stage it when bound to a transaction
    pub(crate) async fn write(
        &self,
        exec: &Executor,
        scope: &Scope,
        operation: &'static str,
        mutation: Mutation,
    ) -> StoreResult<()> {
        let result = exec
            .run(operation, async {
                match scope {
                    Scope::Pool => {
                        let mut tables = self.tables.write().await;
                        mutation.check(&View::new(&tables, None), &self.settings, operation)?;
                        mutation.apply(&mut tables, self.settings.cascade_delete);
                    }
                    Scope::Tx(tx) => {
                        tx.ensure_active(operation)?;
                        let tables = self.tables.read().await;
                        let mut staged = tx.staged.lock().await;
                        tx.ensure_active(operation)?;
                        mutation.check(
                            &View::new(&tables, Some(&*staged)),
                            &self.settings,
                            operation,
                        )?;
                        mutation.stage(&mut staged);
                    }
                }
                Ok(())
            })
            .await;
        scope.observe(result)
    }
}

/// Shared in-memory database
///
/// Cloning is cheap; clones share the same tables.
#[derive(Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.shared.settings
    }

    pub fn forms(&self) -> Arc<MemoryFormStore> {
        Arc::new(MemoryFormStore::new(self.shared.clone()))
    }

    pub fn form_fields(&self) -> Arc<MemoryFormFieldStore> {
        Arc::new(MemoryFormFieldStore::new(self.shared.clone()))
    }

    pub fn responses(&self) -> Arc<MemoryResponseStore> {
        Arc::new(MemoryResponseStore::new(self.shared.clone(), Scope::Pool))
    }

    pub fn answers(&self) -> Arc<MemoryResponseAnswerStore> {
        Arc::new(MemoryResponseAnswerStore::new(
            self.shared.clone(),
            Scope::Pool,
        ))
    }

    pub fn vectors(&self) -> Arc<MemoryResponseAnswerVectorStore> {
        Arc::new(MemoryResponseAnswerVectorStore::new(
            self.shared.clone(),
            Scope::Pool,
        ))
    }

    /// Hold the table write lock, stalling every other call
    #[cfg(test)]
    pub(crate) async fn lock_tables(&self) -> tokio::sync::RwLockWriteGuard<'_, Tables> {
        self.shared.tables.write().await
    }

    pub async fn row_counts(&self) -> RowCounts {
        let tables = self.shared.tables.read().await;
        RowCounts {
            forms: tables.forms.len(),
            fields: tables.fields.len(),
            responses: tables.responses.len(),
            answers: tables.answers.len(),
            vectors: tables.vectors.len(),
        }
    }
}

/// Transaction over a [`MemoryDatabase`]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    state: Arc<TxState>,
    exec: Executor,
}

impl MemoryTransaction {
    fn new(shared: Arc<Shared>) -> Self {
        let exec = Executor::new(shared.settings.query_timeout);
        let state = Arc::new(TxState::new());
        tracing::debug!("Transaction {} started", state.id);
        Self {
            shared,
            state,
            exec,
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn stores(&self) -> TxStores {
        let scope = Scope::Tx(self.state.clone());
        TxStores {
            responses: Arc::new(MemoryResponseStore::new(
                self.shared.clone(),
                scope.clone(),
            )),
            answers: Arc::new(MemoryResponseAnswerStore::new(
                self.shared.clone(),
                scope.clone(),
            )),
            vectors: Arc::new(MemoryResponseAnswerVectorStore::new(
                self.shared.clone(),
                scope,
            )),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        match self.state.close() {
            TX_ACTIVE => {}
            TX_POISONED => {
                self.state.discard();
                tracing::warn!("Transaction {} rolled back at commit", self.state.id);
                return Err(StoreError::TransactionAborted {
                    reason: "an earlier statement in this transaction failed".to_string(),
                });
            }
            _ => {
                return Err(StoreError::TransactionClosed {
                    operation: "transaction.commit",
                })
            }
        }

        let shared = &self.shared;
        let state = &self.state;
        let result = self
            .exec
            .run("transaction.commit", async {
                let mut tables = shared.tables.write().await;
                let staged = std::mem::take(&mut *state.staged.lock().await);
                if staged.is_empty() {
                    return Ok(());
                }
                staged.commit_into(&mut tables, shared.settings.cascade_delete)
            })
            .await;

        match &result {
            Ok(()) => tracing::debug!("Transaction {} committed", self.state.id),
            Err(err) => {
                self.state.discard();
                tracing::warn!("Transaction {} failed to commit: {err}", self.state.id);
            }
        }
        result
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        if self.state.close() == TX_CLOSED {
            return Err(StoreError::TransactionClosed {
                operation: "transaction.rollback",
            });
        }
        self.state.discard();
        tracing::debug!("Transaction {} rolled back", self.state.id);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.state.close() != TX_CLOSED {
            self.state.discard();
            tracing::debug!("Transaction {} rolled back on drop", self.state.id);
        }
    }
}
