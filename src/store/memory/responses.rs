use super::{MemoryTransaction, Mutation, Scope, Shared};
use crate::domain::Response;
use crate::store::{Executor, ResponseStore, StoreError, StoreResult, Transaction};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Response table, bound either to the pool or to one transaction
pub struct MemoryResponseStore {
    shared: Arc<Shared>,
    exec: Executor,
    scope: Scope,
}

impl MemoryResponseStore {
    pub(crate) fn new(shared: Arc<Shared>, scope: Scope) -> Self {
        let exec = Executor::new(shared.settings.query_timeout);
        Self {
            shared,
            exec,
            scope,
        }
    }
}

#[async_trait]
impl ResponseStore for MemoryResponseStore {
    async fn create(&self, response: &Response) -> StoreResult<()> {
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "responses.create",
                Mutation::InsertResponse(response.clone()),
            )
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Response> {
        self.shared
            .read(&self.exec, &self.scope, "responses.get_by_id", |view| {
                view.response(id).cloned().ok_or(StoreError::NotFound {
                    entity: "response",
                    id,
                })
            })
            .await
    }

    async fn list_by_form_id(&self, form_id: Uuid) -> StoreResult<Vec<Response>> {
        self.shared
            .read(&self.exec, &self.scope, "responses.list_by_form_id", |view| {
                let mut responses: Vec<Response> = view
                    .responses()
                    .into_iter()
                    .filter(|r| r.form_id == form_id)
                    .cloned()
                    .collect();
                responses.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
                Ok(responses)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "responses.delete",
                Mutation::DeleteResponse(id),
            )
            .await
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        if let Scope::Tx(_) = self.scope {
            return Err(StoreError::NestedTransaction);
        }
        let shared = self.shared.clone();
        self.exec
            .run("transaction.begin", async move {
                Ok(Box::new(MemoryTransaction::new(shared)) as Box<dyn Transaction>)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Form, FormStatus};
    use crate::store::memory::MemoryDatabase;
    use crate::store::{FormStore, GatewaySettings};
    use chrono::{Duration, Utc};

    async fn db_with_form() -> (MemoryDatabase, Uuid) {
        let db = MemoryDatabase::new(GatewaySettings::default());
        let mut form = Form::new("Survey", "About you");
        form.id = Uuid::new_v4();
        form.status = FormStatus::Published;
        db.forms().create(&form).await.unwrap();
        (db, form.id)
    }

    fn response(form_id: Uuid, minutes_ago: i64) -> Response {
        let mut r = Response::new(form_id).with_respondent("email", "a@b.c");
        r.id = Uuid::new_v4();
        r.submitted_at = Utc::now() - Duration::minutes(minutes_ago);
        r
    }

    #[tokio::test]
    async fn test_create_requires_id() {
        let (db, form_id) = db_with_form().await;
        let r = Response::new(form_id).with_respondent("email", "a@b.c");
        let err = db.responses().create(&r).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));
    }

    #[tokio::test]
    async fn test_create_requires_existing_form() {
        let (db, _) = db_with_form().await;
        let err = db
            .responses()
            .create(&response(Uuid::new_v4(), 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let (db, form_id) = db_with_form().await;
        let r = response(form_id, 0);
        db.responses().create(&r).await.unwrap();
        assert_eq!(
            db.responses().create(&r).await,
            Err(StoreError::Conflict {
                operation: "responses.create",
                entity: "response",
                id: r.id,
            })
        );
    }

    #[tokio::test]
    async fn test_list_is_latest_first_and_scoped_to_form() {
        let (db, form_id) = db_with_form().await;
        let mut other = Form::new("Other", "Other form");
        other.id = Uuid::new_v4();
        db.forms().create(&other).await.unwrap();

        let old = response(form_id, 30);
        let new = response(form_id, 1);
        let elsewhere = response(other.id, 0);
        for r in [&old, &new, &elsewhere] {
            db.responses().create(r).await.unwrap();
        }

        let listed = db.responses().list_by_form_id(form_id).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (db, _) = db_with_form().await;
        let id = Uuid::new_v4();
        assert_eq!(
            db.responses().delete(id).await,
            Err(StoreError::NotFound {
                entity: "response",
                id
            })
        );
    }
}
