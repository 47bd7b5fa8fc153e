//! Scoped transaction helper

use super::{ResponseStore, StoreError, TxStores};
use std::future::Future;

/// Run `body` inside one transaction opened on `store`
///
/// Commits when `body` returns `Ok`, rolls back and hands the error back
/// unchanged otherwise. If the returned future is dropped midway the
/// transaction guard is dropped with it and rolls back.
pub async fn with_transaction<T, E, F, Fut>(store: &dyn ResponseStore, body: F) -> Result<T, E>
where
    F: FnOnce(TxStores) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    let tx = store.begin().await?;

    match body(tx.stores()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldType, Form, FormField, FormStatus, Response, ResponseAnswer};
    use crate::store::memory::MemoryDatabase;
    use crate::store::{FormFieldStore, FormStore, GatewaySettings, StoreResult};
    use uuid::Uuid;

    async fn seeded() -> (MemoryDatabase, Uuid, Uuid) {
        let db = MemoryDatabase::new(GatewaySettings::default());
        let mut form = Form::new("Survey", "About you");
        form.id = Uuid::new_v4();
        form.status = FormStatus::Published;
        db.forms().create(&form).await.unwrap();

        let mut field = FormField::new(form.id, FieldType::Text, 1);
        field.id = Uuid::new_v4();
        db.form_fields().create(&field).await.unwrap();
        (db, form.id, field.id)
    }

    fn response_for(form_id: Uuid) -> Response {
        let mut response = Response::new(form_id).with_respondent("email", "a@b.c");
        response.id = Uuid::new_v4();
        response
    }

    #[tokio::test]
    async fn test_commits_when_body_succeeds() {
        let (db, form_id, _) = seeded().await;
        let response = response_for(form_id);

        let result: StoreResult<Uuid> = with_transaction(&*db.responses(), |tx| async move {
            tx.responses.create(&response).await?;
            Ok(response.id)
        })
        .await;

        let id = result.unwrap();
        assert!(db.responses().get_by_id(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rolls_back_when_body_fails() {
        let (db, form_id, field_id) = seeded().await;
        let response = response_for(form_id);
        let response_id = response.id;

        let result: StoreResult<()> = with_transaction(&*db.responses(), |tx| async move {
            tx.responses.create(&response).await?;
            let mut answer = ResponseAnswer::new(field_id);
            answer.id = Uuid::new_v4();
            // references a response that does not exist
            answer.response_id = Uuid::new_v4();
            tx.answers.create(&answer).await?;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(StoreError::Constraint { .. })));
        assert_eq!(
            db.responses().get_by_id(response_id).await,
            Err(StoreError::NotFound {
                entity: "response",
                id: response_id
            })
        );
        assert_eq!(db.row_counts().await.responses, 0);
    }

    #[tokio::test]
    async fn test_handles_fail_after_commit() {
        let (db, form_id, _) = seeded().await;
        let leaked = with_transaction(&*db.responses(), |tx| async move {
            Ok::<_, StoreError>(tx)
        })
        .await
        .unwrap();

        let err = leaked.responses.create(&response_for(form_id)).await;
        assert!(matches!(err, Err(StoreError::TransactionClosed { .. })));
    }

    #[tokio::test]
    async fn test_nested_transaction_is_refused() {
        let (db, _, _) = seeded().await;
        let result: StoreResult<()> = with_transaction(&*db.responses(), |tx| async move {
            tx.responses.begin().await?;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err(), StoreError::NestedTransaction);
    }
}
