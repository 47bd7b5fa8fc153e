use super::{Mutation, Scope, Shared};
use crate::domain::{ResponseAnswer, ResponseAnswerVector};
use crate::store::{
    Executor, ResponseAnswerFilter, ResponseAnswerStore, ResponseAnswerVectorStore, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct MemoryResponseAnswerStore {
    shared: Arc<Shared>,
    exec: Executor,
    scope: Scope,
}

impl MemoryResponseAnswerStore {
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
impl ResponseAnswerStore for MemoryResponseAnswerStore {
    async fn create(&self, answer: &ResponseAnswer) -> StoreResult<()> {
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "answers.create",
                Mutation::InsertAnswer(answer.clone()),
            )
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<ResponseAnswer> {
        self.shared
            .read(&self.exec, &self.scope, "answers.get_by_id", |view| {
                view.answer(id).cloned().ok_or(StoreError::NotFound {
                    entity: "response answer",
                    id,
                })
            })
            .await
    }

    async fn list(&self, filter: ResponseAnswerFilter) -> StoreResult<Vec<ResponseAnswer>> {
        self.shared
            .read(&self.exec, &self.scope, "answers.list", |view| {
                let mut answers: Vec<ResponseAnswer> = view
                    .answers()
                    .into_iter()
                    .filter(|a| filter.response_id.is_none_or(|id| a.response_id == id))
                    .filter(|a| filter.field_id.is_none_or(|id| a.field_id == id))
                    .cloned()
                    .collect();
                answers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                Ok(answers)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "answers.delete",
                Mutation::DeleteAnswer(id),
            )
            .await
    }
}

pub struct MemoryResponseAnswerVectorStore {
    shared: Arc<Shared>,
    exec: Executor,
    scope: Scope,
}

impl MemoryResponseAnswerVectorStore {
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
impl ResponseAnswerVectorStore for MemoryResponseAnswerVectorStore {
    async fn create(&self, vector: &ResponseAnswerVector) -> StoreResult<()> {
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "vectors.create",
                Mutation::InsertVectors(vec![vector.clone()]),
            )
            .await
    }

    async fn create_bulk(&self, vectors: &[ResponseAnswerVector]) -> StoreResult<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "vectors.create_bulk",
                Mutation::InsertVectors(vectors.to_vec()),
            )
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<ResponseAnswerVector> {
        self.shared
            .read(&self.exec, &self.scope, "vectors.get_by_id", |view| {
                view.vector(id).cloned().ok_or(StoreError::NotFound {
                    entity: "response answer vector",
                    id,
                })
            })
            .await
    }

    async fn get_by_response_answer_id(
        &self,
        response_answer_id: Uuid,
    ) -> StoreResult<ResponseAnswerVector> {
        self.shared
            .read(
                &self.exec,
                &self.scope,
                "vectors.get_by_response_answer_id",
                |view| {
                    view.vectors()
                        .into_iter()
                        .filter(|v| v.response_answer_id == response_answer_id)
                        .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
                        .cloned()
                        .ok_or(StoreError::NotFound {
                            entity: "response answer vector",
                            id: response_answer_id,
                        })
                },
            )
            .await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.shared
            .write(
                &self.exec,
                &self.scope,
                "vectors.delete",
                Mutation::DeleteVector(id),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldType, Form, FormField, ModelName, Response};
    use crate::store::memory::MemoryDatabase;
    use crate::store::{FormFieldStore, FormStore, GatewaySettings, ResponseStore};

    struct Seeded {
        db: MemoryDatabase,
        response_id: Uuid,
        field_id: Uuid,
    }

    async fn seeded(settings: GatewaySettings) -> Seeded {
        let db = MemoryDatabase::new(settings);
        let mut form = Form::new("Survey", "About you");
        form.id = Uuid::new_v4();
        db.forms().create(&form).await.unwrap();

        let mut field = FormField::new(form.id, FieldType::Textarea, 1);
        field.id = Uuid::new_v4();
        db.form_fields().create(&field).await.unwrap();

        let mut response = Response::new(form.id).with_respondent("name", "Ada");
        response.id = Uuid::new_v4();
        db.responses().create(&response).await.unwrap();

        Seeded {
            db,
            response_id: response.id,
            field_id: field.id,
        }
    }

    fn answer(s: &Seeded) -> ResponseAnswer {
        let mut a = ResponseAnswer::new(s.field_id).with_value("en", "hello");
        a.id = Uuid::new_v4();
        a.response_id = s.response_id;
        a
    }

    fn vector(answer_id: Uuid, embedding: Vec<f32>) -> ResponseAnswerVector {
        let mut v = ResponseAnswerVector::new(answer_id, embedding);
        v.id = Uuid::new_v4();
        v
    }

    mod answer_store {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_create_and_filter_by_response() {
            let s = seeded(GatewaySettings::default()).await;
            let a = answer(&s);
            s.db.answers().create(&a).await.unwrap();

            let by_response = s
                .db
                .answers()
                .list(ResponseAnswerFilter {
                    response_id: Some(s.response_id),
                    field_id: None,
                })
                .await
                .unwrap();
            assert_eq!(by_response, vec![a.clone()]);

            let none = s
                .db
                .answers()
                .list(ResponseAnswerFilter {
                    response_id: Some(Uuid::new_v4()),
                    field_id: None,
                })
                .await
                .unwrap();
            assert!(none.is_empty());
        }

        #[tokio::test]
        async fn test_unknown_field_is_rejected() {
            let s = seeded(GatewaySettings::default()).await;
            let mut a = answer(&s);
            a.field_id = Uuid::new_v4();
            let err = s.db.answers().create(&a).await.unwrap_err();
            assert!(err.to_string().contains("form field"));
        }

        #[tokio::test]
        async fn test_delete_then_get_is_not_found() {
            let s = seeded(GatewaySettings::default()).await;
            let a = answer(&s);
            s.db.answers().create(&a).await.unwrap();
            s.db.answers().delete(a.id).await.unwrap();
            assert!(matches!(
                s.db.answers().get_by_id(a.id).await,
                Err(StoreError::NotFound { .. })
            ));
        }
    }

    mod vector_store {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_bulk_insert_and_lookup_by_answer() {
            let s = seeded(GatewaySettings::default()).await;
            let a = answer(&s);
            s.db.answers().create(&a).await.unwrap();

            let v = vector(a.id, vec![0.25, 0.5]).with_model(ModelName::TextEmbedding3Small);
            s.db.vectors().create_bulk(&[v.clone()]).await.unwrap();

            let found = s.db.vectors().get_by_response_answer_id(a.id).await.unwrap();
            assert_eq!(found, v);
        }

        #[tokio::test]
        async fn test_lookup_by_answer_returns_earliest_vector() {
            let s = seeded(GatewaySettings::default()).await;
            let a = answer(&s);
            s.db.answers().create(&a).await.unwrap();

            let first = vector(a.id, vec![1.0]);
            let mut second = vector(a.id, vec![2.0]);
            second.created_at = first.created_at + chrono::Duration::seconds(1);
            let mut third = vector(a.id, vec![3.0]);
            third.created_at = second.created_at;
            s.db.vectors()
                .create_bulk(&[third, second, first.clone()])
                .await
                .unwrap();

            for _ in 0..3 {
                let found = s.db.vectors().get_by_response_answer_id(a.id).await.unwrap();
                assert_eq!(found, first);
            }
        }

        #[tokio::test]
        async fn test_bulk_insert_is_all_or_nothing() {
            let settings = GatewaySettings {
                embedding_dimensions: Some(3),
                ..GatewaySettings::default()
            };
            let s = seeded(settings).await;
            let a = answer(&s);
            s.db.answers().create(&a).await.unwrap();

            let batch = vec![
                vector(a.id, vec![0.1, 0.2, 0.3]),
                vector(a.id, vec![0.1, 0.2]),
            ];
            let err = s.db.vectors().create_bulk(&batch).await.unwrap_err();
            assert_eq!(
                err,
                StoreError::Constraint {
                    operation: "vectors.create_bulk",
                    reason: "embedding has 2 dimensions, expected 3".to_string(),
                }
            );
            assert_eq!(s.db.row_counts().await.vectors, 0);
        }

        #[tokio::test]
        async fn test_duplicate_ids_within_batch_conflict() {
            let s = seeded(GatewaySettings::default()).await;
            let a = answer(&s);
            s.db.answers().create(&a).await.unwrap();

            let v = vector(a.id, vec![1.0]);
            let err = s
                .db
                .vectors()
                .create_bulk(&[v.clone(), v.clone()])
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Conflict { .. }));
            assert_eq!(s.db.row_counts().await.vectors, 0);
        }

        #[tokio::test]
        async fn test_empty_batch_is_noop() {
            let s = seeded(GatewaySettings::default()).await;
            s.db.vectors().create_bulk(&[]).await.unwrap();
            assert_eq!(s.db.row_counts().await.vectors, 0);
        }

        #[tokio::test]
        async fn test_vector_needs_existing_answer() {
            let s = seeded(GatewaySettings::default()).await;
            let err = s
                .db
                .vectors()
                .create(&vector(Uuid::new_v4(), vec![1.0]))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("does not exist"));
        }
    }
}
