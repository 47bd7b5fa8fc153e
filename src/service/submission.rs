//! Submission orchestrator
//!
//! Validates a response against its form and writes the response, its
//! answers and their embeddings as one atomic unit.

use super::require_id;
use crate::domain::{FormField, Response, ResponseAnswer, ResponseAnswerVector, ResponseStatus};
use crate::error::{Error, Result, ValidationError};
use crate::store::{with_transaction, FormFieldFilter, FormFieldStore, FormStore, ResponseStore};
use crate::validation::{
    validate_response, validate_response_answer, validate_response_answer_vector,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub struct ResponseService {
    forms: Arc<dyn FormStore>,
    fields: Arc<dyn FormFieldStore>,
    responses: Arc<dyn ResponseStore>,
}

impl ResponseService {
    pub fn new(
        forms: Arc<dyn FormStore>,
        fields: Arc<dyn FormFieldStore>,
        responses: Arc<dyn ResponseStore>,
    ) -> Self {
        Self {
            forms,
            fields,
            responses,
        }
    }

    /// Validate and persist one submission
    ///
    /// On success the passed records carry their generated ids and
    /// timestamps. On failure nothing from this submission is stored.
    pub async fn submit(
        &self,
        response: &mut Response,
        answers: &mut [ResponseAnswer],
        vectors: &mut [ResponseAnswerVector],
    ) -> Result<()> {
        validate_response(response)?;
        for answer in answers.iter() {
            validate_response_answer(answer)?;
        }
        for vector in vectors.iter() {
            validate_response_answer_vector(vector)?;
        }

        let form = self.forms.get_by_id(response.form_id).await?;
        if !form.status.accepts_responses() {
            return Err(Error::FormNotPublished {
                form_id: form.id,
                status: form.status,
            });
        }

        let fields = self
            .fields
            .list(FormFieldFilter {
                form_id: Some(form.id),
            })
            .await?;
        if fields.is_empty() {
            return Err(ValidationError::FormHasNoFields { form_id: form.id }.into());
        }
        check_answers(form.id, &fields, answers)?;
        check_vectors(answers, vectors)?;

        let now = Utc::now();
        if response.id.is_nil() {
            response.id = Uuid::new_v4();
        }
        response.status = ResponseStatus::Submitted;
        response.submitted_at = now;
        for answer in answers.iter_mut() {
            if answer.id.is_nil() {
                answer.id = Uuid::new_v4();
            }
            answer.response_id = response.id;
            answer.created_at = now;
        }
        for vector in vectors.iter_mut() {
            if vector.id.is_nil() {
                vector.id = Uuid::new_v4();
            }
            vector.created_at = now;
        }

        tracing::debug!(
            "Writing response {} with {} answer(s) and {} vector(s)",
            response.id,
            answers.len(),
            vectors.len()
        );

        let (staged_response, staged_answers, staged_vectors) =
            (response.clone(), answers.to_vec(), vectors.to_vec());
        let result: Result<()> = with_transaction(&*self.responses, |tx| async move {
            tx.responses.create(&staged_response).await?;
            for answer in &staged_answers {
                tx.answers.create(answer).await?;
            }
            if !staged_vectors.is_empty() {
                tx.vectors.create_bulk(&staged_vectors).await?;
            }
            Ok(())
        })
        .await;

        match &result {
            Ok(()) => tracing::info!("Response {} submitted to form {}", response.id, form.id),
            Err(err) => tracing::warn!("Submission to form {} rolled back: {err}", form.id),
        }
        result
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Response> {
        require_id(id, "response")?;
        Ok(self.responses.get_by_id(id).await?)
    }

    /// Responses of a form, latest submission first
    pub async fn list_by_form(&self, form_id: Uuid) -> Result<Vec<Response>> {
        require_id(form_id, "form")?;
        Ok(self.responses.list_by_form_id(form_id).await?)
    }

    /// Delete a response; its answers and vectors go with it only when the
    /// store is configured to cascade
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        require_id(id, "response")?;
        with_transaction(&*self.responses, |tx| async move {
            tx.responses.get_by_id(id).await?;
            tx.responses.delete(id).await?;
            Ok::<_, Error>(())
        })
        .await?;
        tracing::info!("Response {id} deleted");
        Ok(())
    }
}

/// Every answer targets a distinct field of the form and every required field
/// is answered
fn check_answers(form_id: Uuid, fields: &[FormField], answers: &[ResponseAnswer]) -> Result<()> {
    let mut answered: HashSet<Uuid> = HashSet::with_capacity(answers.len());
    for answer in answers {
        if !answered.insert(answer.field_id) {
            return Err(ValidationError::DuplicateAnswer {
                field_id: answer.field_id,
            }
            .into());
        }
    }

    let missing: Vec<Uuid> = fields
        .iter()
        .filter(|f| f.required && !answered.contains(&f.id))
        .map(|f| f.id)
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingRequiredField { field_ids: missing });
    }

    let on_form: HashSet<Uuid> = fields.iter().map(|f| f.id).collect();
    if let Some(stray) = answers.iter().find(|a| !on_form.contains(&a.field_id)) {
        return Err(ValidationError::FieldNotOnForm {
            field_id: stray.field_id,
            form_id,
        }
        .into());
    }
    Ok(())
}

/// Vectors may only embed answers written by the same submission
fn check_vectors(answers: &[ResponseAnswer], vectors: &[ResponseAnswerVector]) -> Result<()> {
    let ids: HashSet<Uuid> = answers
        .iter()
        .map(|a| a.id)
        .filter(|id| !id.is_nil())
        .collect();
    match vectors
        .iter()
        .find(|v| !ids.contains(&v.response_answer_id))
    {
        Some(stray) => Err(ValidationError::VectorAnswerNotInSubmission {
            answer_id: stray.response_answer_id,
        }
        .into()),
        None => Ok(()),
    }
}
