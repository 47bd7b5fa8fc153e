//! Form and form field authoring

use super::require_id;
use crate::domain::{Form, FormField, FormStatus};
use crate::error::{Error, Result};
use crate::store::{FormFieldFilter, FormFieldStore, FormFilter, FormStore};
use crate::validation::{validate_form, validate_form_field};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct FormService {
    forms: Arc<dyn FormStore>,
}

impl FormService {
    pub fn new(forms: Arc<dyn FormStore>) -> Self {
        Self { forms }
    }

    /// Store a new draft form
    pub async fn create(&self, form: &mut Form) -> Result<()> {
        validate_form(form)?;
        if form.id.is_nil() {
            form.id = Uuid::new_v4();
        }
        form.status = FormStatus::Draft;
        form.created_at = Utc::now();
        self.forms.create(form).await?;
        tracing::info!("Form {} created", form.id);
        Ok(())
    }

    /// Replace title and description. Status only moves through
    /// [`FormService::publish`] and [`FormService::close`].
    pub async fn update(&self, form: &mut Form) -> Result<()> {
        require_id(form.id, "form")?;
        let existing = self.forms.get_by_id(form.id).await?;
        validate_form(form)?;
        form.status = existing.status;
        form.created_at = existing.created_at;
        self.forms.update(form).await?;
        Ok(())
    }

    pub async fn publish(&self, id: Uuid) -> Result<Form> {
        require_id(id, "form")?;
        let mut form = self.forms.get_by_id(id).await?;
        match form.status {
            FormStatus::Published => return Ok(form),
            FormStatus::Closed => return Err(Error::FormClosed { form_id: id }),
            FormStatus::Draft => {}
        }
        form.status = FormStatus::Published;
        self.forms.update(&form).await?;
        tracing::info!("Form {id} published");
        Ok(form)
    }

    pub async fn close(&self, id: Uuid) -> Result<Form> {
        require_id(id, "form")?;
        let mut form = self.forms.get_by_id(id).await?;
        if form.is_closed() {
            return Ok(form);
        }
        form.status = FormStatus::Closed;
        self.forms.update(&form).await?;
        tracing::info!("Form {id} closed");
        Ok(form)
    }

    pub async fn get(&self, id: Uuid) -> Result<Form> {
        require_id(id, "form")?;
        Ok(self.forms.get_by_id(id).await?)
    }

    /// Forms matching `filter`, newest first
    pub async fn list(&self, filter: FormFilter) -> Result<Vec<Form>> {
        Ok(self.forms.list(filter).await?)
    }

    /// Delete a form and its fields
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        require_id(id, "form")?;
        self.forms.get_by_id(id).await?;
        self.forms.delete(id).await?;
        tracing::info!("Form {id} deleted");
        Ok(())
    }
}

pub struct FormFieldService {
    forms: Arc<dyn FormStore>,
    fields: Arc<dyn FormFieldStore>,
}

impl FormFieldService {
    pub fn new(forms: Arc<dyn FormStore>, fields: Arc<dyn FormFieldStore>) -> Self {
        Self { forms, fields }
    }

    /// Add a field to a form that is not closed
    pub async fn create(&self, field: &mut FormField) -> Result<()> {
        validate_form_field(field)?;
        self.ensure_editable(field.form_id).await?;

        if field.id.is_nil() {
            field.id = Uuid::new_v4();
        }
        let now = Utc::now();
        field.created_at = now;
        field.updated_at = now;
        self.fields.create(field).await?;
        tracing::debug!("Field {} added to form {}", field.id, field.form_id);
        Ok(())
    }

    /// Update a field in place; it stays on its form and keeps its creation time
    pub async fn update(&self, field: &mut FormField) -> Result<()> {
        require_id(field.id, "form field")?;
        let existing = self.fields.get_by_id(field.id).await?;
        field.form_id = existing.form_id;
        field.created_at = existing.created_at;
        validate_form_field(field)?;
        self.ensure_editable(field.form_id).await?;

        field.updated_at = Utc::now();
        self.fields.update(field).await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        require_id(id, "form field")?;
        self.fields.get_by_id(id).await?;
        self.fields.delete(id).await?;
        Ok(())
    }

    /// Fields of a form in display order
    pub async fn list_by_form(&self, form_id: Uuid) -> Result<Vec<FormField>> {
        require_id(form_id, "form")?;
        Ok(self
            .fields
            .list(FormFieldFilter {
                form_id: Some(form_id),
            })
            .await?)
    }

    async fn ensure_editable(&self, form_id: Uuid) -> Result<()> {
        let form = self.forms.get_by_id(form_id).await?;
        if form.is_closed() {
            return Err(Error::FormClosed { form_id });
        }
        Ok(())
    }
}
