use super::Shared;
use crate::domain::{Form, FormField};
use crate::store::{
    Executor, FormFieldFilter, FormFieldStore, FormFilter, FormStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Forms are authored outside any submission, so these stores always work
/// against committed rows.
pub struct MemoryFormStore {
    shared: Arc<Shared>,
    exec: Executor,
}

impl MemoryFormStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let exec = Executor::new(shared.settings.query_timeout);
        Self { shared, exec }
    }
}

#[async_trait]
impl FormStore for MemoryFormStore {
    async fn create(&self, form: &Form) -> StoreResult<()> {
        const OP: &str = "forms.create";
        self.exec
            .run(OP, async {
                if form.id.is_nil() {
                    return Err(StoreError::Constraint {
                        operation: OP,
                        reason: "form id must be set".to_string(),
                    });
                }
                let mut tables = self.shared.tables.write().await;
                if tables.forms.contains_key(&form.id) {
                    return Err(StoreError::Conflict {
                        operation: OP,
                        entity: "form",
                        id: form.id,
                    });
                }
                tables.forms.insert(form.id, form.clone());
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Form> {
        self.exec
            .run("forms.get_by_id", async {
                let tables = self.shared.tables.read().await;
                tables
                    .forms
                    .get(&id)
                    .cloned()
                    .ok_or(StoreError::NotFound { entity: "form", id })
            })
            .await
    }

    async fn update(&self, form: &Form) -> StoreResult<()> {
        self.exec
            .run("forms.update", async {
                let mut tables = self.shared.tables.write().await;
                match tables.forms.get_mut(&form.id) {
                    Some(row) => {
                        *row = form.clone();
                        Ok(())
                    }
                    None => Err(StoreError::NotFound {
                        entity: "form",
                        id: form.id,
                    }),
                }
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.exec
            .run("forms.delete", async {
                let mut tables = self.shared.tables.write().await;
                if tables.forms.remove(&id).is_none() {
                    return Err(StoreError::NotFound { entity: "form", id });
                }
                tables.fields.retain(|_, field| field.form_id != id);
                Ok(())
            })
            .await
    }

    async fn list(&self, filter: FormFilter) -> StoreResult<Vec<Form>> {
        self.exec
            .run("forms.list", async {
                let title = filter.title.as_deref().map(str::to_lowercase);
                let tables = self.shared.tables.read().await;
                let mut forms: Vec<Form> = tables
                    .forms
                    .values()
                    .filter(|f| filter.status.is_none_or(|status| f.status == status))
                    .filter(|f| {
                        title
                            .as_deref()
                            .is_none_or(|t| f.title.to_lowercase().contains(t))
                    })
                    .cloned()
                    .collect();
                forms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
                Ok(forms)
            })
            .await
    }
}

pub struct MemoryFormFieldStore {
    shared: Arc<Shared>,
    exec: Executor,
}

impl MemoryFormFieldStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let exec = Executor::new(shared.settings.query_timeout);
        Self { shared, exec }
    }
}

#[async_trait]
impl FormFieldStore for MemoryFormFieldStore {
    async fn create(&self, field: &FormField) -> StoreResult<()> {
        const OP: &str = "form_fields.create";
        self.exec
            .run(OP, async {
                if field.id.is_nil() {
                    return Err(StoreError::Constraint {
                        operation: OP,
                        reason: "form field id must be set".to_string(),
                    });
                }
                let mut tables = self.shared.tables.write().await;
                if tables.fields.contains_key(&field.id) {
                    return Err(StoreError::Conflict {
                        operation: OP,
                        entity: "form field",
                        id: field.id,
                    });
                }
                if !tables.forms.contains_key(&field.form_id) {
                    return Err(StoreError::Constraint {
                        operation: OP,
                        reason: format!("form {} does not exist", field.form_id),
                    });
                }
                tables.fields.insert(field.id, field.clone());
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<FormField> {
        self.exec
            .run("form_fields.get_by_id", async {
                let tables = self.shared.tables.read().await;
                tables.fields.get(&id).cloned().ok_or(StoreError::NotFound {
                    entity: "form field",
                    id,
                })
            })
            .await
    }

    async fn update(&self, field: &FormField) -> StoreResult<()> {
        const OP: &str = "form_fields.update";
        self.exec
            .run(OP, async {
                let mut tables = self.shared.tables.write().await;
                if !tables.fields.contains_key(&field.id) {
                    return Err(StoreError::NotFound {
                        entity: "form field",
                        id: field.id,
                    });
                }
                if !tables.forms.contains_key(&field.form_id) {
                    return Err(StoreError::Constraint {
                        operation: OP,
                        reason: format!("form {} does not exist", field.form_id),
                    });
                }
                tables.fields.insert(field.id, field.clone());
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.exec
            .run("form_fields.delete", async {
                let mut tables = self.shared.tables.write().await;
                tables
                    .fields
                    .remove(&id)
                    .map(|_| ())
                    .ok_or(StoreError::NotFound {
                        entity: "form field",
                        id,
                    })
            })
            .await
    }

    async fn list(&self, filter: FormFieldFilter) -> StoreResult<Vec<FormField>> {
        self.exec
            .run("form_fields.list", async {
                let tables = self.shared.tables.read().await;
                let mut fields: Vec<FormField> = tables
                    .fields
                    .values()
                    .filter(|f| filter.form_id.is_none_or(|id| f.form_id == id))
                    .cloned()
                    .collect();
                fields.sort_by(|a, b| {
                    a.field_order
                        .cmp(&b.field_order)
                        .then(a.created_at.cmp(&b.created_at))
                        .then(a.id.cmp(&b.id))
                });
                Ok(fields)
            })
            .await
    }
}
