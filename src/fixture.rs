//! Batch intake from a JSON fixture
//!
//! A fixture seeds forms with their fields and then replays submissions
//! against them:
//!
//! ```json
//! {
//!   "forms": [
//!     { "id": "...", "title": "Feedback", "description": "...", "publish": true,
//!       "fields": [{ "id": "...", "type": "text", "field_order": 1, "required": true }] }
//!   ],
//!   "submissions": [
//!     { "response": { "form_id": "...", "respondent": { "email": "a@b.c" } },
//!       "answers": [{ "field_id": "...", "value": { "en": "hi" } }] }
//!   ]
//! }
//! ```

use crate::domain::{Form, FormField, Response, ResponseAnswer, ResponseAnswerVector};
use crate::error::{ErrorKind, Result};
use crate::service::{FormFieldService, FormService, ResponseService};
use crate::store::memory::MemoryDatabase;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub forms: Vec<FormSeed>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

/// A form with its fields; published after the fields are added when
/// `publish` is set
#[derive(Debug, Deserialize)]
pub struct FormSeed {
    #[serde(flatten)]
    pub form: Form,
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

/// One response with its answers and embeddings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub response: Response,
    #[serde(default)]
    pub answers: Vec<ResponseAnswer>,
    #[serde(default)]
    pub vectors: Vec<ResponseAnswerVector>,
}

/// A submission the pipeline rejected
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Accepted submissions carrying their generated ids
    pub accepted: Vec<Submission>,
    pub rejected: Vec<Rejection>,
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture {}", path.display()))
    }
}

/// The authoring and submission services wired to one database
pub struct Intake {
    forms: FormService,
    fields: FormFieldService,
    responses: ResponseService,
}

impl Intake {
    pub fn new(db: &MemoryDatabase) -> Self {
        Self {
            forms: FormService::new(db.forms()),
            fields: FormFieldService::new(db.forms(), db.form_fields()),
            responses: ResponseService::new(db.forms(), db.form_fields(), db.responses()),
        }
    }

    pub fn responses(&self) -> &ResponseService {
        &self.responses
    }

    /// Create the form and its fields, publishing last
    pub async fn seed(&self, seed: FormSeed) -> Result<Form> {
        let mut form = seed.form;
        self.forms.create(&mut form).await?;
        for mut field in seed.fields {
            field.form_id = form.id;
            self.fields.create(&mut field).await?;
        }
        if seed.publish {
            form = self.forms.publish(form.id).await?;
        }
        Ok(form)
    }

    /// Seed every form, then submit every submission in order
    ///
    /// Seeding failures abort the run. Rejected submissions are collected and
    /// the run carries on with the next one.
    pub async fn run(&self, fixture: Fixture) -> Result<RunReport> {
        for seed in fixture.forms {
            let form = self.seed(seed).await?;
            tracing::debug!("Seeded form {} ({})", form.id, form.status);
        }

        let mut report = RunReport::default();
        for (index, mut submission) in fixture.submissions.into_iter().enumerate() {
            let outcome = self
                .responses
                .submit(
                    &mut submission.response,
                    &mut submission.answers,
                    &mut submission.vectors,
                )
                .await;
            match outcome {
                Ok(()) => report.accepted.push(submission),
                Err(err) => {
                    tracing::warn!("Submission #{index} rejected ({}): {err}", err.kind().label());
                    report.rejected.push(Rejection {
                        index,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}
