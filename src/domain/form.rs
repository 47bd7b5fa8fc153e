//! Form and form field records

use super::enums::{FieldType, FormStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Text keyed by language tag, e.g. `{"en": "Name", "ar": "الاسم"}`
pub type LocalizedText = BTreeMap<String, String>;

/// Language used when a translation is missing
pub const FALLBACK_LANGUAGE: &str = "en";

/// Look up `lang`, falling back to English when absent or blank
pub fn localized<'a>(text: &'a LocalizedText, lang: &str) -> &'a str {
    text.get(lang)
        .filter(|v| !v.is_empty())
        .or_else(|| text.get(FALLBACK_LANGUAGE))
        .map(String::as_str)
        .unwrap_or("")
}

/// A schema of fields published to collect submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    #[serde(default)]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: FormStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Form {
    /// Create a draft form without an id
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.to_string(),
            description: description.to_string(),
            status: FormStatus::Draft,
            created_at: Utc::now(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == FormStatus::Published
    }

    pub fn is_closed(&self) -> bool {
        self.status == FormStatus::Closed
    }
}

/// One question within a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(default)]
    pub id: Uuid,
    /// Nil until the field is attached to a form
    #[serde(default)]
    pub form_id: Uuid,
    #[serde(default)]
    pub label: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub placeholder: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub help_text: LocalizedText,
    #[serde(default)]
    pub required: bool,
    /// Choice metadata for select, radio and checkbox fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    pub field_order: i32,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl FormField {
    /// Create a field of `field_type` at position `field_order` on `form_id`
    pub fn new(form_id: Uuid, field_type: FieldType, field_order: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            form_id,
            label: LocalizedText::new(),
            placeholder: LocalizedText::new(),
            help_text: LocalizedText::new(),
            required: false,
            options: Map::new(),
            field_order,
            field_type,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_label(mut self, lang: &str, label: &str) -> Self {
        self.label.insert(lang.to_string(), label.to_string());
        self
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    pub fn requires_options(&self) -> bool {
        self.field_type.requires_options()
    }

    pub fn label(&self, lang: &str) -> &str {
        localized(&self.label, lang)
    }

    pub fn placeholder(&self, lang: &str) -> &str {
        localized(&self.placeholder, lang)
    }

    pub fn help_text(&self, lang: &str) -> &str {
        localized(&self.help_text, lang)
    }
}
