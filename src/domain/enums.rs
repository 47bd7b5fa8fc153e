//! Closed enumerations used by the entity model
//!
//! Values coming from outside (JSON, CLI, config) are parsed with `FromStr`
//! or serde; an unknown identifier is a [`ValidationError::UnknownVariant`].

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Closed,
}

impl FormStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Closed => "closed",
        }
    }

    /// Only published forms take submissions
    pub fn accepts_responses(&self) -> bool {
        matches!(self, Self::Published)
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "closed" => Ok(Self::Closed),
            other => Err(ValidationError::UnknownVariant {
                kind: "form status",
                value: other.to_string(),
            }),
        }
    }
}

/// Input kind of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Email,
    Select,
    Radio,
    Checkbox,
    Date,
}

impl FieldType {
    pub const ALL: [FieldType; 8] = [
        Self::Text,
        Self::Textarea,
        Self::Number,
        Self::Email,
        Self::Select,
        Self::Radio,
        Self::Checkbox,
        Self::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Email => "email",
            Self::Select => "select",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
        }
    }

    /// Choice fields must carry their options
    pub fn requires_options(&self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::Checkbox)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "field type",
                value: s.to_string(),
            })
    }
}

/// Status of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    Pending,
    Submitted,
    Reviewed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Reviewed => "reviewed",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "submitted" => Ok(Self::Submitted),
            "reviewed" => Ok(Self::Reviewed),
            other => Err(ValidationError::UnknownVariant {
                kind: "response status",
                value: other.to_string(),
            }),
        }
    }
}

/// Embedding model that produced a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelName {
    /// High-accuracy embedding
    TextEmbedding3Large,
    /// Cheaper and faster embedding
    TextEmbedding3Small,
    Placeholder,
}

impl ModelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextEmbedding3Large => "text-embedding-3-large",
            Self::TextEmbedding3Small => "text-embedding-3-small",
            Self::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text-embedding-3-large" => Ok(Self::TextEmbedding3Large),
            "text-embedding-3-small" => Ok(Self::TextEmbedding3Small),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(ValidationError::UnknownVariant {
                kind: "model name",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ModelName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelName> for String {
    fn from(model: ModelName) -> Self {
        model.as_str().to_string()
    }
}

/// Serde adapter mapping `""` and `null` to `None` for optional model names
pub(crate) mod optional_model_name {
    use super::ModelName;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<ModelName>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.map(|m| m.as_str()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ModelName>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}
