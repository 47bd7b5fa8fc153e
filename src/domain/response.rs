//! Submission records: responses, their answers and answer embeddings

use super::enums::{optional_model_name, ModelName, ResponseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One submission against a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Uuid,
    pub form_id: Uuid,
    /// Free-form respondent data such as email, name or phone
    #[serde(default)]
    pub respondent: Map<String, Value>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl Response {
    /// Create a pending response for `form_id`
    pub fn new(form_id: Uuid) -> Self {
        Self {
            id: Uuid::nil(),
            form_id,
            respondent: Map::new(),
            status: ResponseStatus::Pending,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_respondent(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.respondent.insert(key.to_string(), value.into());
        self
    }

    pub fn email(&self) -> &str {
        self.respondent_str("email")
    }

    pub fn name(&self) -> &str {
        self.respondent_str("name")
    }

    pub fn set_email(&mut self, email: &str) {
        self.respondent
            .insert("email".to_string(), Value::String(email.to_string()));
    }

    pub fn set_name(&mut self, name: &str) {
        self.respondent
            .insert("name".to_string(), Value::String(name.to_string()));
    }

    fn respondent_str(&self, key: &str) -> &str {
        self.respondent
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// The value submitted for one field within one response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAnswer {
    #[serde(default)]
    pub id: Uuid,
    #[serde(default)]
    pub response_id: Uuid,
    pub field_id: Uuid,
    /// Language-keyed value, e.g. `{"en": "...", "ar": "..."}`
    #[serde(default)]
    pub value: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ResponseAnswer {
    /// Create an answer to `field_id`; the response id is bound at submit time
    pub fn new(field_id: Uuid) -> Self {
        Self {
            id: Uuid::nil(),
            response_id: Uuid::nil(),
            field_id,
            value: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_value(mut self, lang: &str, value: impl Into<Value>) -> Self {
        self.value.insert(lang.to_string(), value.into());
        self
    }

    /// Text answer for `lang`, empty when absent or not a string
    pub fn value_text(&self, lang: &str) -> &str {
        self.value.get(lang).and_then(Value::as_str).unwrap_or("")
    }

    pub fn set_value(&mut self, lang: &str, value: &str) {
        self.value
            .insert(lang.to_string(), Value::String(value.to_string()));
    }
}

/// Embedding derived from an answer's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAnswerVector {
    #[serde(default)]
    pub id: Uuid,
    pub response_answer_id: Uuid,
    pub embedding: Vec<f32>,
    #[serde(
        default,
        with = "optional_model_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub model_name: Option<ModelName>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ResponseAnswerVector {
    pub fn new(response_answer_id: Uuid, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::nil(),
            response_answer_id,
            embedding,
            model_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: ModelName) -> Self {
        self.model_name = Some(model);
        self
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_respondent_accessors() {
        let mut response = Response::new(Uuid::new_v4()).with_respondent("phone", "555");
        assert_eq!(response.email(), "");

        response.set_email("user@test.com");
        response.set_name("Test User");
        assert_eq!(response.email(), "user@test.com");
        assert_eq!(response.name(), "Test User");
    }

    #[test]
    fn test_non_string_respondent_value_reads_empty() {
        let response = Response::new(Uuid::new_v4()).with_respondent("email", 42);
        assert_eq!(response.email(), "");
    }

    #[test]
    fn test_answer_value_text() {
        let mut answer = ResponseAnswer::new(Uuid::new_v4()).with_value("en", "hi");
        answer.set_value("ar", "مرحبا");
        assert_eq!(answer.value_text("en"), "hi");
        assert_eq!(answer.value_text("ar"), "مرحبا");
        assert_eq!(answer.value_text("fr"), "");
    }

    #[test]
    fn test_vector_empty_model_name_deserializes_to_none() {
        let raw = json!({
            "response_answer_id": Uuid::new_v4(),
            "embedding": [0.1, 0.2],
            "model_name": ""
        });
        let vector: ResponseAnswerVector = serde_json::from_value(raw).unwrap();
        assert_eq!(vector.model_name, None);
        assert_eq!(vector.dimensions(), 2);
    }

    #[test]
    fn test_vector_known_model_name_deserializes() {
        let raw = json!({
            "response_answer_id": Uuid::new_v4(),
            "embedding": [0.5],
            "model_name": "text-embedding-3-large"
        });
        let vector: ResponseAnswerVector = serde_json::from_value(raw).unwrap();
        assert_eq!(vector.model_name, Some(ModelName::TextEmbedding3Large));
    }

    #[test]
    fn test_vector_unknown_model_name_is_rejected() {
        let raw = json!({
            "response_answer_id": Uuid::new_v4(),
            "embedding": [0.5],
            "model_name": "ada-002"
        });
        assert!(serde_json::from_value::<ResponseAnswerVector>(raw).is_err());
    }

    #[test]
    fn test_response_defaults_when_deserialized() {
        let form_id = Uuid::new_v4();
        let raw = json!({"form_id": form_id, "respondent": {"email": "a@b.c"}});
        let response: Response = serde_json::from_value(raw).unwrap();
        assert!(response.id.is_nil());
        assert_eq!(response.status, ResponseStatus::Pending);
        assert_eq!(response.email(), "a@b.c");
    }
}
