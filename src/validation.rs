//! Domain validators
//!
//! Pure checks run before any store access. Each returns the first rule the
//! entity breaks.

use crate::domain::{Form, FormField, Response, ResponseAnswer, ResponseAnswerVector};
use crate::error::ValidationError;

pub fn validate_form(form: &Form) -> Result<(), ValidationError> {
    if form.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    if form.description.trim().is_empty() {
        return Err(ValidationError::MissingDescription);
    }
    Ok(())
}

pub fn validate_form_field(field: &FormField) -> Result<(), ValidationError> {
    if field.form_id.is_nil() {
        return Err(ValidationError::MissingFieldFormId);
    }
    if field.requires_options() && !field.has_options() {
        return Err(ValidationError::MissingOptions(field.field_type.as_str()));
    }
    if field.field_order <= 0 {
        return Err(ValidationError::InvalidFieldOrder(field.field_order));
    }
    Ok(())
}

pub fn validate_response(response: &Response) -> Result<(), ValidationError> {
    if response.form_id.is_nil() {
        return Err(ValidationError::MissingFormId);
    }
    if response.respondent.is_empty() {
        return Err(ValidationError::MissingRespondent);
    }
    Ok(())
}

/// The value map may be empty, but its language keys must not be blank
pub fn validate_response_answer(answer: &ResponseAnswer) -> Result<(), ValidationError> {
    if answer.field_id.is_nil() {
        return Err(ValidationError::MissingFieldId);
    }
    if answer.value.keys().any(|lang| lang.trim().is_empty()) {
        return Err(ValidationError::BlankValueKey);
    }
    Ok(())
}

pub fn validate_response_answer_vector(
    vector: &ResponseAnswerVector,
) -> Result<(), ValidationError> {
    if vector.response_answer_id.is_nil() {
        return Err(ValidationError::MissingResponseAnswerId);
    }
    if !vector.has_embedding() {
        return Err(ValidationError::MissingEmbedding);
    }
    if let Some(index) = vector.embedding.iter().position(|x| !x.is_finite()) {
        return Err(ValidationError::NonFiniteEmbedding { index });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldType, ModelName};
    use serde_json::json;
    use uuid::Uuid;

    fn valid_response() -> Response {
        Response::new(Uuid::new_v4())
            .with_respondent("email", "user@test.com")
            .with_respondent("name", "Test User")
    }

    mod form_rules {
        use super::*;

        #[test]
        fn test_valid_form() {
            assert_eq!(validate_form(&Form::new("Survey", "About you")), Ok(()));
        }

        #[test]
        fn test_blank_title() {
            let form = Form::new("  ", "About you");
            assert_eq!(validate_form(&form), Err(ValidationError::MissingTitle));
        }

        #[test]
        fn test_missing_description() {
            let form = Form::new("Survey", "");
            assert_eq!(
                validate_form(&form),
                Err(ValidationError::MissingDescription)
            );
        }
    }

    mod form_field_rules {
        use super::*;

        #[test]
        fn test_text_field_without_options_is_valid() {
            let field = FormField::new(Uuid::new_v4(), FieldType::Text, 1);
            assert_eq!(validate_form_field(&field), Ok(()));
        }

        #[test]
        fn test_choice_fields_need_options() {
            for field_type in [FieldType::Select, FieldType::Radio, FieldType::Checkbox] {
                let field = FormField::new(Uuid::new_v4(), field_type, 1);
                assert_eq!(
                    validate_form_field(&field),
                    Err(ValidationError::MissingOptions(field_type.as_str()))
                );
            }
        }

        #[test]
        fn test_choice_field_with_options_is_valid() {
            let field = FormField::new(Uuid::new_v4(), FieldType::Radio, 3)
                .with_option("yes", json!({"en": "Yes"}))
                .with_option("no", json!({"en": "No"}));
            assert_eq!(validate_form_field(&field), Ok(()));
        }

        #[test]
        fn test_field_order_must_be_positive() {
            let field = FormField::new(Uuid::new_v4(), FieldType::Number, 0);
            assert_eq!(
                validate_form_field(&field),
                Err(ValidationError::InvalidFieldOrder(0))
            );

            let field = FormField::new(Uuid::new_v4(), FieldType::Number, -4);
            assert_eq!(
                validate_form_field(&field),
                Err(ValidationError::InvalidFieldOrder(-4))
            );
        }

        #[test]
        fn test_field_needs_form() {
            let field = FormField::new(Uuid::nil(), FieldType::Date, 1);
            assert_eq!(
                validate_form_field(&field),
                Err(ValidationError::MissingFieldFormId)
            );
        }
    }

    mod response_rules {
        use super::*;

        #[test]
        fn test_valid_response() {
            assert_eq!(validate_response(&valid_response()), Ok(()));
        }

        #[test]
        fn test_missing_form_id() {
            let response = Response::new(Uuid::nil()).with_respondent("email", "a@b.c");
            assert_eq!(
                validate_response(&response),
                Err(ValidationError::MissingFormId)
            );
        }

        #[test]
        fn test_empty_respondent() {
            let response = Response::new(Uuid::new_v4());
            assert_eq!(
                validate_response(&response),
                Err(ValidationError::MissingRespondent)
            );
        }
    }

    mod answer_rules {
        use super::*;

        #[test]
        fn test_empty_value_map_is_allowed() {
            let answer = ResponseAnswer::new(Uuid::new_v4());
            assert_eq!(validate_response_answer(&answer), Ok(()));
        }

        #[test]
        fn test_nested_values_are_allowed() {
            let answer = ResponseAnswer::new(Uuid::new_v4())
                .with_value("en", json!(["red", "blue"]))
                .with_value("meta", json!({"score": 3, "flag": null}));
            assert_eq!(validate_response_answer(&answer), Ok(()));
        }

        #[test]
        fn test_blank_language_key() {
            let answer = ResponseAnswer::new(Uuid::new_v4()).with_value(" ", "hi");
            assert_eq!(
                validate_response_answer(&answer),
                Err(ValidationError::BlankValueKey)
            );
        }

        #[test]
        fn test_missing_field_id() {
            let answer = ResponseAnswer::new(Uuid::nil()).with_value("en", "hi");
            assert_eq!(
                validate_response_answer(&answer),
                Err(ValidationError::MissingFieldId)
            );
        }
    }

    mod vector_rules {
        use super::*;

        #[test]
        fn test_valid_vector_with_and_without_model() {
            let vector = ResponseAnswerVector::new(Uuid::new_v4(), vec![0.1, 0.2, 0.3]);
            assert_eq!(validate_response_answer_vector(&vector), Ok(()));

            let vector = vector.with_model(ModelName::Placeholder);
            assert_eq!(validate_response_answer_vector(&vector), Ok(()));
        }

        #[test]
        fn test_empty_embedding() {
            let vector = ResponseAnswerVector::new(Uuid::new_v4(), vec![]);
            assert_eq!(
                validate_response_answer_vector(&vector),
                Err(ValidationError::MissingEmbedding)
            );
        }

        #[test]
        fn test_missing_answer_reference() {
            let vector = ResponseAnswerVector::new(Uuid::nil(), vec![1.0]);
            assert_eq!(
                validate_response_answer_vector(&vector),
                Err(ValidationError::MissingResponseAnswerId)
            );
        }

        #[test]
        fn test_nan_component() {
            let vector = ResponseAnswerVector::new(Uuid::new_v4(), vec![0.1, f32::NAN]);
            assert_eq!(
                validate_response_answer_vector(&vector),
                Err(ValidationError::NonFiniteEmbedding { index: 1 })
            );
        }
    }
}
