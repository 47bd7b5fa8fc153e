//! Entity model
//!
//! Forms own their fields; responses own their answers and, through the
//! answers, any embedding vectors.

mod enums;
mod form;
mod response;

pub use enums::{FieldType, FormStatus, ModelName, ResponseStatus};
pub use form::{localized, Form, FormField, LocalizedText, FALLBACK_LANGUAGE};
pub use response::{Response, ResponseAnswer, ResponseAnswerVector};
