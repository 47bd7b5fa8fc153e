//! form-intake - transactional submission pipeline for multi-field forms
//!
//! Operators author forms and their fields; respondents submit responses
//! whose answers, and optional answer embeddings, are validated against the
//! form and written as one atomic unit.

pub mod config;
pub mod domain;
pub mod error;
pub mod fixture;
pub mod service;
pub mod store;
pub mod validation;

pub use error::{Error, ErrorKind, Result, ValidationError};
