//! Use cases composed from the validators and the persistence gateway
//!
//! Services hold their stores as `Arc<dyn ...>` so the binary can wire the
//! memory backend and tests can swap in mocks.

mod forms;
mod submission;

pub use forms::{FormFieldService, FormService};
pub use submission::ResponseService;

use crate::error::{Result, ValidationError};
use uuid::Uuid;

/// Reject the nil id before touching any store
fn require_id(id: Uuid, id_kind: &'static str) -> Result<()> {
    if id.is_nil() {
        return Err(ValidationError::MissingId { id_kind }.into());
    }
    Ok(())
}
