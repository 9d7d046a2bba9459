//! Write-path validation shared by every catalog record.

use super::RecordId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Domain validation errors raised before any record is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    /// `name` is empty or whitespace only.
    BlankName { model: &'static str },
    /// A caller-assigned id must be a positive rowid.
    NonPositiveId { model: &'static str, id: RecordId },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName { model } => write!(f, "{model} name must not be blank"),
            Self::NonPositiveId { model, id } => {
                write!(f, "{model} id must be positive, got {id}")
            }
        }
    }
}

impl Error for RecordValidationError {}

pub(crate) fn ensure_name(model: &'static str, name: &str) -> Result<(), RecordValidationError> {
    if name.trim().is_empty() {
        return Err(RecordValidationError::BlankName { model });
    }
    Ok(())
}

pub(crate) fn ensure_id(
    model: &'static str,
    id: Option<RecordId>,
) -> Result<(), RecordValidationError> {
    match id {
        Some(id) if id <= 0 => Err(RecordValidationError::NonPositiveId { model, id }),
        _ => Ok(()),
    }
}
