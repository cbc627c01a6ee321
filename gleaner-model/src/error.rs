use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidRunId(String),
    EmptyLabel,
    EmptyReplacement { label: String },
    ReplacementTooLong { label: String, length: usize },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidRunId(raw) => {
                write!(f, "invalid run id: {raw}")
            }
            ModelError::EmptyLabel => {
                write!(f, "replacement source label must not be empty")
            }
            ModelError::EmptyReplacement { label } => {
                write!(f, "replacement for '{label}' must not be empty")
            }
            ModelError::ReplacementTooLong { label, length } => write!(
                f,
                "replacement for '{label}' is {length} characters; \
                 it must be shorter than {}",
                crate::replacements::LABEL_LENGTH_LIMIT
            ),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
