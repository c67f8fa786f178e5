use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{data::CurrentValue, store::SnapshotToken};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Dataset-level shape defect.
    Structure,
    /// Content defect in a single cell.
    Validation,
    /// An external dependency was unavailable; the affected rule is indeterminate.
    System,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Structure => "Structure",
            ErrorKind::Validation => "Validation",
            ErrorKind::System => "System",
        };
        f.write_str(label)
    }
}

/// One finding in an error report. Structure and System findings carry no
/// row or field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<CurrentValue>,
}

impl ValidationError {
    pub fn structure(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Structure,
            row: None,
            field: None,
            message: message.into(),
            current_value: None,
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::System,
            row: None,
            field: None,
            message: message.into(),
            current_value: None,
        }
    }

    pub fn cell(row: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            row: Some(row),
            field: Some(field.to_string()),
            message: message.into(),
            current_value: None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.row, self.field.as_deref()) {
            (Some(row), Some(field)) => {
                write!(f, "[{}] row {row}, '{field}': {}", self.kind, self.message)
            }
            _ => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupUnavailable {
    #[error("district lookup timed out after {0:?}")]
    TimedOut(Duration),
    #[error("district source unavailable: {0}")]
    Source(String),
}

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error(
        "No validation session found for token {0}; it has expired or was never created. Upload the original file again to restart validation"
    )]
    SessionExpired(SnapshotToken),
    #[error("{} correction error(s); no changes were applied", .0.len())]
    Rejected(Vec<ValidationError>),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
