//! Correction Re-validator.
//!
//! Applies user-submitted cell edits to a working copy of a stored snapshot,
//! re-checks only the edited cells, and either commits the whole batch (the
//! snapshot is consumed and a [`FinalDataset`] returned) or rejects it with
//! the new findings, leaving the stored snapshot exactly as it was.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    clean::Cleaner,
    data::{CellValue, Dataset, row_index},
    error::CorrectionError,
    io_utils,
    store::{SnapshotStore, SnapshotToken},
    validate::Orchestrator,
};

/// One edit; `row` is the row number as shown in the error report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Correction {
    pub row: usize,
    pub field: String,
    #[serde(rename = "value", alias = "new_value")]
    pub new_value: String,
}

impl Correction {
    pub fn new(row: usize, field: &str, new_value: &str) -> Self {
        Self {
            row,
            field: field.to_string(),
            new_value: new_value.to_string(),
        }
    }
}

/// Reads a `row,field,value` delimited file. Headers and fields are trimmed.
pub fn read_corrections(path: &Path, delimiter: Option<u8>) -> Result<Vec<Correction>> {
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
    let mut reader = io_utils::open_csv_reader_with_trim(path, delimiter, true, csv::Trim::All)?;
    reader
        .deserialize()
        .enumerate()
        .map(|(idx, record)| {
            record.with_context(|| format!("Reading correction on line {} of {path:?}", idx + 2))
        })
        .collect()
}

/// The committed dataset, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalDataset(Dataset);

impl FinalDataset {
    pub fn new(dataset: Dataset) -> Self {
        Self(dataset)
    }

    pub fn dataset(&self) -> &Dataset {
        &self.0
    }

    pub fn into_inner(self) -> Dataset {
        self.0
    }
}

pub struct CorrectionRevalidator<'a> {
    orchestrator: &'a Orchestrator<'a>,
    cleaner: &'a Cleaner<'a>,
}

impl<'a> CorrectionRevalidator<'a> {
    pub fn new(orchestrator: &'a Orchestrator<'a>, cleaner: &'a Cleaner<'a>) -> Self {
        Self {
            orchestrator,
            cleaner,
        }
    }

    pub fn apply_corrections(
        &self,
        store: &mut dyn SnapshotStore,
        token: &SnapshotToken,
        corrections: &[Correction],
    ) -> Result<FinalDataset, CorrectionError> {
        let mut working = store
            .get(token)?
            .ok_or(CorrectionError::SessionExpired(*token))?;

        // Cells in first-edit order.
        let mut touched: Vec<(usize, String)> = Vec::new();
        let mut seen: HashSet<(usize, &str)> = HashSet::new();
        for correction in corrections {
            let field = correction.field.trim();
            let Some(idx) = row_index(correction.row).filter(|idx| *idx < working.row_count())
            else {
                debug!(
                    "Ignoring correction for out-of-range row {} ('{field}')",
                    correction.row
                );
                continue;
            };
            let raw = CellValue::from(correction.new_value.as_str());
            let cleaned = self.cleaner.clean_cell(field, &raw);
            if !working.set_cell(idx, field, raw, cleaned) {
                warn!(
                    "Ignoring correction for unknown column '{field}' at row {}",
                    correction.row
                );
                continue;
            }
            if seen.insert((idx, field)) {
                touched.push((idx, field.to_string()));
            }
        }

        let errors = self.orchestrator.revalidate_cells(&working, &touched);
        if !errors.is_empty() {
            info!(
                "Rejected {} correction(s) for snapshot {token}: {} finding(s)",
                corrections.len(),
                errors.len()
            );
            return Err(CorrectionError::Rejected(errors));
        }

        store.remove(token)?;
        info!(
            "Committed {} corrected cell(s); snapshot {token} finalised",
            touched.len()
        );
        Ok(FinalDataset::new(working.into_cleaned()))
    }
}
