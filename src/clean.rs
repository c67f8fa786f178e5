//! Cleaning Stage.
//!
//! Produces a [`CleanedSnapshot`] holding both the raw dataset (for quoting
//! offending values verbatim) and its normalised form. Cleaning never fails:
//! a cell that cannot be normalised degrades to [`CellValue::Empty`].

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    config::{OptInPolicy, ValidatorConfig},
    data::{CellValue, Dataset, excel_serial_to_date, parse_naive_date},
    schema::{FieldRule, SchemaDescriptor},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanedSnapshot {
    raw: Dataset,
    cleaned: Dataset,
}

impl CleanedSnapshot {
    pub fn raw(&self) -> &Dataset {
        &self.raw
    }

    pub fn cleaned(&self) -> &Dataset {
        &self.cleaned
    }

    pub fn row_count(&self) -> usize {
        self.cleaned.row_count()
    }

    /// Raw cell text for messages; falls back to the cleaned value when the
    /// raw view has no such cell.
    pub fn raw_display(&self, row: usize, field: &str) -> String {
        self.raw
            .cell(row, field)
            .or_else(|| self.cleaned.cell(row, field))
            .map(CellValue::as_display)
            .unwrap_or_default()
    }

    /// Writes a user-submitted value: `raw` receives the text as submitted,
    /// `cleaned` its normalised form. Returns false if the cell does not exist.
    pub(crate) fn set_cell(
        &mut self,
        row: usize,
        field: &str,
        raw: CellValue,
        cleaned: CellValue,
    ) -> bool {
        match self.cleaned.cell_mut(row, field) {
            Some(cell) => *cell = cleaned,
            None => return false,
        }
        if let Some(cell) = self.raw.cell_mut(row, field) {
            *cell = raw;
        }
        true
    }

    pub fn into_cleaned(self) -> Dataset {
        self.cleaned
    }
}

pub struct Cleaner<'a> {
    schema: &'a SchemaDescriptor,
    opt_in: &'a OptInPolicy,
}

impl<'a> Cleaner<'a> {
    pub fn new(schema: &'a SchemaDescriptor, config: &'a ValidatorConfig) -> Self {
        Self {
            schema,
            opt_in: &config.opt_in,
        }
    }

    pub fn clean(&self, mut raw: Dataset) -> CleanedSnapshot {
        for column in raw.columns.iter_mut() {
            let trimmed = column.trim();
            if trimmed.len() != column.len() {
                *column = trimmed.to_string();
            }
        }

        let rules = raw
            .columns
            .iter()
            .map(|column| self.schema.rule_for(column))
            .collect::<Vec<_>>();
        let mut cleaned = Dataset::new(raw.columns.clone());
        let mut degraded = 0usize;
        for row in &raw.rows {
            let cells = row
                .iter()
                .zip(&rules)
                .map(|(value, rule)| {
                    let normalised = self.clean_value(*rule, value);
                    if normalised.is_missing() && !value.is_missing() {
                        degraded += 1;
                    }
                    normalised
                })
                .collect();
            cleaned.push_row(cells);
        }
        info!(
            "Cleaned {} row(s) across {} column(s); {} cell(s) could not be normalised",
            cleaned.row_count(),
            cleaned.columns.len(),
            degraded
        );
        CleanedSnapshot { raw, cleaned }
    }

    /// Normalises a single value destined for `field`.
    pub fn clean_cell(&self, field: &str, value: &CellValue) -> CellValue {
        self.clean_value(self.schema.rule_for(field), value)
    }

    fn clean_value(&self, rule: Option<FieldRule>, value: &CellValue) -> CellValue {
        match rule {
            Some(FieldRule::Date) => clean_date(value),
            Some(FieldRule::OptIn) => self.clean_opt_in(value),
            Some(FieldRule::Eircode) => clean_eircode(value),
            _ => trim_cell(value),
        }
    }

    fn clean_opt_in(&self, value: &CellValue) -> CellValue {
        let text = match value {
            CellValue::String(s) => s.trim().to_string(),
            CellValue::Number(_) => value.as_display(),
            other => return other.clone(),
        };
        match self.opt_in.map_source(&text) {
            Some(mapped) => CellValue::String(mapped.to_string()),
            None if text.is_empty() => CellValue::Empty,
            None => CellValue::String(text),
        }
    }
}

fn trim_cell(value: &CellValue) -> CellValue {
    match value {
        CellValue::String(s) => CellValue::from(s.trim()),
        other => other.clone(),
    }
}

fn clean_date(value: &CellValue) -> CellValue {
    let parsed = match value {
        CellValue::Date(date) => Some(*date),
        CellValue::Number(serial) => excel_serial_to_date(*serial),
        CellValue::String(s) => parse_naive_date(s).ok(),
        CellValue::Empty => None,
    };
    match parsed {
        Some(date) => CellValue::Date(date),
        None => {
            if !value.is_missing() {
                debug!("Unparseable date '{value}' normalised to missing");
            }
            CellValue::Empty
        }
    }
}

fn clean_eircode(value: &CellValue) -> CellValue {
    let text = match value {
        CellValue::String(s) => s.as_str(),
        CellValue::Empty => return CellValue::Empty,
        other => return CellValue::from(other.as_display().to_uppercase().as_str()),
    };
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    CellValue::from(collapsed.to_uppercase().as_str())
}
