//! Error report output and final export naming.

use std::{
    fmt::Write as _,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    data::Dataset,
    error::{ErrorKind, ValidationError},
    io_utils,
};

const REPORT_HEADERS: [&str; 5] = ["Kind", "Row", "Field", "Message", "Current value"];

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    source: &'a str,
    summary: ReportSummary,
    errors: &'a [ValidationError],
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub structure: usize,
    pub validation: usize,
    pub system: usize,
}

impl ReportSummary {
    pub fn from_errors(errors: &[ValidationError]) -> Self {
        errors.iter().fold(Self::default(), |mut acc, error| {
            match error.kind {
                ErrorKind::Structure => acc.structure += 1,
                ErrorKind::Validation => acc.validation += 1,
                ErrorKind::System => acc.system += 1,
            }
            acc
        })
    }

    pub fn is_blocking(&self) -> bool {
        self.structure + self.validation > 0
    }
}

pub fn write_report_json(errors: &[ValidationError], source: &str, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
    let mut writer = BufWriter::new(file);
    let document = ReportDocument {
        source,
        summary: ReportSummary::from_errors(errors),
        errors,
    };
    serde_json::to_writer_pretty(&mut writer, &document).context("Writing report JSON")?;
    writer.flush().context("Flushing report file")?;
    Ok(())
}

/// Renders findings as an aligned plain-text table.
pub fn render_report(errors: &[ValidationError]) -> String {
    let rows = errors
        .iter()
        .map(|error| {
            [
                error.kind.to_string(),
                error.row.map(|r| r.to_string()).unwrap_or_default(),
                error.field.clone().unwrap_or_default(),
                single_line(&error.message),
                error
                    .current_value
                    .as_ref()
                    .map(|value| single_line(&value.to_string()))
                    .unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();

    let mut widths = REPORT_HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let header = REPORT_HEADERS.map(str::to_string);
    let rule = widths.map(|w| "-".repeat(w));
    for line in std::iter::once(&header)
        .chain(std::iter::once(&rule))
        .chain(rows.iter())
    {
        let rendered = line
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .join("  ");
        let _ = writeln!(output, "{}", rendered.trim_end());
    }
    output
}

fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect()
}

pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}.csv", date.format("%Y-%m-%d"))
}

/// Writes the final dataset into `dir` under today's export name.
pub fn export_final(dataset: &Dataset, dir: &Path, prefix: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Creating output directory {dir:?}"))?;
    let path = dir.join(export_file_name(prefix, Local::now().date_naive()));
    io_utils::write_dataset(dataset, Some(&path), io_utils::DEFAULT_CSV_DELIMITER)?;
    Ok(path)
}
