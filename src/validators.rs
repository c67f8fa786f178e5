//! Field validators.
//!
//! Each family is a pure function over a [`CleanedSnapshot`], one column and a
//! [`RowScope`], so the same check serves a full report and a single
//! corrected cell. Missing cells are skipped except for dates. Messages quote
//! the raw value as it appeared in the source file.

use std::sync::OnceLock;

use itertools::Itertools;
use regex::Regex;

use crate::{
    clean::CleanedSnapshot,
    config::OptInPolicy,
    data::{CellValue, reported_row},
    district::DistrictSet,
    error::{LookupUnavailable, ValidationError},
    schema::FieldRule,
};

pub const DISTRICT_SYSTEM_MESSAGE: &str = "Unable to validate Districts due to a database error";

/// Which rows a validator visits (0-based dataset positions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowScope {
    All,
    Rows(Vec<usize>),
}

impl RowScope {
    pub fn single(row: usize) -> Self {
        RowScope::Rows(vec![row])
    }

    fn indices(&self, row_count: usize) -> Vec<usize> {
        match self {
            RowScope::All => (0..row_count).collect(),
            RowScope::Rows(rows) => rows.iter().copied().filter(|r| *r < row_count).collect(),
        }
    }
}

/// Inputs a rule may need beyond the dataset itself.
pub struct RuleContext<'a> {
    pub opt_in: &'a OptInPolicy,
    pub districts: Option<&'a Result<DistrictSet, LookupUnavailable>>,
}

pub fn check_rule(
    rule: FieldRule,
    snapshot: &CleanedSnapshot,
    field: &str,
    scope: &RowScope,
    ctx: &RuleContext<'_>,
) -> Vec<ValidationError> {
    match rule {
        FieldRule::Iban => check_iban(snapshot, field, scope),
        FieldRule::Bic => check_bic(snapshot, field, scope),
        FieldRule::Date => check_date(snapshot, field, scope),
        FieldRule::OptIn => check_opt_in(snapshot, field, scope, ctx.opt_in),
        FieldRule::Eircode => check_eircode(snapshot, field, scope),
        FieldRule::District => match ctx.districts {
            Some(districts) => check_district(snapshot, field, scope, districts),
            None => vec![ValidationError::system(DISTRICT_SYSTEM_MESSAGE)],
        },
    }
}

fn iban_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^IE\d{2}[A-Z0-9]{4}\d{14}$").expect("IBAN pattern"))
}

fn bic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{6}[A-Z0-9]{2}([A-Z0-9]{3})?$").expect("BIC pattern"))
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern"))
}

fn eircode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^[A-Z0-9]{3} [A-Z0-9]{4}$").expect("Eircode pattern"))
}

/// Visits present cells of `field` in scope; `check` returns a message
/// fragment for a defective value.
fn scan<F>(
    snapshot: &CleanedSnapshot,
    field: &str,
    scope: &RowScope,
    mut check: F,
) -> Vec<ValidationError>
where
    F: FnMut(&CellValue) -> Option<String>,
{
    let dataset = snapshot.cleaned();
    if !dataset.has_column(field) {
        return Vec::new();
    }
    scope
        .indices(dataset.row_count())
        .into_iter()
        .filter_map(|idx| {
            let value = dataset.cell(idx, field)?;
            let problem = check(value)?;
            let row = reported_row(idx);
            let raw = snapshot.raw_display(idx, field);
            Some(ValidationError::cell(
                row,
                field,
                format!("Row {row}, {field}: {problem} (value: '{raw}')"),
            ))
        })
        .collect()
}

pub fn check_iban(snapshot: &CleanedSnapshot, field: &str, scope: &RowScope) -> Vec<ValidationError> {
    scan(snapshot, field, scope, |value| {
        if value.is_missing() {
            return None;
        }
        let compact: String = value
            .as_display()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        (!iban_pattern().is_match(&compact)).then(|| {
            "Invalid IBAN format, expected IE + 2 digits + 4 letters/digits + 14 digits"
                .to_string()
        })
    })
}

pub fn check_bic(snapshot: &CleanedSnapshot, field: &str, scope: &RowScope) -> Vec<ValidationError> {
    scan(snapshot, field, scope, |value| {
        if value.is_missing() {
            return None;
        }
        (!bic_pattern().is_match(value.as_display().trim())).then(|| {
            "Invalid BIC format, expected 6 letters + 2 letters/digits + optional 3 letters/digits"
                .to_string()
        })
    })
}

pub fn check_date(snapshot: &CleanedSnapshot, field: &str, scope: &RowScope) -> Vec<ValidationError> {
    scan(snapshot, field, scope, |value| match value {
        CellValue::Date(_) => None,
        v if v.is_missing() => Some("Missing date value".to_string()),
        v => (!date_pattern().is_match(v.as_display().trim()))
            .then(|| "Invalid date format, expected YYYY-MM-DD".to_string()),
    })
}

pub fn check_opt_in(
    snapshot: &CleanedSnapshot,
    field: &str,
    scope: &RowScope,
    policy: &OptInPolicy,
) -> Vec<ValidationError> {
    scan(snapshot, field, scope, |value| {
        if value.is_missing() {
            return None;
        }
        let text = value.as_display();
        let text = text.trim();
        if policy.is_allowed(text) || policy.is_not_applicable(text) {
            return None;
        }
        Some(format!(
            "Invalid opt-in value, allowed: {}",
            policy.allowed.iter().join(", ")
        ))
    })
}

pub fn check_eircode(
    snapshot: &CleanedSnapshot,
    field: &str,
    scope: &RowScope,
) -> Vec<ValidationError> {
    scan(snapshot, field, scope, |value| {
        if value.is_missing() {
            return None;
        }
        let collapsed = value.as_display().split_whitespace().join(" ");
        (!eircode_pattern().is_match(&collapsed))
            .then(|| "Invalid Eircode format, expected A11 AA11".to_string())
    })
}

/// A failed lookup yields exactly one System finding regardless of size.
pub fn check_district(
    snapshot: &CleanedSnapshot,
    field: &str,
    scope: &RowScope,
    districts: &Result<DistrictSet, LookupUnavailable>,
) -> Vec<ValidationError> {
    let districts = match districts {
        Ok(districts) => districts,
        Err(_) => return vec![ValidationError::system(DISTRICT_SYSTEM_MESSAGE)],
    };
    scan(snapshot, field, scope, |value| {
        if value.is_missing() || districts.contains(&value.as_display()) {
            return None;
        }
        Some("Unknown district".to_string())
    })
}
