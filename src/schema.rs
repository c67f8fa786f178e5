//! Schema Descriptor: the canonical ordered column list and the validation
//! rule bound to each checked column.
//!
//! The structure check is a pure function over the dataset's header row. It
//! reports missing and unexpected columns as one finding each, duplicated
//! headers, and (only when configured) column order.

use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{config::ValidatorConfig, data::Dataset, error::ValidationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    Iban,
    Bic,
    Date,
    OptIn,
    Eircode,
    District,
}

/// Validator families in the order their findings are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidatorFamily {
    BankDetails,
    Dates,
    OptIns,
    Eircode,
    District,
}

impl ValidatorFamily {
    pub const ORDER: [ValidatorFamily; 5] = [
        ValidatorFamily::BankDetails,
        ValidatorFamily::Dates,
        ValidatorFamily::OptIns,
        ValidatorFamily::Eircode,
        ValidatorFamily::District,
    ];
}

impl FieldRule {
    pub fn family(self) -> ValidatorFamily {
        match self {
            FieldRule::Iban | FieldRule::Bic => ValidatorFamily::BankDetails,
            FieldRule::Date => ValidatorFamily::Dates,
            FieldRule::OptIn => ValidatorFamily::OptIns,
            FieldRule::Eircode => ValidatorFamily::Eircode,
            FieldRule::District => ValidatorFamily::District,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldRule::Iban => "iban",
            FieldRule::Bic => "bic",
            FieldRule::Date => "date",
            FieldRule::OptIn => "opt-in",
            FieldRule::Eircode => "eircode",
            FieldRule::District => "district",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleBinding {
    pub column: String,
    pub rule: FieldRule,
}

impl RuleBinding {
    pub fn new(column: &str, rule: FieldRule) -> Self {
        Self {
            column: column.to_string(),
            rule,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    columns: Vec<String>,
    bindings: Vec<RuleBinding>,
    enforce_order: bool,
}

impl SchemaDescriptor {
    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self {
            columns: config.columns.clone(),
            bindings: config.rules.clone(),
            enforce_order: config.enforce_column_order,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rule_for(&self, column: &str) -> Option<FieldRule> {
        self.bindings
            .iter()
            .find(|binding| binding.column == column)
            .map(|binding| binding.rule)
    }

    /// Columns bound to rules of `family`, in binding order.
    pub fn columns_in_family(
        &self,
        family: ValidatorFamily,
    ) -> impl Iterator<Item = &RuleBinding> + '_ {
        self.bindings
            .iter()
            .filter(move |binding| binding.rule.family() == family)
    }

    pub fn check_structure(&self, dataset: &Dataset) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let present: HashSet<&str> = dataset.columns.iter().map(String::as_str).collect();

        let missing = self
            .columns
            .iter()
            .filter(|column| !present.contains(column.as_str()))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            errors.push(ValidationError::structure(format!(
                "Missing columns: {}",
                missing.iter().join(", ")
            )));
        }

        let unexpected = dataset
            .columns
            .iter()
            .filter(|column| !self.columns.contains(column))
            .unique()
            .collect::<Vec<_>>();
        if !unexpected.is_empty() {
            errors.push(ValidationError::structure(format!(
                "Unexpected columns: {}",
                unexpected.iter().join(", ")
            )));
        }

        let duplicated = dataset.columns.iter().duplicates().collect::<Vec<_>>();
        if !duplicated.is_empty() {
            errors.push(ValidationError::structure(format!(
                "Duplicate columns: {}",
                duplicated.iter().join(", ")
            )));
        }

        if self.enforce_order
            && missing.is_empty()
            && unexpected.is_empty()
            && dataset.columns != self.columns
        {
            errors.push(ValidationError::structure(
                "Columns are not in the correct order",
            ));
        }

        errors
    }
}
