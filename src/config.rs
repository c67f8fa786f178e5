//! Run configuration, loaded once at startup and passed by reference.
//!
//! Every field has a default matching the current pledge import rules, so a
//! missing or partial YAML file is valid:
//!
//! ```yaml
//! enforce_column_order: false
//! district_timeout_ms: 5000
//! opt_in:
//!   allowed: [Yes, No, Pending]
//!   mappings: { "1": "Yes", "0": "No" }
//!   not_applicable: [Nan]
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::schema::{FieldRule, RuleBinding};

pub const DEFAULT_COLUMNS: &[&str] = &[
    "Trinity Reference",
    "Sign up date",
    "Date verified by agency",
    "Title",
    "Forenames",
    "Surname",
    "Address_1",
    "Address_2",
    "Address_3",
    "Town",
    "District",
    "County",
    "Eircode",
    "Landline Tel",
    "Mobile Tel",
    "Email",
    "DOB",
    "Amount",
    "Frequency",
    "Debtor Name",
    "BIC",
    "IBAN",
    "Tax Status",
    "Post Opt-In",
    "Newsletter Opt-In",
    "Email Opt-In",
    "Phone Opt-In",
    "Field Representative Name",
    "Source",
    "Start Date",
    "Welcome Call",
    "Channel",
];

pub const DATE_COLUMNS: &[&str] = &["Sign up date", "Date verified by agency", "DOB", "Start Date"];

pub const OPT_IN_COLUMNS: &[&str] = &[
    "Post Opt-In",
    "Newsletter Opt-In",
    "Email Opt-In",
    "Phone Opt-In",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptInPolicy {
    /// Values accepted after cleaning.
    pub allowed: Vec<String>,
    /// Source encodings rewritten by the cleaning stage.
    pub mappings: BTreeMap<String, String>,
    /// Tokens meaning "no answer"; compared case-insensitively and skipped.
    pub not_applicable: Vec<String>,
}

impl Default for OptInPolicy {
    fn default() -> Self {
        Self {
            allowed: vec!["Yes".into(), "No".into(), "Pending".into()],
            mappings: BTreeMap::from([
                ("1".to_string(), "Yes".to_string()),
                ("0".to_string(), "No".to_string()),
            ]),
            not_applicable: vec!["Nan".into()],
        }
    }
}

impl OptInPolicy {
    pub fn map_source(&self, value: &str) -> Option<&str> {
        self.mappings.get(value).map(String::as_str)
    }

    pub fn is_allowed(&self, value: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == value)
    }

    pub fn is_not_applicable(&self, value: &str) -> bool {
        self.not_applicable
            .iter()
            .any(|token| token.eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    pub columns: Vec<String>,
    pub rules: Vec<RuleBinding>,
    pub enforce_column_order: bool,
    pub opt_in: OptInPolicy,
    pub district_timeout_ms: u64,
    pub snapshot_dir: PathBuf,
    pub snapshot_max_age_secs: u64,
    pub export_prefix: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rules: default_rules(),
            enforce_column_order: false,
            opt_in: OptInPolicy::default(),
            district_timeout_ms: 5_000,
            snapshot_dir: PathBuf::from("snapshots"),
            snapshot_max_age_secs: 24 * 60 * 60,
            export_prefix: "Pledge_Import".to_string(),
        }
    }
}

impl ValidatorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: ValidatorConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn ensure_valid(&self) -> Result<()> {
        ensure!(!self.columns.is_empty(), "Config must list at least one column");
        for binding in &self.rules {
            ensure!(
                self.columns.contains(&binding.column),
                "Rule {:?} is bound to '{}' which is not a configured column",
                binding.rule,
                binding.column
            );
        }
        ensure!(
            !self.opt_in.allowed.is_empty(),
            "Opt-in policy must allow at least one value"
        );
        Ok(())
    }

    pub fn district_timeout(&self) -> Duration {
        Duration::from_millis(self.district_timeout_ms)
    }

    pub fn snapshot_max_age(&self) -> Duration {
        Duration::from_secs(self.snapshot_max_age_secs)
    }
}

fn default_rules() -> Vec<RuleBinding> {
    let mut rules = vec![
        RuleBinding::new("IBAN", FieldRule::Iban),
        RuleBinding::new("BIC", FieldRule::Bic),
    ];
    rules.extend(DATE_COLUMNS.iter().map(|c| RuleBinding::new(c, FieldRule::Date)));
    rules.extend(OPT_IN_COLUMNS.iter().map(|c| RuleBinding::new(c, FieldRule::OptIn)));
    rules.push(RuleBinding::new("Eircode", FieldRule::Eircode));
    rules.push(RuleBinding::new("District", FieldRule::District));
    rules
}
