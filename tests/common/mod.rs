#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use pledge_validator::{
    clean::{CleanedSnapshot, Cleaner},
    config::{DEFAULT_COLUMNS, ValidatorConfig},
    data::{CellValue, Dataset},
    district::{DistrictLookup, DistrictSet, StaticDistricts},
    error::LookupUnavailable,
    schema::SchemaDescriptor,
};
use tempfile::{TempDir, tempdir};

pub const KNOWN_DISTRICTS: [&str; 3] = ["Kerry North", "Dublin North", "Cork City"];

/// One pledge row that passes every check, keyed by column name.
pub const VALID_PLEDGE: [(&str, &str); 32] = [
    ("Trinity Reference", "TR-0001"),
    ("Sign up date", "2024-03-01"),
    ("Date verified by agency", "02/03/2024"),
    ("Title", "Mr"),
    ("Forenames", "Sean"),
    ("Surname", "Murphy"),
    ("Address_1", "1 Main Street"),
    ("Address_2", ""),
    ("Address_3", ""),
    ("Town", "Tralee"),
    ("District", "Kerry North"),
    ("County", "Kerry"),
    ("Eircode", "V92 XK27"),
    ("Landline Tel", ""),
    ("Mobile Tel", "0871234567"),
    ("Email", "sean@example.ie"),
    ("DOB", "1980-04-03"),
    ("Amount", "21"),
    ("Frequency", "Monthly"),
    ("Debtor Name", "Sean Murphy"),
    ("BIC", "AIBKIE2D"),
    ("IBAN", "IE29AIBK93115212345678"),
    ("Tax Status", "PAYE"),
    ("Post Opt-In", "1"),
    ("Newsletter Opt-In", "0"),
    ("Email Opt-In", "Yes"),
    ("Phone Opt-In", "Pending"),
    ("Field Representative Name", "Aoife"),
    ("Source", "F2F"),
    ("Start Date", "2024-04-01"),
    ("Welcome Call", "Yes"),
    ("Channel", "Street"),
];

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn write_districts(&self) -> PathBuf {
        let mut contents = String::from("id,district_name\n");
        for (idx, name) in KNOWN_DISTRICTS.iter().enumerate() {
            contents.push_str(&format!("{},{name}\n", idx + 1));
        }
        self.write("districts.csv", &contents)
    }

    /// Files in `dir` (relative to the workspace) whose names start with `prefix`.
    pub fn files_with_prefix(&self, dir: &str, prefix: &str) -> Vec<PathBuf> {
        let target = self.path().join(dir);
        let Ok(entries) = std::fs::read_dir(&target) else {
            return Vec::new();
        };
        let mut found = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .collect::<Vec<_>>();
        found.sort();
        found
    }
}

/// A valid pledge row with the given cells overridden.
pub fn pledge_row(overrides: &[(&str, &str)]) -> Vec<(String, String)> {
    VALID_PLEDGE
        .iter()
        .map(|(column, value)| {
            let value = overrides
                .iter()
                .find(|(c, _)| c == column)
                .map(|(_, v)| *v)
                .unwrap_or(*value);
            (column.to_string(), value.to_string())
        })
        .collect()
}

/// Raw dataset over the default columns; one row per override set.
pub fn pledge_dataset(rows: &[&[(&str, &str)]]) -> Dataset {
    let mut dataset = Dataset::new(DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect());
    for overrides in rows {
        dataset.push_row(
            pledge_row(overrides)
                .into_iter()
                .map(|(_, value)| CellValue::from(value.as_str()))
                .collect(),
        );
    }
    dataset
}

/// Same rows as [`pledge_dataset`] rendered as CSV text.
pub fn pledge_csv(rows: &[&[(&str, &str)]]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(DEFAULT_COLUMNS).expect("header");
    for overrides in rows {
        writer
            .write_record(pledge_row(overrides).into_iter().map(|(_, value)| value))
            .expect("row");
    }
    String::from_utf8(writer.into_inner().expect("flush")).expect("utf-8")
}

pub fn clean(dataset: Dataset, config: &ValidatorConfig) -> CleanedSnapshot {
    let schema = SchemaDescriptor::from_config(config);
    Cleaner::new(&schema, config).clean(dataset)
}

pub fn known_districts() -> StaticDistricts {
    StaticDistricts::new(KNOWN_DISTRICTS)
}

/// Lookup that always reports the CRM as unreachable.
pub struct FailingDistricts;

impl DistrictLookup for FailingDistricts {
    fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
        Err(LookupUnavailable::Source("connection refused".to_string()))
    }
}
