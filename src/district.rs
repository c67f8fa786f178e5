//! District Lookup Provider.
//!
//! The CRM's district table is reached through the [`DistrictLookup`] trait.
//! Any failure surfaces as [`LookupUnavailable`]; [`TimeoutLookup`] bounds how
//! long a run can wait on a slow provider.

use std::{
    collections::HashSet,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use log::{debug, warn};

use crate::error::LookupUnavailable;

/// Column read from a district export with a header row.
pub const DISTRICT_NAME_COLUMN: &str = "district_name";

pub trait DistrictLookup: Send + Sync {
    fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable>;
}

/// District names compared trimmed and case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistrictSet {
    names: HashSet<String>,
}

impl DistrictSet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalise(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for DistrictSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let names = iter
            .into_iter()
            .map(|name| normalise(name.as_ref()))
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }
}

fn normalise(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Fixed in-memory district list.
#[derive(Debug, Clone, Default)]
pub struct StaticDistricts(DistrictSet);

impl StaticDistricts {
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Self(names.into_iter().collect())
    }
}

impl DistrictLookup for StaticDistricts {
    fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
        Ok(self.0.clone())
    }
}

/// Stand-in when no district source was supplied; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl DistrictLookup for Unconfigured {
    fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
        Err(LookupUnavailable::Source(
            "no district source configured".to_string(),
        ))
    }
}

/// Reads districts from a CSV export of the CRM table. Uses the
/// `district_name` column when present, otherwise the first column.
#[derive(Debug, Clone)]
pub struct FileDistricts {
    path: PathBuf,
}

impl FileDistricts {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl DistrictLookup for FileDistricts {
    fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
        let unavailable = |err: &dyn std::fmt::Display| {
            LookupUnavailable::Source(format!("{}: {err}", self.path.display()))
        };
        let file = File::open(&self.path).map_err(|e| unavailable(&e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));
        let headers = reader.headers().map_err(|e| unavailable(&e))?.clone();
        let mut names = Vec::new();
        let column = match headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(DISTRICT_NAME_COLUMN))
        {
            Some(column) => column,
            None => {
                // Headerless export: the first line is itself a district.
                if let Some(first) = headers.get(0) {
                    names.push(first.to_string());
                }
                0
            }
        };
        for record in reader.records() {
            let record = record.map_err(|e| unavailable(&e))?;
            if let Some(name) = record.get(column) {
                names.push(name.to_string());
            }
        }
        let set: DistrictSet = names.into_iter().collect();
        debug!("Loaded {} district(s) from {:?}", set.len(), self.path);
        Ok(set)
    }
}

/// Runs the inner lookup on a worker thread and gives up after `timeout`.
/// A timed-out worker is detached; its result is discarded.
pub struct TimeoutLookup {
    inner: Arc<dyn DistrictLookup>,
    timeout: Duration,
}

impl TimeoutLookup {
    pub fn new(inner: Arc<dyn DistrictLookup>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl DistrictLookup for TimeoutLookup {
    fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name("district-lookup".to_string())
            .spawn(move || {
                let _ = tx.send(inner.fetch_valid_districts());
            })
            .map_err(|e| LookupUnavailable::Source(format!("spawning lookup worker: {e}")))?;
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("District lookup exceeded {:?}", self.timeout);
                Err(LookupUnavailable::TimedOut(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(LookupUnavailable::Source(
                "lookup worker exited without a result".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Stalled(Duration);

    impl DistrictLookup for Stalled {
        fn fetch_valid_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
            thread::sleep(self.0);
            Ok(DistrictSet::default())
        }
    }

    #[test]
    fn membership_ignores_case_and_padding() {
        let set: DistrictSet = ["Dublin North", " Cork "].into_iter().collect();
        assert!(set.contains("dublin north"));
        assert!(set.contains("  CORK"));
        assert!(!set.contains("Galway"));
    }

    #[test]
    fn file_lookup_reads_named_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("districts.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "id,district_name").unwrap();
        writeln!(file, "1,Dublin North").unwrap();
        writeln!(file, "2,Cork").unwrap();

        let set = FileDistricts::new(&path).fetch_valid_districts().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("Cork"));
        assert!(!set.contains("1"));
    }

    #[test]
    fn file_lookup_accepts_plain_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("districts.txt");
        std::fs::write(&path, "Dublin North\nCork\n").unwrap();

        let set = FileDistricts::new(&path).fetch_valid_districts().unwrap();
        assert!(set.contains("Dublin North"));
        assert!(set.contains("Cork"));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = FileDistricts::new(Path::new("/nonexistent/districts.csv"))
            .fetch_valid_districts()
            .unwrap_err();
        assert!(matches!(err, LookupUnavailable::Source(_)));
    }

    #[test]
    fn slow_provider_times_out() {
        let lookup = TimeoutLookup::new(
            Arc::new(Stalled(Duration::from_millis(500))),
            Duration::from_millis(20),
        );
        assert_eq!(
            lookup.fetch_valid_districts().unwrap_err(),
            LookupUnavailable::TimedOut(Duration::from_millis(20))
        );
    }

    #[test]
    fn fast_provider_passes_through_timeout_wrapper() {
        let lookup = TimeoutLookup::new(
            Arc::new(StaticDistricts::new(["Kerry"])),
            Duration::from_secs(2),
        );
        assert!(lookup.fetch_valid_districts().unwrap().contains("kerry"));
    }
}
