//! Naming of per-run files and directories.
//!
//! Each run is keyed by its wall-clock start time: static runs by day,
//! realtime runs by minute.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

pub const STATIC_RUN_FORMAT: &str = "%Y%m%d";
pub const REALTIME_RUN_FORMAT: &str = "%Y%m%d_%H%M";

/// Paths used by one static run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRun {
    /// Where the archive is extracted: `<root>/<YYYYMMDD>`.
    pub extract_dir: PathBuf,
    /// The downloaded archive: `<root>/<YYYYMMDD>.zip`.
    pub zip_path: PathBuf,
    /// Where reduced tables are written: `<root>/<YYYYMMDD>_reduced`.
    pub reduced_dir: PathBuf,
}

impl StaticRun {
    pub fn new(root: &Path, started: NaiveDateTime) -> Self {
        let name = started.format(STATIC_RUN_FORMAT).to_string();
        Self {
            extract_dir: root.join(&name),
            zip_path: root.join(format!("{name}.zip")),
            reduced_dir: root.join(format!("{name}_reduced")),
        }
    }
}

/// Paths used by one realtime run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeRun {
    /// The raw snapshot bytes: `<root>/<YYYYMMDD_HHMM>`.
    pub raw_path: PathBuf,
    /// The flattened table: `<root>/<YYYYMMDD_HHMM>.csv`.
    pub csv_path: PathBuf,
}

impl RealtimeRun {
    pub fn new(root: &Path, started: NaiveDateTime) -> Self {
        let name = started.format(REALTIME_RUN_FORMAT).to_string();
        Self {
            raw_path: root.join(&name),
            csv_path: root.join(format!("{name}.csv")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 7)
            .unwrap()
    }

    #[test]
    fn test_static_run_paths() {
        let run = StaticRun::new(Path::new("data/static"), at(3, 0));
        assert_eq!(run.extract_dir, PathBuf::from("data/static/20240301"));
        assert_eq!(run.zip_path, PathBuf::from("data/static/20240301.zip"));
        assert_eq!(run.reduced_dir, PathBuf::from("data/static/20240301_reduced"));
    }

    #[test]
    fn test_realtime_run_paths() {
        let run = RealtimeRun::new(Path::new("data/rt"), at(9, 5));
        assert_eq!(run.raw_path, PathBuf::from("data/rt/20240301_0905"));
        assert_eq!(run.csv_path, PathBuf::from("data/rt/20240301_0905.csv"));
    }
}
