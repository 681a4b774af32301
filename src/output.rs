//! Output formatting and persistence for pipeline results.
//!
//! Supports JSON run summaries in the log and atomic CSV writes.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::realtime::StopRecord;

/// Logs a run summary as JSON.
pub fn log_summary(label: &str, summary: &impl Serialize) -> Result<()> {
    info!(label, summary = %serde_json::to_string(summary)?, "Run summary");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes stop records as a CSV table with a header row.
///
/// The file is written next to `path` and renamed into place, so a failed
/// write never leaves a partial table behind.
pub fn write_stop_records(path: &Path, records: &[StopRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let written = (|| -> Result<()> {
        let file = File::create(&tmp)?;
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        // csv only emits the header alongside the first row
        if records.is_empty() {
            writer.write_record(STOP_RECORD_COLUMNS)?;
        }
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("writing {}", path.display()));
    }

    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), rows = records.len(), "Stop records written");
    Ok(())
}

/// Column order of the realtime output table.
pub const STOP_RECORD_COLUMNS: [&str; 8] = [
    "trip_id",
    "start_time",
    "start_date",
    "stop_id",
    "departure_time",
    "departure_delay",
    "arrival_time",
    "arrival_delay",
];
