//! Extraction of the downloaded schedule archive.

use std::fs::{self, File};
use std::path::Path;

use tracing::info;

use crate::error::FetchError;

/// Extracts every entry of the zip at `zip_path` into `dest`, creating it
/// if needed. Entries with paths escaping `dest` are rejected by `zip`.
#[tracing::instrument(fields(zip = %zip_path.display(), dest = %dest.display()), skip_all)]
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, FetchError> {
    fs::create_dir_all(dest)?;
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let entries = archive.len();
    archive.extract(dest)?;
    info!(entries, "Archive extracted");
    Ok(entries)
}

/// Writes `bytes` to `zip_path`, extracts it into `dest` and removes the zip.
pub fn unpack_download(bytes: &[u8], zip_path: &Path, dest: &Path) -> Result<usize, FetchError> {
    fs::write(zip_path, bytes)?;
    let extracted = extract_zip(zip_path, dest);
    fs::remove_file(zip_path)?;
    extracted
}
