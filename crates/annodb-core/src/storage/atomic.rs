//! Atomic file replacement

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Write `data` to `path` so readers see either the old file or the new one
///
/// The bytes go to a sibling temp file which is synced and then renamed over
/// the target.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::from_write_io(e, parent.to_path_buf()))?;
    }

    let temp_path = temp_path_for(path);

    let result = write_and_sync(&temp_path, data)
        .and_then(|()| fs::rename(&temp_path, path))
        .map_err(|e| Error::from_write_io(e, path.to_path_buf()));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_sync(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// `notes.json` -> `.notes.json.tmp` in the same directory
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
