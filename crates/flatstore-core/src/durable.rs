//! Durable writer: whole-file atomic rewrite via temp file + rename.
//!
//! 1. Write header and rows to a sibling staging file (`<target><suffix>`)
//! 2. Flush, and with `Durability::Full` sync the staging file
//! 3. Rename the staging file over the target (atomic on POSIX and NTFS)
//! 4. With `Durability::Full`, sync the parent directory
//!
//! A concurrent reader of the target sees either the old file or the new one,
//! never a mix. If a step before the rename fails, the target is untouched and
//! the staging file is removed.
//!
//! The writer holds no locks. Callers serialize rewrites of one target.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::encode_table;
use crate::config::Durability;
use crate::error::{StoreError, StoreResult};
use crate::platform_durability::{durable_sync, sync_parent_dir};

/// Staging path for `target`: same directory, `suffix` appended to the file name.
pub fn temp_path_for(target: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// A fully written, not yet renamed copy of a table file.
///
/// Dropping an uncommitted `StagedFile` removes the staging file.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    durability: Durability,
    committed: bool,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Rename the staging file onto the target.
    pub fn commit(mut self) -> StoreResult<()> {
        fs::rename(&self.temp, &self.target)
            .map_err(|e| StoreError::io(&self.target, &e, "Failed to rename staged file"))?;
        self.committed = true;

        // The new contents are already visible; a failed directory sync only
        // weakens power-loss durability, so it is reported and not returned.
        if self.durability == Durability::Full {
            if let Err(e) = sync_parent_dir(&self.target) {
                warn!(path = %self.target.display(), error = %e, "directory sync after rename failed");
            }
        }
        debug!(path = %self.target.display(), "table file replaced");
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Write `header` and `rows` to the staging file for `target`, leaving the
/// target untouched.
pub fn stage<I, S>(
    target: &Path,
    suffix: &str,
    header: &str,
    rows: I,
    durability: Durability,
) -> StoreResult<StagedFile>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let staged = StagedFile {
        temp: temp_path_for(target, suffix),
        target: target.to_path_buf(),
        durability,
        committed: false,
    };
    let body = encode_table(header, rows);

    let file = File::create(&staged.temp)
        .map_err(|e| StoreError::io(&staged.temp, &e, "Failed to create staging file"))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(body.as_bytes())
        .map_err(|e| StoreError::io(&staged.temp, &e, "Failed to write staging file"))?;
    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io(&staged.temp, e.error(), "Failed to flush staging file"))?;

    if durability == Durability::Full {
        durable_sync(&file).map_err(|e| StoreError::io(&staged.temp, &e, "Failed to sync staging file"))?;
    }
    drop(file);

    Ok(staged)
}

/// Atomically replace `target` with `header` followed by `rows`.
pub fn atomic_rewrite<I, S>(
    target: &Path,
    suffix: &str,
    header: &str,
    rows: I,
    durability: Durability,
) -> StoreResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    stage(target, suffix, header, rows, durability)?.commit()
}
