//! Whole-file rewrite helper.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Directory a file lives in, `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Write a complete new version of `path` through a sibling temp file and
/// rename it into place, so readers see either the old or the new contents.
pub(crate) fn replace_atomically<F>(path: &Path, sync: bool, write: F) -> StoreResult<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> std::io::Result<()>,
{
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir).map_err(StoreError::io(dir))?;
    let tmp_path = tmp.path().to_path_buf();

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer).map_err(StoreError::io(&tmp_path))?;
        writer.flush().map_err(StoreError::io(&tmp_path))?;
    }
    if sync {
        tmp.as_file().sync_all().map_err(StoreError::io(&tmp_path))?;
    }

    tmp.persist(path)
        .map_err(|e| StoreError::io(path)(e.error))?;
    Ok(())
}
