//! Atomic artifact writes.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Temp path used while `target` is being written: same directory, so the
/// final rename never crosses filesystems.
fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Writes `target` through `write` into a sibling temp file, then renames it
/// into place. Readers see either the old file, or the complete new one.
///
/// The temp file is removed if `write` fails.
pub fn atomic_write<F>(target: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> io::Result<()>,
{
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(target);
    let result = (|| {
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        fs::rename(&temp_path, target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// [`atomic_write`] for data already held in memory.
pub fn atomic_write_bytes(target: &Path, bytes: &[u8]) -> io::Result<()> {
    atomic_write(target, |w| w.write_all(bytes))
}
