use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes `bytes` to `path` so that readers see either the old file or the
/// complete new one, never a prefix.
///
/// The data goes to a hidden sibling (`.<name>.tmp.<pid>.<seq>`) which is then
/// renamed over the target. Concurrent writers to the same path each use their
/// own temporary file; the last rename wins. Parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_sibling(path);
    match write_then_rename(&tmp_path, path, bytes) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("entry");
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.tmp.{}.{}", name, std::process::id(), seq))
}

fn write_then_rename(tmp_path: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    #[cfg(windows)]
    {
        // rename does not replace an existing file here
        if target.exists() {
            let _ = fs::remove_file(target);
        }
    }

    fs::rename(tmp_path, target)
}
