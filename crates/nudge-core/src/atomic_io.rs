use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

fn staging_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("state");
    let staging_name = format!(
        ".{file_name}.{}.{}.partial",
        std::process::id(),
        current_unix_timestamp_ms()
    );
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(staging_name),
        _ => PathBuf::from(staging_name),
    }
}

/// Replaces `path` with `content` in one rename.
///
/// The bytes are flushed to a staging file next to `path` first, so a crash
/// mid-write leaves the previous state file intact.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.file_name().is_none() {
        bail!("state path '{}' does not name a file", path.display());
    }
    if path.is_dir() {
        bail!("state path '{}' is a directory", path.display());
    }
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create state directory {}", dir.display()))?;
    }

    let staging = staging_path_for(path);
    let staged = File::create(&staging)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        })
        .with_context(|| format!("cannot stage state file {}", staging.display()));
    if let Err(error) = staged {
        let _ = std::fs::remove_file(&staging);
        return Err(error);
    }
    if let Err(error) = std::fs::rename(&staging, path) {
        let _ = std::fs::remove_file(&staging);
        return Err(error)
            .with_context(|| format!("cannot replace state file {}", path.display()));
    }
    Ok(())
}
