//! File-system resource helpers.
use anyhow::{Context as _, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Remove an existing file or symlink at `path`, including broken symlinks.
///
/// Does nothing if `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_existing(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        remove_symlink(path).with_context(|| format!("remove existing: {}", path.display()))?;
    }
    Ok(())
}

/// Sibling temp path used while staging a write to `path`.
///
/// Kept in the same directory so the final rename never crosses a
/// filesystem boundary.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmplsync-tmp", std::process::id()))
}

/// Write `content` to `path` atomically: stage into a locked sibling temp
/// file, fsync, then rename over the destination.
///
/// # Errors
///
/// Returns an error if the parent cannot be created, the temp file cannot
/// be written or locked, or the rename fails.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = staging_path(path);

    let write = || -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("open temp file: {}", tmp.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("lock temp file: {}", tmp.display()))?;
        file.write_all(content)
            .with_context(|| format!("write temp file: {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("sync temp file: {}", tmp.display()))?;
        FileExt::unlock(&file).with_context(|| format!("unlock temp file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} to {}", tmp.display(), path.display()))
    };

    write().inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

/// Replace whatever lives at `target` (typically a symlink) with a real copy
/// of `source`.
///
/// `source` is read before `target` is touched, so `source` may be the link
/// itself: the copy follows it. The copy is staged to a sibling temp path
/// first so the window where `target` is absent is as small as possible.
///
/// # Errors
///
/// Returns an error if `source` cannot be read or the swap fails. On error
/// the staged temp file is cleaned up and `target` is left as it was
/// whenever the failure happened before removal.
pub fn copy_into_place(source: &Path, target: &Path) -> Result<()> {
    let tmp = staging_path(target);
    fs::copy(source, &tmp)
        .with_context(|| format!("copy {} to {}", source.display(), tmp.display()))?;

    let cleanup = || {
        let _ = fs::remove_file(&tmp);
    };

    if let Err(e) = remove_existing(target) {
        cleanup();
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, target) {
        cleanup();
        return Err(e).with_context(|| format!("rename {} to {}", tmp.display(), target.display()));
    }
    Ok(())
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lowercase hex SHA-256 of the file at `path` (following symlinks).
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// List every regular file below `root`, as paths relative to `root`,
/// sorted. A missing `root` yields an empty list.
///
/// Directories are descended into; symlinks are reported as files and never
/// followed.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if root.is_dir() {
        walk(root, Path::new(""), &mut out)?;
    }
    out.sort();
    Ok(out)
}

fn walk(dir: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let rel_path = rel.join(entry.file_name());
        if file_type.is_dir() {
            walk(&entry.path(), &rel_path, out)?;
        } else {
            out.push(rel_path);
        }
    }
    Ok(())
}

/// Create a symlink at `link` pointing to `target`.
///
/// # Errors
///
/// Returns an error if the OS refuses to create the link (on Windows this
/// usually means Developer Mode is off and the process is not elevated).
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }

    #[cfg(windows)]
    {
        let result = if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        result.with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }

    Ok(())
}

/// Remove a symlink or file, handling platform differences.
///
/// On Windows, directory symlinks must be removed with `remove_dir` (not
/// `remove_file`); the raw `FILE_ATTRIBUTE_DIRECTORY` flag identifies them.
/// If `remove_dir` still fails with OS error 5 (access denied), falls back
/// to `cmd /c rmdir` which runs in a separate process.
///
/// # Errors
///
/// Returns an error if the entry cannot be removed.
pub fn remove_symlink(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    if is_dir_like(&meta) {
        match fs::remove_dir(path) {
            Ok(()) => {}
            #[cfg(windows)]
            Err(e) if e.raw_os_error() == Some(5) => {
                remove_dir_fallback(path)?;
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        fs::remove_file(path).with_context(|| format!("removing file: {}", path.display()))?;
    }
    Ok(())
}

/// Whether `path` is a symlink whose target cannot be resolved.
#[must_use]
pub fn is_broken_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|m| m.file_type().is_symlink())
        && fs::metadata(path).is_err()
}

fn is_dir_like(meta: &fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0 // FILE_ATTRIBUTE_DIRECTORY
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

#[cfg(windows)]
fn remove_dir_fallback(path: &Path) -> Result<()> {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    use std::os::windows::process::CommandExt;
    let output = std::process::Command::new("cmd")
        .arg("/c")
        .arg("rmdir")
        .arg("/q")
        .arg(path)
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .context("failed to run rmdir")?;
    if !output.status.success() {
        anyhow::bail!(
            "remove directory/symlink '{}': {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
