//! Tar archive expansion and packing
//!
//! Expansion validates the whole archive before writing anything: only
//! regular files and directories with relative, non-escaping paths are
//! accepted. Links, devices and fifos are rejected. The archive root entry
//! (`./`) and pax global headers carry nothing to unpack and are skipped.
//! Header modes are not trusted: unpacked directories get 0755 and files 0644.

use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Entry, EntryType};
use tracing::debug;
use walkdir::WalkDir;
use wos_common::{Error, Result};

use super::content_store::relative_key;
use super::staging::normalize_relative_path;

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// What expansion does with one archive entry
#[derive(Debug, PartialEq, Eq)]
enum Planned {
    File(PathBuf),
    Dir(PathBuf),
    Skip,
}

fn plan_entry<R: std::io::Read>(entry: &Entry<'_, R>) -> Result<Planned> {
    let path = entry.path().map_err(malformed)?.into_owned();

    match entry.header().entry_type() {
        EntryType::XGlobalHeader => Ok(Planned::Skip),
        EntryType::Directory if is_archive_root(&path) => Ok(Planned::Skip),
        EntryType::Directory => Ok(Planned::Dir(normalize_relative_path(&path, false)?)),
        EntryType::Regular | EntryType::Continuous => {
            Ok(Planned::File(normalize_relative_path(&path, false)?))
        }
        other => Err(Error::Validation(format!(
            "unsupported archive entry {:?} at {}",
            other,
            path.display()
        ))),
    }
}

/// `./`, `.` or an empty name
fn is_archive_root(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::CurDir))
}

/// Check every entry of a tar archive; returns the number of entries to unpack
pub fn validate_archive(bytes: &[u8]) -> Result<usize> {
    let mut archive = Archive::new(bytes);
    let entries = archive.entries().map_err(malformed)?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(malformed)?;
        if plan_entry(&entry)? != Planned::Skip {
            count += 1;
        }
    }
    Ok(count)
}

/// Validate then unpack a tar archive into `dest`
pub fn expand_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    let count = validate_archive(bytes)?;

    let mut archive = Archive::new(bytes);
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        match plan_entry(&entry)? {
            Planned::Skip => {}
            Planned::Dir(relative) => {
                let target = dest.join(relative);
                std::fs::create_dir_all(&target).map_err(|e| unpack_failed(dest, e))?;
                set_mode(&target, true)?;
            }
            Planned::File(relative) => {
                let unpacked = entry.unpack_in(dest).map_err(|e| unpack_failed(dest, e))?;
                if !unpacked {
                    return Err(Error::Validation(
                        "archive entry escapes the destination".to_string(),
                    ));
                }
                set_mode(&dest.join(relative), false)?;
            }
        }
    }

    debug!(entries = count, dest = %dest.display(), "Expanded archive");
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, is_dir: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if is_dir { DIR_MODE } else { FILE_MODE };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| Error::Resource(format!("cannot set mode on {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _is_dir: bool) -> Result<()> {
    Ok(())
}

fn unpack_failed(dest: &Path, e: std::io::Error) -> Error {
    Error::Resource(format!("cannot unpack into {}: {}", dest.display(), e))
}

/// Pack the tree rooted at `dir` into an uncompressed tar archive
///
/// Entries are written in sorted order with paths relative to `dir`.
pub fn pack_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Store(format!("cannot walk {}: {}", dir.display(), e)))?;
        let relative = relative_key(dir, entry.path())?;

        if entry.file_type().is_dir() {
            builder.append_dir(&relative, entry.path())?;
        } else if entry.file_type().is_file() {
            let mut file = File::open(entry.path())?;
            builder.append_file(&relative, &mut file)?;
        }
    }

    Ok(builder.into_inner()?)
}

fn malformed(e: std::io::Error) -> Error {
    Error::Validation(format!("malformed tar archive: {}", e))
}
