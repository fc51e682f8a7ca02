//! Tar packing used to move files in and out of environments.
//!
//! Archives keep relative paths, directory entries, regular file contents and mode bits.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid archive path: {0}")]
    InvalidPath(String),
}

/// Packs `path` so that unpacking recreates its contents under the destination.
///
/// A directory contributes its children (relative to the directory itself); a single file
/// contributes one entry named after the file.
pub fn pack(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    if path.is_dir() {
        append_children(&mut builder, path, None)?;
    } else {
        builder.append_path_with_name(path, file_name(path)?)?;
    }

    Ok(builder.into_inner()?)
}

/// Packs `path` under its own name, the way an engine exports a path out of a container:
/// `/data/out` yields `out/...` entries.
pub fn pack_entry(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    let name = file_name(path)?;
    if path.is_dir() {
        builder.append_dir(&name, path)?;
        append_children(&mut builder, path, Some(&name))?;
    } else {
        builder.append_path_with_name(path, &name)?;
    }

    Ok(builder.into_inner()?)
}

/// Unpacks an archive into `dst`, creating missing directories and overwriting existing files.
/// Directories that already exist are left untouched.
pub fn unpack(archive: &[u8], dst: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dst)?;

    let mut archive = tar::Archive::new(archive);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry.header().entry_type().is_dir() && dst.join(&entry_path).is_dir() {
            continue;
        }

        if !entry.unpack_in(dst)? {
            return Err(ArchiveError::InvalidPath(entry_path.display().to_string()));
        }
    }

    Ok(())
}

fn append_children(
    builder: &mut tar::Builder<Vec<u8>>,
    root: &Path,
    prefix: Option<&Path>,
) -> Result<(), ArchiveError> {
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: root.to_path_buf(),
            source,
        })?;

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ArchiveError::InvalidPath(entry.path().display().to_string()))?;
        let name = match prefix {
            Some(prefix) => prefix.join(relative),
            None => relative.to_path_buf(),
        };

        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> Result<PathBuf, ArchiveError> {
    path.file_name()
        .map(PathBuf::from)
        .ok_or_else(|| ArchiveError::InvalidPath(path.display().to_string()))
}
