use crate::{Result, ToolError};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub(crate) fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ToolError::io("failed to remove", dir, err)),
    }
}

pub(crate) fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| ToolError::io("failed to create", dir, err))
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).map_err(|err| ToolError::io("failed to write", path, err))
}

/// Copy `from` into `to`, merging with and overwriting what is there.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(from).to_path_buf();
            ToolError::io("failed to read", path, io::Error::other(err))
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            create_dir(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                create_dir(parent)?;
            }
            fs::copy(entry.path(), &target)
                .map_err(|err| ToolError::io("failed to copy", entry.path(), err))?;
        }
    }
    Ok(())
}

/// Move a file or directory, copying when a rename is not possible.
pub(crate) fn move_entry(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if from.is_dir() {
        copy_tree(from, to)?;
        fs::remove_dir_all(from).map_err(|err| ToolError::io("failed to remove", from, err))
    } else {
        fs::copy(from, to).map_err(|err| ToolError::io("failed to copy", from, err))?;
        fs::remove_file(from).map_err(|err| ToolError::io("failed to remove", from, err))
    }
}

/// Files under `dir` with the given extension, sorted.
pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect()
}
