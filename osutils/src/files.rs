use std::{fs::File, path::Path};

use anyhow::{Context, Error};

/// Creates (or truncates) a file, creating missing parent directories.
pub fn create_file(path: impl AsRef<Path>) -> Result<File, Error> {
    if let Some(parent) = path.as_ref().parent() {
        create_dirs(parent)?;
    }

    File::create(path.as_ref())
        .with_context(|| format!("Could not create file: {}", path.as_ref().display()))
}

/// Creates all directories in a path if they don't exist.
pub fn create_dirs(path: impl AsRef<Path>) -> Result<(), Error> {
    std::fs::create_dir_all(path.as_ref())
        .with_context(|| format!("Could not create path: {}", path.as_ref().display()))
}
