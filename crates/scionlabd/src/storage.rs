//! Filesystem staging rooted in the supervisor's storage directory.
//!
//! Components stage configuration files, sockets, and databases below a
//! single root. Paths handed to [`Storage`] are relative to that root;
//! absolute paths and parent-directory components are rejected so nothing is
//! written outside it. Operations that read user-supplied sources, such as
//! [`Storage::copy_file_or_directory`], accept arbitrary source paths.

use std::fs::{self, OpenOptions};
use std::io;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use regex::Regex;
use thiserror::Error;

const ASSETS: [(&str, &str); 5] = [
    ("dispatcher.toml", include_str!("assets/dispatcher.toml")),
    ("border_router.toml", include_str!("assets/border_router.toml")),
    ("control_server.toml", include_str!("assets/control_server.toml")),
    ("daemon.toml", include_str!("assets/daemon.toml")),
    ("topology.json", include_str!("assets/topology.json")),
];

/// Errors raised by [`Storage`] operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path is absolute or escapes the storage root.
    #[error("path '{path}' must stay within the storage root")]
    OutsideRoot {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A directory could not be created.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A file could not be written.
    #[error("failed to write '{path}': {source}")]
    Write {
        /// File that could not be written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A file or directory could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A file or directory could not be removed.
    #[error("failed to remove '{path}': {source}")]
    Remove {
        /// Path that could not be removed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A file could not be copied.
    #[error("failed to copy '{from}' to '{to}': {source}")]
    Copy {
        /// Source file.
        from: Utf8PathBuf,
        /// Destination file.
        to: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// No bundled asset carries the requested name.
    #[error("no bundled asset named '{name}'")]
    UnknownAsset {
        /// Requested asset name.
        name: String,
    },
}

/// Storage rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    root: Utf8PathBuf,
}

impl Storage {
    /// Creates a storage handle for `root`. The directory is created lazily.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.root.as_path()
    }

    /// Resolves a root-relative path to an absolute one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutsideRoot`] for absolute paths and paths
    /// containing `..`.
    pub fn absolute_path(&self, relative: impl AsRef<Utf8Path>) -> Result<Utf8PathBuf, StorageError> {
        let relative = relative.as_ref();
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Utf8Component::Normal(_) | Utf8Component::CurDir));
        if escapes {
            return Err(StorageError::OutsideRoot {
                path: relative.to_path_buf(),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Ensures `relative` exists as a file, creating parent directories and
    /// an empty file when it is missing. Existing contents are kept. Returns
    /// the absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the path is invalid or the filesystem
    /// refuses the changes.
    pub fn prepare_file(&self, relative: impl AsRef<Utf8Path>) -> Result<Utf8PathBuf, StorageError> {
        let path = self.absolute_path(relative)?;
        create_parent(&path)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Clears `relative` so a process can bind a fresh socket there.
    ///
    /// Parent directories are created and anything left at the path by an
    /// earlier session is removed. Returns the absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the path is invalid or the filesystem
    /// refuses the changes.
    pub fn prepare_socket(&self, relative: impl AsRef<Utf8Path>) -> Result<Utf8PathBuf, StorageError> {
        let path = self.absolute_path(relative)?;
        create_parent(&path)?;
        remove_path(&path)?;
        Ok(path)
    }

    /// Runs [`Storage::prepare_file`] for each path.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub fn prepare_files<P>(&self, paths: &[P]) -> Result<Vec<Utf8PathBuf>, StorageError>
    where
        P: AsRef<Utf8Path>,
    {
        paths.iter().map(|path| self.prepare_file(path)).collect()
    }

    /// Writes `contents` to `relative`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the path is invalid or the write fails.
    pub fn write_file(
        &self,
        relative: impl AsRef<Utf8Path>,
        contents: &str,
    ) -> Result<Utf8PathBuf, StorageError> {
        let path = self.absolute_path(relative)?;
        create_parent(&path)?;
        fs::write(&path, contents).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Returns the bundled template called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownAsset`] when no template has that name.
    pub fn read_asset_file(&self, name: &str) -> Result<&'static str, StorageError> {
        ASSETS
            .iter()
            .find(|(asset, _)| *asset == name)
            .map(|(_, contents)| *contents)
            .ok_or_else(|| StorageError::UnknownAsset {
                name: name.to_owned(),
            })
    }

    /// Copies a file or directory tree from `source` into `relative`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when reading the source or writing the copy
    /// fails.
    pub fn copy_file_or_directory(
        &self,
        source: &Utf8Path,
        relative: impl AsRef<Utf8Path>,
    ) -> Result<Utf8PathBuf, StorageError> {
        let destination = self.absolute_path(relative)?;
        copy_recursive(source, &destination)?;
        Ok(destination)
    }

    /// Removes a file or directory tree. Missing paths are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the path is invalid or removal fails.
    pub fn delete_file_or_directory(&self, relative: impl AsRef<Utf8Path>) -> Result<(), StorageError> {
        let path = self.absolute_path(relative)?;
        remove_path(&path)
    }

    /// Counts regular files below `directory`, recursively.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] when the tree cannot be listed.
    pub fn count_files_in_directory(&self, directory: &Utf8Path) -> Result<usize, StorageError> {
        let mut count = 0;
        for entry in sorted_entries(directory)? {
            if entry.is_dir() {
                count += self.count_files_in_directory(&entry)?;
            } else {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Finds the first entry below `relative` whose file name matches
    /// `pattern`, searching depth-first in name order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the path is invalid or the tree cannot be
    /// listed.
    pub fn find_in_directory(
        &self,
        relative: impl AsRef<Utf8Path>,
        pattern: &Regex,
    ) -> Result<Option<Utf8PathBuf>, StorageError> {
        let directory = self.absolute_path(relative)?;
        if !directory.is_dir() {
            return Ok(None);
        }
        find_recursive(&directory, pattern)
    }
}

/// Substitutes `${key}` placeholders in `template`.
#[must_use]
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_owned(), |rendered, (key, value)| {
            rendered.replace(&format!("${{{key}}}"), value)
        })
}

fn create_parent(path: &Utf8Path) -> Result<(), StorageError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    })
}

fn remove_path(path: &Utf8Path) -> Result<(), StorageError> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => Err(error),
    };
    result.map_err(|source| StorageError::Remove {
        path: path.to_path_buf(),
        source,
    })
}

fn sorted_entries(directory: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
    let read_error = |source| StorageError::Read {
        path: directory.to_path_buf(),
        source,
    };
    let mut entries = directory
        .read_dir_utf8()
        .map_err(read_error)?
        .map(|entry| entry.map(|entry| entry.into_path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;
    entries.sort();
    Ok(entries)
}

fn copy_recursive(source: &Utf8Path, destination: &Utf8Path) -> Result<(), StorageError> {
    if source.is_dir() {
        fs::create_dir_all(destination).map_err(|error| StorageError::CreateDirectory {
            path: destination.to_path_buf(),
            source: error,
        })?;
        for entry in sorted_entries(source)? {
            let Some(name) = entry.file_name() else {
                continue;
            };
            copy_recursive(&entry, &destination.join(name))?;
        }
        return Ok(());
    }
    create_parent(destination)?;
    fs::copy(source, destination)
        .map(|_| ())
        .map_err(|error| StorageError::Copy {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            source: error,
        })
}

fn find_recursive(directory: &Utf8Path, pattern: &Regex) -> Result<Option<Utf8PathBuf>, StorageError> {
    for entry in sorted_entries(directory)? {
        if entry.file_name().is_some_and(|name| pattern.is_match(name)) {
            return Ok(Some(entry));
        }
        if entry.is_dir()
            && let Some(found) = find_recursive(&entry, pattern)?
        {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
