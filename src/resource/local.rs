use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use super::{FileStatus, FileSystem, FileSystemConnector, ReadSeek, ResourceUrl};

/// Connector mapping every URL path onto a local root directory, regardless of host.
#[derive(Debug, Clone)]
pub struct LocalFileSystemConnector {
    root: PathBuf,
}

impl LocalFileSystemConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystemConnector for LocalFileSystemConnector {
    fn connect(&self, url: &ResourceUrl) -> io::Result<Box<dyn FileSystem>> {
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Root directory {} does not exist", self.root.display()),
            ));
        }
        tracing::debug!(host = %url.host(), port = url.port(), root = %self.root.display(), "Connected to local filesystem");
        Ok(Box::new(LocalFileSystem {
            root: self.root.clone(),
            open: true,
        }))
    }
}

pub struct LocalFileSystem {
    root: PathBuf,
    open: bool,
}

impl LocalFileSystem {
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "filesystem connection is closed"));
        }
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Path escapes the filesystem root: {}", path),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn logical_path(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn file_status(&self, absolute: &Path, metadata: &fs::Metadata) -> FileStatus {
        FileStatus {
            path: self.logical_path(absolute),
            is_file: metadata.is_file(),
            len: if metadata.is_file() { metadata.len() } else { 0 },
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn status(&mut self, path: &str) -> io::Result<Option<FileStatus>> {
        let absolute = self.resolve(path)?;
        match fs::metadata(&absolute) {
            Ok(metadata) => Ok(Some(self.file_status(&absolute, &metadata))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_status(&mut self, path: &str) -> io::Result<Vec<FileStatus>> {
        let absolute = self.resolve(path)?;
        let mut members = Vec::new();
        for entry in WalkDir::new(&absolute).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            let metadata = entry.metadata().map_err(io::Error::from)?;
            members.push(self.file_status(entry.path(), &metadata));
        }
        Ok(members)
    }

    fn open(&mut self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(self.resolve(path)?)?))
    }

    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        let absolute = self.resolve(path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(File::create(absolute)?))
    }

    fn append(&mut self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        let absolute = self.resolve(path)?;
        Ok(Box::new(OpenOptions::new().create(true).append(true).open(absolute)?))
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }
}
