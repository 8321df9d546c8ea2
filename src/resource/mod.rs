//! Resources addressed by a logical URL that may resolve to a single file or to a
//! directory of files read back as one sequential stream.
//!
//! Every operation opens its own filesystem connection. Metadata calls close it before
//! returning; streams own it and close it together with themselves.

mod local;
mod stream;

pub use local::{LocalFileSystem, LocalFileSystemConnector};
pub use stream::{ResourceReader, ResourceWriter};

use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use stream::ConnectionGuard;

static URL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*)://(.+):([0-9]+)/(.*)$").ok());

/// Immutable logical address `scheme://host:port/path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUrl {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl ResourceUrl {
    pub fn parse(url: &str) -> DataResult<Self> {
        let caps = URL_PATTERN
            .as_ref()
            .and_then(|re| re.captures(url))
            .ok_or_else(|| DataError::invalid(format!("Invalid resource URL '{}'", url)))?;
        let port = caps[3]
            .parse::<u16>()
            .map_err(|_| DataError::invalid(format!("Invalid port in resource URL '{}'", url)))?;
        Ok(Self {
            scheme: caps[1].to_string(),
            host: caps[2].to_string(),
            port,
            path: caps[4].to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path relative to the filesystem root, without a leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn qualified_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/{}", self.scheme, self.host, self.port, self.path)
    }
}

/// Metadata of one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: String,
    pub is_file: bool,
    pub len: u64,
    pub modified: Option<DateTime<Utc>>,
}

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// One connection to a filesystem. Paths are relative to its root.
pub trait FileSystem: Send {
    /// `None` when nothing exists at `path`.
    fn status(&mut self, path: &str) -> io::Result<Option<FileStatus>>;

    /// Direct members of a directory.
    fn list_status(&mut self, path: &str) -> io::Result<Vec<FileStatus>>;

    fn open(&mut self, path: &str) -> io::Result<Box<dyn ReadSeek>>;

    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + Send>>;

    fn append(&mut self, path: &str) -> io::Result<Box<dyn Write + Send>>;

    fn close(&mut self) -> io::Result<()>;
}

pub trait FileSystemConnector: Send + Sync {
    fn connect(&self, url: &ResourceUrl) -> io::Result<Box<dyn FileSystem>>;
}

/// A file or directory on a remote filesystem.
#[derive(Clone)]
pub struct RemoteResource {
    url: ResourceUrl,
    connector: Arc<dyn FileSystemConnector>,
}

impl fmt::Debug for RemoteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteResource").field("url", &self.url).finish()
    }
}

impl RemoteResource {
    pub fn new(url: &str, connector: Arc<dyn FileSystemConnector>) -> DataResult<Self> {
        Ok(Self {
            url: ResourceUrl::parse(url)?,
            connector,
        })
    }

    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    pub fn name(&self) -> &str {
        self.url.name()
    }

    pub fn qualified_path(&self) -> String {
        self.url.qualified_path()
    }

    pub fn exists(&self) -> DataResult<bool> {
        let path = self.url.path().to_string();
        self.with_connection(|fs| Ok(fs.status(&path)?.is_some()))
    }

    pub fn is_directory(&self) -> DataResult<bool> {
        let path = self.url.path().to_string();
        self.with_connection(|fs| Ok(fs.status(&path)?.is_some_and(|s| !s.is_file)))
    }

    /// Size in bytes; for a directory, the sum of its member files.
    pub fn size(&self) -> DataResult<u64> {
        let path = self.url.path().to_string();
        self.with_connection(|fs| {
            let status = require_status(fs, &path)?;
            if status.is_file {
                return Ok(status.len);
            }
            Ok(fs
                .list_status(&path)?
                .iter()
                .filter(|s| s.is_file)
                .map(|s| s.len)
                .sum())
        })
    }

    pub fn last_modified(&self) -> DataResult<Option<DateTime<Utc>>> {
        let path = self.url.path().to_string();
        self.with_connection(|fs| Ok(require_status(fs, &path)?.modified))
    }

    /// Open for reading. A directory reads as the concatenation of its member files in
    /// lexicographic path order.
    pub fn read(&self) -> DataResult<ResourceReader> {
        let mut connection = self.connect()?;
        let path = self.url.path();
        let members = {
            let fs = connection.fs()?;
            let status = require_status(fs, path)?;
            if status.is_file {
                vec![status.path]
            } else {
                let mut files: Vec<String> = fs
                    .list_status(path)?
                    .into_iter()
                    .filter(|s| s.is_file)
                    .map(|s| s.path)
                    .collect();
                files.sort();
                files
            }
        };
        tracing::debug!(resource = %self.url, members = members.len(), "Opened resource for reading");
        Ok(ResourceReader::new(members, connection))
    }

    pub fn read_to_vec(&self) -> DataResult<Vec<u8>> {
        let mut reader = self.read()?;
        let mut buf = Vec::new();
        let outcome = reader.read_to_end(&mut buf);
        reader.close();
        outcome?;
        Ok(buf)
    }

    /// Create or overwrite the file.
    pub fn write(&self) -> DataResult<ResourceWriter> {
        self.open_for_write(false)
    }

    pub fn append(&self) -> DataResult<ResourceWriter> {
        self.open_for_write(true)
    }

    fn open_for_write(&self, append: bool) -> DataResult<ResourceWriter> {
        let mut connection = self.connect()?;
        let path = self.url.path();
        let writer = {
            let fs = connection.fs()?;
            if fs.status(path)?.is_some_and(|s| !s.is_file) {
                return Err(DataError::unsupported(format!(
                    "Cannot write to directory '{}'; writing is only supported for single files",
                    self.url
                )));
            }
            if append {
                fs.append(path)?
            } else {
                fs.create(path)?
            }
        };
        Ok(ResourceWriter::new(writer, connection))
    }

    fn connect(&self) -> DataResult<ConnectionGuard> {
        let fs = self.connector.connect(&self.url)?;
        Ok(ConnectionGuard::new(fs, self.url.to_string()))
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut dyn FileSystem) -> io::Result<T>) -> DataResult<T> {
        let mut connection = self.connect()?;
        let result = f(connection.fs()?);
        connection.close();
        Ok(result?)
    }
}

fn require_status(fs: &mut dyn FileSystem, path: &str) -> io::Result<FileStatus> {
    fs.status(path)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("No such file or directory: {}", path))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let url = ResourceUrl::parse("hdfs://localhost:9000/user/data/part").unwrap();
        assert_eq!(url.scheme(), "hdfs");
        assert_eq!(url.host(), "localhost");
        assert_eq!(url.port(), 9000);
        assert_eq!(url.path(), "user/data/part");
        assert_eq!(url.name(), "part");
        assert_eq!(url.qualified_path(), "hdfs://localhost:9000/user/data/part");

        let dir = ResourceUrl::parse("hdfs://namenode:8020/logs/").unwrap();
        assert_eq!(dir.name(), "logs");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(ResourceUrl::parse("hdfs://localhost/data").is_err());
        assert!(ResourceUrl::parse("/tmp/data").is_err());
        assert!(ResourceUrl::parse("hdfs://localhost:99999/data").is_err());
    }
}
