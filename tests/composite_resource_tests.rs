//! Resources backed by a local directory tree: single files, directories read as one
//! stream, and connection/handle bookkeeping.

mod common;

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use polystore::resource::{FileStatus, FileSystem, FileSystemConnector, ReadSeek};
use polystore::{DataError, LocalFileSystemConnector, RemoteResource, ResourceUrl};
use tempfile::TempDir;

#[derive(Default)]
struct Counters {
    connections: AtomicUsize,
    closed_connections: AtomicUsize,
    open_handles: AtomicUsize,
    max_open_handles: AtomicUsize,
}

/// Wraps the local connector and records connection and stream lifetimes.
struct CountingConnector {
    inner: LocalFileSystemConnector,
    counters: Arc<Counters>,
}

impl FileSystemConnector for CountingConnector {
    fn connect(&self, url: &ResourceUrl) -> io::Result<Box<dyn FileSystem>> {
        let fs = self.inner.connect(url)?;
        self.counters.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingFs {
            inner: fs,
            counters: self.counters.clone(),
        }))
    }
}

struct CountingFs {
    inner: Box<dyn FileSystem>,
    counters: Arc<Counters>,
}

impl FileSystem for CountingFs {
    fn status(&mut self, path: &str) -> io::Result<Option<FileStatus>> {
        self.inner.status(path)
    }

    fn list_status(&mut self, path: &str) -> io::Result<Vec<FileStatus>> {
        self.inner.list_status(path)
    }

    fn open(&mut self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        let stream = self.inner.open(path)?;
        let open = self.counters.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open_handles.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(CountedStream {
            inner: stream,
            counters: self.counters.clone(),
        }))
    }

    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        self.inner.create(path)
    }

    fn append(&mut self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        self.inner.append(path)
    }

    fn close(&mut self) -> io::Result<()> {
        self.counters.closed_connections.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

struct CountedStream {
    inner: Box<dyn ReadSeek>,
    counters: Arc<Counters>,
}

impl Read for CountedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for CountedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for CountedStream {
    fn drop(&mut self) {
        self.counters.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Fixture {
    _dir: TempDir,
    connector: Arc<CountingConnector>,
    counters: Arc<Counters>,
}

impl Fixture {
    fn new() -> Self {
        common::init_tracing();
        let dir = TempDir::new().expect("Failed to create temp dir");
        let parts = dir.path().join("data/parts");
        fs::create_dir_all(parts.join("nested")).unwrap();
        fs::write(parts.join("c.txt"), "ccc").unwrap();
        fs::write(parts.join("a.txt"), "a").unwrap();
        fs::write(parts.join("b.txt"), "bb").unwrap();
        fs::write(parts.join("nested/z.txt"), "ignored").unwrap();

        let counters = Arc::new(Counters::default());
        let connector = Arc::new(CountingConnector {
            inner: LocalFileSystemConnector::new(dir.path()),
            counters: counters.clone(),
        });
        Self {
            _dir: dir,
            connector,
            counters,
        }
    }

    fn resource(&self, path: &str) -> RemoteResource {
        RemoteResource::new(&format!("hdfs://localhost:9000/{}", path), self.connector.clone())
            .expect("Failed to parse resource url")
    }

    fn assert_all_closed(&self) {
        assert_eq!(self.counters.open_handles.load(Ordering::SeqCst), 0);
        assert_eq!(
            self.counters.connections.load(Ordering::SeqCst),
            self.counters.closed_connections.load(Ordering::SeqCst)
        );
    }
}

#[test]
fn test_directory_reads_as_concatenated_members() {
    let fx = Fixture::new();
    let resource = fx.resource("data/parts");
    assert!(resource.is_directory().unwrap());
    assert_eq!(resource.name(), "parts");

    let content = resource.read_to_vec().unwrap();
    assert_eq!(String::from_utf8(content).unwrap(), "abbccc");
    assert_eq!(fx.counters.max_open_handles.load(Ordering::SeqCst), 1);
    fx.assert_all_closed();
}

#[test]
fn test_directory_size_sums_member_files() {
    let fx = Fixture::new();
    assert_eq!(fx.resource("data/parts").size().unwrap(), 6);
    assert_eq!(fx.resource("data/parts/b.txt").size().unwrap(), 2);
    fx.assert_all_closed();
}

#[test]
fn test_partial_read_then_close() {
    let fx = Fixture::new();
    let mut reader = fx.resource("data/parts").read().unwrap();
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ab");
    assert_eq!(fx.counters.open_handles.load(Ordering::SeqCst), 1);

    reader.close();
    reader.close();
    assert!(reader.read(&mut buf).is_err());
    fx.assert_all_closed();
}

#[test]
fn test_dropped_reader_closes_connection() {
    let fx = Fixture::new();
    {
        let mut reader = fx.resource("data/parts").read().unwrap();
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
    }
    fx.assert_all_closed();
}

#[test]
fn test_skip_crosses_member_boundaries() {
    let fx = Fixture::new();
    let mut reader = fx.resource("data/parts").read().unwrap();
    assert_eq!(reader.skip(4).unwrap(), 4);
    let mut rest = String::new();
    reader.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "cc");
    assert_eq!(reader.skip(10).unwrap(), 0);
}

#[test]
fn test_mark_and_reset_within_member() {
    let fx = Fixture::new();
    let mut reader = fx.resource("data/parts/c.txt").read().unwrap();
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).unwrap();
    reader.mark().unwrap();
    let mut rest = String::new();
    reader.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "cc");

    let err = reader.reset().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Unsupported);

    let mut reader = fx.resource("data/parts/b.txt").read().unwrap();
    reader.mark().unwrap();
    reader.read_exact(&mut byte).unwrap();
    reader.reset().unwrap();
    let mut all = String::new();
    reader.read_to_string(&mut all).unwrap();
    assert_eq!(all, "bb");
}

#[test]
fn test_reset_without_mark_fails() {
    let fx = Fixture::new();
    let mut reader = fx.resource("data/parts").read().unwrap();
    assert_eq!(reader.reset().unwrap_err().kind(), io::ErrorKind::Unsupported);
}

#[test]
fn test_write_append_and_read_back() {
    let fx = Fixture::new();
    let resource = fx.resource("out/result.csv");
    assert!(!resource.exists().unwrap());

    let mut writer = resource.write().unwrap();
    writer.write_all(b"id,title\n").unwrap();
    writer.close().unwrap();

    let mut writer = resource.append().unwrap();
    writer.write_all(b"1,My first song\n").unwrap();
    drop(writer);

    assert!(resource.exists().unwrap());
    assert!(!resource.is_directory().unwrap());
    assert_eq!(resource.read_to_vec().unwrap(), b"id,title\n1,My first song\n");
    assert_eq!(resource.size().unwrap(), 25);
    assert!(resource.last_modified().unwrap().is_some());
    fx.assert_all_closed();
}

#[test]
fn test_writing_to_directory_is_unsupported() {
    let fx = Fixture::new();
    let err = fx.resource("data/parts").write().unwrap_err();
    assert!(err.is_unsupported());
    let err = fx.resource("data/parts").append().unwrap_err();
    assert!(err.is_unsupported());
    fx.assert_all_closed();
}

#[test]
fn test_missing_path() {
    let fx = Fixture::new();
    let resource = fx.resource("data/missing");
    assert!(!resource.exists().unwrap());
    assert!(matches!(resource.read(), Err(DataError::Io(ref e)) if e.kind() == io::ErrorKind::NotFound));
    assert!(matches!(resource.size(), Err(DataError::Io(_))));
    assert!(resource.last_modified().is_err());
    fx.assert_all_closed();
}

#[test]
fn test_path_outside_root_is_rejected() {
    let fx = Fixture::new();
    let err = fx.resource("../escape").exists().unwrap_err();
    assert!(matches!(err, DataError::Io(ref e) if e.kind() == io::ErrorKind::InvalidInput));
}
