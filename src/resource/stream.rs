use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use super::{FileSystem, ReadSeek};

/// Owns a filesystem connection and closes it exactly once.
pub(crate) struct ConnectionGuard {
    fs: Option<Box<dyn FileSystem>>,
    label: String,
}

impl ConnectionGuard {
    pub(crate) fn new(fs: Box<dyn FileSystem>, label: String) -> Self {
        Self { fs: Some(fs), label }
    }

    pub(crate) fn fs(&mut self) -> io::Result<&mut dyn FileSystem> {
        match self.fs.as_deref_mut() {
            Some(fs) => Ok(fs),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "connection already closed")),
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(mut fs) = self.fs.take() {
            if let Err(e) = fs.close() {
                tracing::warn!(resource = %self.label, error = %e, "Failed to close filesystem connection");
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sequential reader over one or more member files.
///
/// At most one member is open at a time; it is released before the next one is opened.
/// `mark`/`reset` only work within the currently open member: moving on to the next
/// member discards the mark.
pub struct ResourceReader {
    pending: VecDeque<String>,
    current: Option<Box<dyn ReadSeek>>,
    mark: Option<u64>,
    connection: ConnectionGuard,
    closed: bool,
}

impl ResourceReader {
    pub(crate) fn new(members: Vec<String>, connection: ConnectionGuard) -> Self {
        Self {
            pending: members.into(),
            current: None,
            mark: None,
            connection,
            closed: false,
        }
    }

    /// Members not yet opened.
    pub fn remaining_members(&self) -> usize {
        self.pending.len()
    }

    fn open_next(&mut self) -> io::Result<bool> {
        self.current = None;
        self.mark = None;
        match self.pending.pop_front() {
            Some(path) => {
                let stream = self.connection.fs()?.open(&path)?;
                self.current = Some(stream);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remember the position within the current member.
    pub fn mark(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        if self.current.is_none() && !self.open_next()? {
            self.mark = None;
            return Ok(());
        }
        if let Some(stream) = self.current.as_mut() {
            self.mark = Some(stream.stream_position()?);
        }
        Ok(())
    }

    /// Return to the last mark. Fails if no mark is set or the reader moved past the
    /// member the mark was taken in.
    pub fn reset(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        match (self.mark, self.current.as_mut()) {
            (Some(position), Some(stream)) => {
                stream.seek(SeekFrom::Start(position))?;
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "reset requires a mark within the current member",
            )),
        }
    }

    /// Discard up to `n` bytes, crossing member boundaries. Returns bytes skipped.
    pub fn skip(&mut self, n: u64) -> io::Result<u64> {
        io::copy(&mut self.by_ref().take(n), &mut io::sink())
    }

    /// Close the open member and the connection. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        self.pending.clear();
        self.connection.close();
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "reader is closed"));
        }
        Ok(())
    }
}

impl Read for ResourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(0);
            }
            if let Some(stream) = self.current.as_mut() {
                let n = stream.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            self.current = None;
            self.mark = None;
        }
    }
}

impl fmt::Debug for ResourceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceReader")
            .field("resource", &self.connection.label)
            .field("remaining_members", &self.pending.len())
            .field("mark", &self.mark)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for ResourceReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Writer for a single file; closing it closes the connection as well.
pub struct ResourceWriter {
    inner: Option<Box<dyn Write + Send>>,
    connection: ConnectionGuard,
}

impl ResourceWriter {
    pub(crate) fn new(inner: Box<dyn Write + Send>, connection: ConnectionGuard) -> Self {
        Self {
            inner: Some(inner),
            connection,
        }
    }

    /// Flush, then release the file and the connection. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        let flushed = match self.inner.take() {
            Some(mut inner) => inner.flush(),
            None => Ok(()),
        };
        self.connection.close();
        flushed
    }

    fn inner(&mut self) -> io::Result<&mut (dyn Write + Send)> {
        match self.inner.as_deref_mut() {
            Some(inner) => Ok(inner),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "writer is closed")),
        }
    }
}

impl Write for ResourceWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()
    }
}

impl fmt::Debug for ResourceWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceWriter")
            .field("resource", &self.connection.label)
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

impl Drop for ResourceWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to flush resource writer on drop");
        }
    }
}
