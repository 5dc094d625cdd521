//! Open file handles
//!
//! [`RemoteReader`] streams a file in ranged chunks. [`SpooledWriter`]
//! collects written bytes in memory, spills them to an anonymous temp file
//! past the configured buffer size, and uploads everything on `finish`.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::debug;

use super::dropboxfs::DropboxFs;
use super::info::Info;
use crate::dropbox::RemoteStore;
use crate::error::FsError;

/// Bytes fetched per ranged download
pub const READ_CHUNK_SIZE: u64 = 1024 * 1024;

/// Sequential reader over a remote file
pub struct RemoteReader<'a, R: RemoteStore> {
    fs: &'a DropboxFs<R>,
    path: String,
    /// File size when the handle was opened
    size: u64,
    /// Current read position
    pos: u64,
    /// Last downloaded chunk and its offset in the file
    chunk: Vec<u8>,
    chunk_start: u64,
}

impl<'a, R: RemoteStore> RemoteReader<'a, R> {
    pub(crate) fn new(fs: &'a DropboxFs<R>, path: String, size: u64) -> Self {
        debug!(path = %path, size, "Opened file handle for reading");
        Self {
            fs,
            path,
            size,
            pos: 0,
            chunk: Vec::new(),
            chunk_start: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn chunk_contains(&self, pos: u64) -> bool {
        pos >= self.chunk_start && pos < self.chunk_start + self.chunk.len() as u64
    }

    fn fill_chunk(&mut self) -> Result<(), FsError> {
        let end = (self.pos + READ_CHUNK_SIZE).min(self.size) - 1;
        self.chunk = self.fs.download_range(&self.path, self.pos, end)?;
        self.chunk_start = self.pos;
        Ok(())
    }
}

impl<R: RemoteStore> fmt::Debug for RemoteReader<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteReader")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("pos", &self.pos)
            .finish()
    }
}

impl<R: RemoteStore> Read for RemoteReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }
        if !self.chunk_contains(self.pos) {
            self.fill_chunk()?;
            // The file shrank after it was opened
            if self.chunk.is_empty() {
                return Ok(0);
            }
        }

        let offset = (self.pos - self.chunk_start) as usize;
        let n = buf.len().min(self.chunk.len() - offset);
        buf[..n].copy_from_slice(&self.chunk[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: RemoteStore> Seek for RemoteReader<'_, R> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(pos) => {
                self.pos = pos;
                Ok(pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            )),
        }
    }
}

enum Spool {
    Memory(Vec<u8>),
    Disk(File),
}

/// Buffered writer that uploads on `finish`
///
/// Dropping the writer without calling `finish` discards the data.
pub struct SpooledWriter<'a, R: RemoteStore> {
    fs: &'a DropboxFs<R>,
    path: String,
    /// Bytes kept in memory before spilling to disk
    max_buffer: usize,
    spool: Spool,
    written: u64,
}

impl<'a, R: RemoteStore> SpooledWriter<'a, R> {
    pub(crate) fn new(fs: &'a DropboxFs<R>, path: String, max_buffer: usize) -> Self {
        debug!(path = %path, max_buffer, "Opened file handle for writing");
        Self {
            fs,
            path,
            max_buffer,
            spool: Spool::Memory(Vec::new()),
            written: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Whether the data has spilled to a temp file
    pub fn is_spilled(&self) -> bool {
        matches!(self.spool, Spool::Disk(_))
    }

    /// Upload the written bytes and return the new file's info
    pub fn finish(mut self) -> Result<Info, FsError> {
        let data = match &mut self.spool {
            Spool::Memory(buf) => std::mem::take(buf),
            Spool::Disk(file) => {
                let mut data = Vec::with_capacity(self.written as usize);
                file.seek(SeekFrom::Start(0))?;
                file.read_to_end(&mut data)?;
                data
            }
        };
        debug!(path = %self.path, size = data.len(), "Uploading on close");
        self.fs.write_all(&self.path, data)
    }
}

impl<R: RemoteStore> fmt::Debug for SpooledWriter<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpooledWriter")
            .field("path", &self.path)
            .field("written", &self.written)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}

impl<R: RemoteStore> Write for SpooledWriter<'_, R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Spool::Memory(data) = &self.spool {
            if data.len() + buf.len() > self.max_buffer {
                let mut file = tempfile::tempfile()?;
                file.write_all(data)?;
                debug!(path = %self.path, size = data.len(), "Spilled write buffer to disk");
                self.spool = Spool::Disk(file);
            }
        }

        match &mut self.spool {
            Spool::Memory(data) => data.extend_from_slice(buf),
            Spool::Disk(file) => file.write_all(buf)?,
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.spool {
            Spool::Memory(_) => Ok(()),
            Spool::Disk(file) => file.flush(),
        }
    }
}
