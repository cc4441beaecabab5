//! File backend: wraps a host file handle. `size` always returns 0
//! (unknown) - callers that need the length should `stat` it themselves
//! before constructing the reader.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use super::{ReadBackend, WriteBackend, Whence};
use crate::error::{BitstreamError, Result};

pub(crate) struct FileBackend {
    file: File,
}

impl FileBackend {
    pub(crate) fn new(file: File) -> Self {
        Self { file }
    }
}

fn to_seek_from(offset: i64, whence: Whence) -> SeekFrom {
    match whence {
        Whence::Set => SeekFrom::Start(offset as u64),
        Whence::Cur => SeekFrom::Current(offset),
        Whence::End => SeekFrom::End(offset),
    }
}

/// Maps a short/EOF read into the engine's own `EndOfStream` kind rather
/// than the generic `Io` variant, keeping the end-of-stream vs. I/O
/// failure distinction consistent with every other backend.
fn map_read_err(err: std::io::Error) -> BitstreamError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        BitstreamError::EndOfStream
    } else {
        BitstreamError::Io(err)
    }
}

impl ReadBackend for FileBackend {
    fn get_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf).map_err(map_read_err)?;
        Ok(buf[0])
    }

    fn read_bytes_bulk(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read_exact(buf).map_err(map_read_err)?;
        Ok(buf.len())
    }

    fn get_pos(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        Ok(self.file.seek(to_seek_from(offset, whence))?)
    }

    fn size(&self) -> u64 {
        0
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl WriteBackend for FileBackend {
    fn put_byte(&mut self, byte: u8) -> Result<()> {
        self.file.write_all(&[byte])?;
        Ok(())
    }

    fn write_bytes_bulk(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        Ok(())
    }

    fn get_pos(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }
}
