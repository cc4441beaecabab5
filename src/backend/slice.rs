//! Byte-slice backend: a fixed, immutable in-memory buffer.
//!
//! Backed by `Arc<[u8]>` rather than a borrowed `&[u8]` so that
//! [`crate::reader::BitstreamReader::substream`] can hand out a fresh
//! reader over a shared buffer without copying, and so the reader itself
//! carries no lifetime parameter.

use std::sync::Arc;

use super::{ReadBackend, Whence};
use crate::error::{BitstreamError, Result};

pub(crate) struct SliceBackend {
    data: Arc<[u8]>,
    pos: usize,
}

impl SliceBackend {
    pub(crate) fn new(data: Arc<[u8]>) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Arc::from(bytes.into_boxed_slice()))
    }
}

impl ReadBackend for SliceBackend {
    fn get_byte(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or(BitstreamError::EndOfStream)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes_bulk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let end = self.pos.checked_add(buf.len()).ok_or(BitstreamError::EndOfStream)?;
        if end > self.data.len() {
            return Err(BitstreamError::EndOfStream);
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(buf.len())
    }

    fn get_pos(&mut self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.len() as u64 {
            return Err(BitstreamError::EndOfStream);
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => self.pos as i64,
            Whence::End => self.data.len() as i64,
        };
        let target = base.checked_add(offset).ok_or(BitstreamError::EndOfStream)?;
        if target < 0 || target as u64 > self.data.len() as u64 {
            return Err(BitstreamError::EndOfStream);
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn size(&self) -> u64 {
        (self.data.len() - self.pos.min(self.data.len())) as u64
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
