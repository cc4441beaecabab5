//! External backend: a set of user-supplied callbacks, wrapped around an
//! internal read-ahead buffer. This is how a host embeds an arbitrary byte
//! source/sink, a socket, a decompressor, an FFI stream, without
//! `bitforge` depending on its concrete type.

use std::io;

use super::{ReadBackend, WriteBackend, Whence};
use crate::error::{BitstreamError, Result};

/// Default read-ahead chunk size for [`ExternalReader`]: a named constant
/// rather than a bare literal at the call site.
pub const DEFAULT_READAHEAD_BYTES: usize = 4096;

type ReadFn = Box<dyn FnMut(&mut [u8]) -> io::Result<usize>>;
type GetPosFn = Box<dyn FnMut() -> io::Result<u64>>;
type SetPosFn = Box<dyn FnMut(u64) -> io::Result<()>>;
type SeekFn = Box<dyn FnMut(i64, Whence) -> io::Result<u64>>;
type CloseFn = Box<dyn FnMut() -> io::Result<()>>;
type WriteFn = Box<dyn FnMut(&[u8]) -> io::Result<()>>;
type FlushFn = Box<dyn FnMut() -> io::Result<()>>;

/// A reader backend driven entirely by host callbacks.
pub struct ExternalReader {
    read: ReadFn,
    get_pos: Option<GetPosFn>,
    set_pos: Option<SetPosFn>,
    seek: Option<SeekFn>,
    close: Option<CloseFn>,
    readahead: Vec<u8>,
    readahead_pos: usize,
    readahead_cap: usize,
}

impl ExternalReader {
    pub fn new(read: impl FnMut(&mut [u8]) -> io::Result<usize> + 'static) -> Self {
        Self {
            read: Box::new(read),
            get_pos: None,
            set_pos: None,
            seek: None,
            close: None,
            readahead: Vec::new(),
            readahead_pos: 0,
            readahead_cap: DEFAULT_READAHEAD_BYTES,
        }
    }

    pub fn with_readahead_bytes(mut self, bytes: usize) -> Self {
        self.readahead_cap = bytes.max(1);
        self
    }

    pub fn with_position(
        mut self,
        get_pos: impl FnMut() -> io::Result<u64> + 'static,
        set_pos: impl FnMut(u64) -> io::Result<()> + 'static,
    ) -> Self {
        self.get_pos = Some(Box::new(get_pos));
        self.set_pos = Some(Box::new(set_pos));
        self
    }

    pub fn with_seek(mut self, seek: impl FnMut(i64, Whence) -> io::Result<u64> + 'static) -> Self {
        self.seek = Some(Box::new(seek));
        self
    }

    pub fn with_close(mut self, close: impl FnMut() -> io::Result<()> + 'static) -> Self {
        self.close = Some(Box::new(close));
        self
    }

    /// A copy of the unconsumed read-ahead bytes, used by position handles
    /// to pair with a backend-supplied token so `setpos` can restore both
    /// the host's cursor and whatever this reader had already buffered
    /// ahead of it.
    pub(crate) fn readahead_snapshot(&self) -> Vec<u8> {
        self.readahead[self.readahead_pos..].to_vec()
    }

    pub(crate) fn restore_readahead(&mut self, bytes: Vec<u8>) {
        self.readahead = bytes;
        self.readahead_pos = 0;
    }

    fn refill(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.readahead_cap];
        let n = (self.read)(&mut buf)?;
        buf.truncate(n);
        self.readahead = buf;
        self.readahead_pos = 0;
        Ok(())
    }
}

impl ReadBackend for ExternalReader {
    fn get_byte(&mut self) -> Result<u8> {
        if self.readahead_pos >= self.readahead.len() {
            self.refill()?;
            if self.readahead.is_empty() {
                return Err(BitstreamError::EndOfStream);
            }
        }
        let byte = self.readahead[self.readahead_pos];
        self.readahead_pos += 1;
        Ok(byte)
    }

    fn read_bytes_bulk(&mut self, buf: &mut [u8]) -> Result<usize> {
        for slot in buf.iter_mut() {
            *slot = self.get_byte()?;
        }
        Ok(buf.len())
    }

    fn get_pos(&mut self) -> Result<u64> {
        match self.get_pos.as_mut() {
            Some(f) => Ok(f()?),
            None => Err(BitstreamError::ContractViolation("external backend has no position callback")),
        }
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        match self.set_pos.as_mut() {
            Some(f) => {
                f(pos)?;
                self.readahead.clear();
                self.readahead_pos = 0;
                Ok(())
            }
            None => Err(BitstreamError::ContractViolation("external backend has no position callback")),
        }
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        match self.seek.as_mut() {
            Some(f) => {
                let pos = f(offset, whence)?;
                self.readahead.clear();
                self.readahead_pos = 0;
                Ok(pos)
            }
            None => Err(BitstreamError::ContractViolation("external backend is not seekable")),
        }
    }

    fn size(&self) -> u64 {
        0
    }

    fn can_seek(&self) -> bool {
        self.seek.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(f) = self.close.as_mut() {
            f()?;
        }
        Ok(())
    }
}

/// A writer backend driven entirely by host callbacks.
pub struct ExternalWriter {
    write: WriteFn,
    flush: FlushFn,
    close: Option<CloseFn>,
}

impl ExternalWriter {
    pub fn new(
        write: impl FnMut(&[u8]) -> io::Result<()> + 'static,
        flush: impl FnMut() -> io::Result<()> + 'static,
    ) -> Self {
        Self { write: Box::new(write), flush: Box::new(flush), close: None }
    }

    pub fn with_close(mut self, close: impl FnMut() -> io::Result<()> + 'static) -> Self {
        self.close = Some(Box::new(close));
        self
    }
}

impl WriteBackend for ExternalWriter {
    fn put_byte(&mut self, byte: u8) -> Result<()> {
        (self.write)(&[byte])?;
        Ok(())
    }

    fn write_bytes_bulk(&mut self, buf: &[u8]) -> Result<()> {
        (self.write)(buf)?;
        Ok(())
    }

    fn get_pos(&mut self) -> Result<u64> {
        Err(BitstreamError::ContractViolation("external writer has no position callback"))
    }

    fn set_pos(&mut self, _pos: u64) -> Result<()> {
        Err(BitstreamError::ContractViolation("external writer has no position callback"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok((self.flush)()?)
    }

    fn close(&mut self) -> Result<()> {
        (self.flush)()?;
        if let Some(f) = self.close.as_mut() {
            f()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn refills_in_configured_chunks() {
        let data: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new((0u8..20).collect()));
        let d = data.clone();
        let mut reader = ExternalReader::new(move |buf| {
            let mut src = d.borrow_mut();
            let n = buf.len().min(src.len());
            buf[..n].copy_from_slice(&src[..n]);
            src.drain(..n);
            Ok(n)
        })
        .with_readahead_bytes(4);

        for expected in 0u8..20 {
            assert_eq!(reader.get_byte().unwrap(), expected);
        }
        assert!(matches!(reader.get_byte(), Err(BitstreamError::EndOfStream)));
    }
}
