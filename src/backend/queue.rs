//! Queue backend: a refillable FIFO with mark-based retention.
//! Outstanding position-handle pins prevent the head of the buffer from
//! being compacted away so `setpos` can still rewind into
//! already-consumed data.

use super::{ReadBackend, Whence};
use crate::error::{BitstreamError, Result};

/// A growable ring-like byte buffer. Bytes are appended at the tail with
/// [`ByteQueue::push`] and consumed at the head by the owning reader.
/// `pin`/`unpin` are called by position handles so a live handle's offset
/// is never physically discarded from `buf`.
#[derive(Debug, Default)]
pub struct ByteQueue {
    buf: Vec<u8>,
    /// Logical offset corresponding to `buf[0]`.
    base: u64,
    /// Logical offset of the next byte to be consumed.
    head: u64,
    /// Logical offsets of all currently live position handles, one entry
    /// per outstanding pin (duplicates allowed).
    pins: Vec<u64>,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes at the tail.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Logical offset of the tail (one past the last pushed byte).
    fn tail(&self) -> u64 {
        self.base + self.buf.len() as u64
    }

    /// Drops all unread data by moving the head to the tail.
    pub fn reset(&mut self) {
        self.head = self.tail();
        self.try_compact();
    }

    pub(crate) fn pin(&mut self, offset: u64) {
        self.pins.push(offset);
    }

    pub(crate) fn unpin(&mut self, offset: u64) {
        if let Some(idx) = self.pins.iter().position(|&p| p == offset) {
            self.pins.swap_remove(idx);
        }
    }

    /// Physically discards bytes no pin and no future read can reference.
    fn try_compact(&mut self) {
        let floor = self.pins.iter().copied().min().unwrap_or(self.head).min(self.head);
        if floor > self.base {
            let trim = (floor - self.base) as usize;
            self.buf.drain(0..trim);
            self.base += trim as u64;
        }
    }
}

pub(crate) struct QueueBackend {
    queue: ByteQueue,
}

impl QueueBackend {
    pub(crate) fn new() -> Self {
        Self { queue: ByteQueue::new() }
    }

    pub(crate) fn queue_mut(&mut self) -> &mut ByteQueue {
        &mut self.queue
    }
}

impl ReadBackend for QueueBackend {
    fn get_byte(&mut self) -> Result<u8> {
        let q = &mut self.queue;
        if q.head >= q.tail() {
            return Err(BitstreamError::EndOfStream);
        }
        let byte = q.buf[(q.head - q.base) as usize];
        q.head += 1;
        q.try_compact();
        Ok(byte)
    }

    fn read_bytes_bulk(&mut self, buf: &mut [u8]) -> Result<usize> {
        for slot in buf.iter_mut() {
            *slot = self.get_byte()?;
        }
        Ok(buf.len())
    }

    fn get_pos(&mut self) -> Result<u64> {
        Ok(self.queue.head)
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        if pos < self.queue.base || pos > self.queue.tail() {
            return Err(BitstreamError::EndOfStream);
        }
        self.queue.head = pos;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => self.queue.base as i64,
            Whence::Cur => self.queue.head as i64,
            Whence::End => self.queue.tail() as i64,
        };
        let target = base.checked_add(offset).ok_or(BitstreamError::EndOfStream)?;
        if target < self.queue.base as i64 || target as u64 > self.queue.tail() {
            return Err(BitstreamError::EndOfStream);
        }
        self.queue.head = target as u64;
        Ok(self.queue.head)
    }

    fn size(&self) -> u64 {
        self.queue.tail() - self.queue.head
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_read_round_trips() {
        let mut q = QueueBackend::new();
        q.queue_mut().push(&[1, 2, 3]);
        assert_eq!(q.get_byte().unwrap(), 1);
        assert_eq!(q.get_byte().unwrap(), 2);
        assert_eq!(q.get_byte().unwrap(), 3);
        assert!(matches!(q.get_byte(), Err(BitstreamError::EndOfStream)));
    }

    #[test]
    fn pinned_offset_survives_compaction() {
        let mut q = QueueBackend::new();
        q.queue_mut().push(&[10, 20, 30]);
        let _ = q.get_byte().unwrap();
        q.queue_mut().pin(0);
        let _ = q.get_byte().unwrap();
        // Byte 0 is still retained because of the pin.
        assert_eq!(q.queue.buf[0], 10);
        q.queue_mut().unpin(0);
        let _ = q.get_byte().unwrap();
        q.queue_mut().try_compact();
        assert!(q.queue.buf.is_empty() || q.queue.base == q.queue.head);
    }

    #[test]
    fn reset_discards_unread_tail() {
        let mut q = QueueBackend::new();
        q.queue_mut().push(&[1, 2, 3]);
        q.queue_mut().reset();
        assert!(matches!(q.get_byte(), Err(BitstreamError::EndOfStream)));
        q.queue_mut().push(&[9]);
        assert_eq!(q.get_byte().unwrap(), 9);
    }
}
