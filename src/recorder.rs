//! Recorder and Accumulator: writer variants with a guaranteed sink kind
//! and splice semantics.

use std::ops::{Deref, DerefMut};

use crate::endian::Endianness;
use crate::error::Result;
use crate::writer::BitstreamWriter;

/// A writer whose sink is a resizable in-memory buffer, with `bits_written`,
/// `data`, `reset`, `swap`, `copy`, and `split` layered on top.
/// `Deref`/`DerefMut` forward every ordinary write/format operation
/// straight to the underlying [`BitstreamWriter`].
pub struct Recorder {
    writer: BitstreamWriter,
}

impl Recorder {
    pub fn new(endian: Endianness) -> Self {
        Self { writer: BitstreamWriter::new_buffered(endian) }
    }

    pub fn bits_written(&self) -> u64 {
        self.writer.data().len() as u64 * 8 + self.writer.bits_buffered_count() as u64
    }

    pub fn bytes_written(&self) -> u64 {
        self.writer.data().len() as u64
    }

    /// Discards the buffer. Invalidates any position handle taken before
    /// this call; using a stale handle afterward aborts.
    pub fn reset(&mut self) {
        self.writer.buffered_mut().clear();
        self.writer.bump_generation();
    }

    pub fn data(&self) -> &[u8] {
        self.writer.data()
    }

    /// Exchanges buffers with another recorder. Both sides' pending
    /// position handles become stale, since the data they pointed at has
    /// moved.
    pub fn swap(&mut self, other: &mut Recorder) {
        std::mem::swap(self.writer.buffered_mut(), other.writer.buffered_mut());
        self.writer.bump_generation();
        other.writer.bump_generation();
    }

    /// Writes the buffered whole bytes to `target`, then the ≤7 trailing
    /// bits bit-by-bit, then byte-aligns `target`.
    pub fn copy(&self, target: &mut BitstreamWriter) -> Result<()> {
        target.write_bytes(self.writer.data())?;
        for bit in self.writer.trailing_bit_sequence() {
            target.write(1, bit as u32)?;
        }
        target.byte_align()
    }

    /// Writes the first `n` bytes to `target` and the remaining bytes
    /// (plus any trailing partial-byte bits) to `remainder`. Either may be
    /// omitted.
    pub fn split(&self, target: Option<&mut BitstreamWriter>, remainder: Option<&mut BitstreamWriter>, n: u64) -> Result<()> {
        let data = self.writer.data();
        let split_at = (n as usize).min(data.len());
        let (head, tail) = data.split_at(split_at);

        if let Some(t) = target {
            t.write_bytes(head)?;
        }
        if let Some(r) = remainder {
            r.write_bytes(tail)?;
            for bit in self.writer.trailing_bit_sequence() {
                r.write(1, bit as u32)?;
            }
            r.byte_align()?;
        }
        Ok(())
    }
}

impl Deref for Recorder {
    type Target = BitstreamWriter;
    fn deref(&self) -> &BitstreamWriter {
        &self.writer
    }
}

impl DerefMut for Recorder {
    fn deref_mut(&mut self) -> &mut BitstreamWriter {
        &mut self.writer
    }
}

/// A writer whose sink is solely a bit counter; every operation is O(1)
/// and endianness toggles produce identical counts.
pub struct Accumulator {
    writer: BitstreamWriter,
}

impl Accumulator {
    pub fn new(endian: Endianness) -> Self {
        Self { writer: BitstreamWriter::new_counter(endian) }
    }

    pub fn bits_written(&self) -> u64 {
        self.writer.counter_value() * 8 + self.writer.bits_buffered_count() as u64
    }

    pub fn bytes_written(&self) -> u64 {
        self.writer.counter_value()
    }

    pub fn reset(&mut self) {
        *self.writer.counter_mut() = 0;
        self.writer.bump_generation();
    }
}

impl Deref for Accumulator {
    type Target = BitstreamWriter;
    fn deref(&self) -> &BitstreamWriter {
        &self.writer
    }
}

impl DerefMut for Accumulator {
    fn deref_mut(&mut self) -> &mut BitstreamWriter {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_tracks_bits_and_bytes_written() {
        let mut rec = Recorder::new(Endianness::Big);
        rec.write(3, 5).unwrap();
        rec.write(8, 0xAB).unwrap();
        assert_eq!(rec.bits_written(), 11);
        assert_eq!(rec.bytes_written(), 1);
    }

    #[test]
    fn reset_discards_the_buffer() {
        let mut rec = Recorder::new(Endianness::Big);
        rec.write(16, 0xBEEF).unwrap();
        rec.reset();
        assert_eq!(rec.bytes_written(), 0);
        assert!(rec.data().is_empty());
    }

    #[test]
    fn swap_exchanges_buffers() {
        let mut a = Recorder::new(Endianness::Big);
        let mut b = Recorder::new(Endianness::Big);
        a.write(8, 0x11).unwrap();
        b.write(8, 0x22).unwrap();
        a.swap(&mut b);
        assert_eq!(a.data(), &[0x22]);
        assert_eq!(b.data(), &[0x11]);
    }

    #[test]
    fn copy_flushes_buffered_bytes_and_trailing_bits_then_aligns_target() {
        let mut rec = Recorder::new(Endianness::Big);
        rec.write(8, 0xAB).unwrap();
        rec.write(3, 0b101).unwrap();

        let mut target = Recorder::new(Endianness::Big);
        rec.copy(&mut target).unwrap();

        assert!(target.byte_aligned());
        assert_eq!(target.data(), &[0xAB, 0b101_00000]);
    }

    #[test]
    fn split_divides_whole_bytes_between_target_and_remainder() {
        let mut rec = Recorder::new(Endianness::Big);
        for b in [1u32, 2, 3, 4, 5] {
            rec.write(8, b).unwrap();
        }
        let mut target = Recorder::new(Endianness::Big);
        let mut remainder = Recorder::new(Endianness::Big);
        rec.split(Some(&mut target), Some(&mut remainder), 2).unwrap();

        assert_eq!(target.data(), &[1, 2]);
        assert_eq!(remainder.data(), &[3, 4, 5]);
    }

    #[test]
    fn accumulator_counts_bits_without_storing_bytes() {
        let mut acc = Accumulator::new(Endianness::Big);
        acc.write(13, 0x1FFF).unwrap();
        acc.write(3, 0b101).unwrap();
        assert_eq!(acc.bits_written(), 16);
        assert_eq!(acc.bytes_written(), 2);
    }
}
