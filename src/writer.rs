//! `BitstreamWriter`: the typed façade over the backend and bit-level
//! engine, mirroring [`crate::reader::BitstreamReader`].

use std::fs::File;

use num_bigint::{BigInt, BigUint};

use crate::backend::external::ExternalWriter;
use crate::backend::file::FileBackend;
use crate::backend::WriteBackend;
use crate::callback::CallbackStack;
use crate::endian::Endianness;
use crate::error::{BitstreamError, Result};
use crate::format::{self, FormatValue};
use crate::huffman;
use crate::position::{Position, PositionKind, StreamId};
use crate::signed;

pub(crate) enum WriterSink {
    File(FileBackend),
    External(ExternalWriter),
    Buffered(Vec<u8>),
    Counter(u64),
    Closed,
}

fn mask64(bits: u8) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

fn biguint_low_u32(value: &BigUint) -> u32 {
    let bytes = value.to_bytes_le();
    let mut out = [0u8; 4];
    let n = bytes.len().min(4);
    out[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(out)
}

/// A bit-level writer over one of four sinks: file, external callback, an
/// in-memory buffer (recorder), or a bit counter (accumulator).
pub struct BitstreamWriter {
    endian: Endianness,
    pub(crate) sink: WriterSink,
    /// Bits buffered below a full byte, right-aligned for big-endian and
    /// left-aligned (from bit 0) for little-endian.
    partial: u8,
    bits_buffered: u8,
    callbacks: CallbackStack,
    barrier_depth: u32,
    open_handles: u32,
    stream_id: StreamId,
    /// Bumped on every `reset()` of a buffered/counter sink, so a
    /// position handle taken before the reset is detectably stale.
    pub(crate) generation: u64,
}

impl BitstreamWriter {
    fn from_sink(endian: Endianness, sink: WriterSink) -> Self {
        Self {
            endian,
            sink,
            partial: 0,
            bits_buffered: 0,
            callbacks: CallbackStack::default(),
            barrier_depth: 0,
            open_handles: 0,
            stream_id: StreamId::new(),
            generation: 0,
        }
    }

    pub fn from_file(endian: Endianness, file: File) -> Self {
        Self::from_sink(endian, WriterSink::File(FileBackend::new(file)))
    }

    pub fn from_external(endian: Endianness, external: ExternalWriter) -> Self {
        Self::from_sink(endian, WriterSink::External(external))
    }

    pub(crate) fn new_buffered(endian: Endianness) -> Self {
        Self::from_sink(endian, WriterSink::Buffered(Vec::new()))
    }

    pub(crate) fn new_counter(endian: Endianness) -> Self {
        Self::from_sink(endian, WriterSink::Counter(0))
    }

    fn flush_byte(&mut self, byte: u8) -> Result<()> {
        match &mut self.sink {
            WriterSink::File(b) => b.put_byte(byte)?,
            WriterSink::External(b) => b.put_byte(byte)?,
            WriterSink::Buffered(buf) => buf.push(byte),
            WriterSink::Counter(n) => *n += 1,
            WriterSink::Closed => return Err(BitstreamError::Closed),
        }
        self.callbacks.call(byte);
        Ok(())
    }

    fn flush_if_full(&mut self) -> Result<()> {
        if self.bits_buffered == 8 {
            let byte = self.partial;
            self.partial = 0;
            self.bits_buffered = 0;
            self.flush_byte(byte)?;
        }
        Ok(())
    }

    fn write_bits_be(&mut self, bits: u8, value: u64) -> Result<()> {
        let mut remaining = bits;
        while remaining > 0 {
            let space = 8 - self.bits_buffered;
            let take = remaining.min(space);
            let shift = remaining - take;
            let piece = ((value >> shift) & mask64(take)) as u8;
            self.partial = (self.partial << take) | piece;
            self.bits_buffered += take;
            remaining -= take;
            self.flush_if_full()?;
        }
        Ok(())
    }

    fn write_bits_le(&mut self, bits: u8, mut value: u64) -> Result<()> {
        let mut produced = 0u8;
        while produced < bits {
            let space = 8 - self.bits_buffered;
            let take = (bits - produced).min(space);
            let piece = (value & mask64(take)) as u8;
            self.partial |= piece << self.bits_buffered;
            self.bits_buffered += take;
            value >>= take;
            produced += take;
            self.flush_if_full()?;
        }
        Ok(())
    }

    fn write_bits(&mut self, bits: u8, value: u64) -> Result<()> {
        if bits == 0 {
            return Ok(());
        }
        if self.endian.is_big() { self.write_bits_be(bits, value) } else { self.write_bits_le(bits, value) }
    }

    pub fn write(&mut self, n: u32, value: u32) -> Result<()> {
        if n > 32 {
            return Err(BitstreamError::ContractViolation("write: width exceeds 32 bits"));
        }
        self.write_bits(n as u8, value as u64)
    }

    pub fn write_signed(&mut self, n: u32, value: i32) -> Result<()> {
        self.write(n, signed::unsign(value as i64, n) as u32)
    }

    pub fn write64(&mut self, n: u32, value: u64) -> Result<()> {
        if n > 64 {
            return Err(BitstreamError::ContractViolation("write64: width exceeds 64 bits"));
        }
        self.write_bits(n as u8, value)
    }

    pub fn write_signed_64(&mut self, n: u32, value: i64) -> Result<()> {
        self.write64(n, signed::unsign(value, n))
    }

    /// Writes an arbitrary-precision unsigned value in ≤32-bit chunks,
    /// processed in the same order [`crate::reader::BitstreamReader`]'s
    /// bigint accumulator consumes them, so round-tripping holds for both
    /// bit orders.
    pub fn write_bigint(&mut self, n: u32, value: &BigUint) -> Result<()> {
        if self.endian.is_big() {
            let mut remaining = n;
            while remaining > 0 {
                let take = remaining.min(32);
                let shift = (remaining - take) as usize;
                let mask = (BigUint::from(1u32) << take as usize) - BigUint::from(1u32);
                let chunk = (value >> shift) & mask;
                self.write(take, biguint_low_u32(&chunk))?;
                remaining -= take;
            }
        } else {
            let mut consumed = 0u32;
            while consumed < n {
                let take = (n - consumed).min(32);
                let mask = (BigUint::from(1u32) << take as usize) - BigUint::from(1u32);
                let chunk = (value >> consumed as usize) & mask;
                self.write(take, biguint_low_u32(&chunk))?;
                consumed += take;
            }
        }
        Ok(())
    }

    pub fn write_signed_bigint(&mut self, n: u32, value: &BigInt) -> Result<()> {
        self.write_bigint(n, &signed::unsign_big(value, n)?)
    }

    /// Writes a unary code: runs of 30-bit chunks of the non-stop bit,
    /// then a final stop bit.
    pub fn write_unary(&mut self, stop: u8, value: u32) -> Result<()> {
        if stop > 1 {
            return Err(BitstreamError::ContractViolation("write_unary: stop bit must be 0 or 1"));
        }
        let run_bit = if stop == 0 { 1u32 } else { 0u32 };
        let mut remaining = value;
        while remaining >= 30 {
            let pattern = if run_bit == 1 { (1u32 << 30) - 1 } else { 0 };
            self.write(30, pattern)?;
            remaining -= 30;
        }
        if remaining > 0 {
            let pattern = if run_bit == 1 { (1u32 << remaining) - 1 } else { 0 };
            self.write(remaining, pattern)?;
        }
        self.write(1, stop as u32)
    }

    pub fn write_huffman_code(&mut self, table: &huffman::WriteTable, symbol: i32) -> Result<()> {
        let (bit_length, bit_value) = table.code_for(symbol)?;
        if bit_length == 0 {
            return Ok(());
        }
        self.write(bit_length as u32, bit_value)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.bits_buffered == 0 {
            match &mut self.sink {
                WriterSink::File(b) => b.write_bytes_bulk(bytes)?,
                WriterSink::External(b) => b.write_bytes_bulk(bytes)?,
                WriterSink::Buffered(buf) => buf.extend_from_slice(bytes),
                WriterSink::Counter(n) => *n += bytes.len() as u64,
                WriterSink::Closed => return Err(BitstreamError::Closed),
            }
            for &b in bytes {
                self.callbacks.call(b);
            }
            Ok(())
        } else {
            for &byte in bytes {
                self.write(8, byte as u32)?;
            }
            Ok(())
        }
    }

    /// A writer is byte-aligned exactly when no partial byte is buffered.
    /// Pads the partial byte with zero bits and flushes it.
    pub fn byte_align(&mut self) -> Result<()> {
        if self.bits_buffered > 0 {
            let byte = if self.endian.is_big() { self.partial << (8 - self.bits_buffered) } else { self.partial };
            self.partial = 0;
            self.bits_buffered = 0;
            self.flush_byte(byte)?;
        }
        Ok(())
    }

    pub fn byte_aligned(&self) -> bool {
        self.bits_buffered == 0
    }

    /// The bytes accumulated so far in a buffered (recorder) sink.
    /// Panics on any other sink kind, callers reach this through
    /// [`crate::recorder::Recorder`], which guarantees a buffered sink.
    pub fn data(&self) -> &[u8] {
        match &self.sink {
            WriterSink::Buffered(buf) => buf,
            _ => panic!("data: writer is not backed by a buffer"),
        }
    }

    pub(crate) fn buffered_mut(&mut self) -> &mut Vec<u8> {
        match &mut self.sink {
            WriterSink::Buffered(buf) => buf,
            _ => panic!("buffered_mut: writer is not backed by a buffer"),
        }
    }

    pub(crate) fn counter_value(&self) -> u64 {
        match &self.sink {
            WriterSink::Counter(n) => *n,
            _ => panic!("counter_value: writer is not backed by a counter"),
        }
    }

    pub(crate) fn counter_mut(&mut self) -> &mut u64 {
        match &mut self.sink {
            WriterSink::Counter(n) => n,
            _ => panic!("counter_mut: writer is not backed by a counter"),
        }
    }

    pub(crate) fn bits_buffered_count(&self) -> u8 {
        self.bits_buffered
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// The buffered trailing bits (fewer than a full byte), as the
    /// sequence of 0/1 values in the order they were originally written,
    /// used by [`crate::recorder::Recorder::copy`]/`split` to replay them
    /// onto another writer regardless of that writer's bit order.
    pub(crate) fn trailing_bit_sequence(&self) -> Vec<u8> {
        let n = self.bits_buffered;
        let mut bits = Vec::with_capacity(n as usize);
        for i in 0..n {
            let bit = if self.endian.is_big() { (self.partial >> (n - 1 - i)) & 1 } else { (self.partial >> i) & 1 };
            bits.push(bit);
        }
        bits
    }

    pub fn set_endianness(&mut self, endianness: Endianness) -> Result<()> {
        self.byte_align()?;
        self.endian = endianness;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.byte_align()?;
        match &mut self.sink {
            WriterSink::File(b) => b.flush(),
            WriterSink::External(b) => b.flush(),
            WriterSink::Buffered(_) | WriterSink::Counter(_) => Ok(()),
            WriterSink::Closed => Err(BitstreamError::Closed),
        }
    }

    pub fn build(&mut self, format_str: &str, values: &[FormatValue]) -> Result<()> {
        format::build(self, format_str, values)
    }

    /// Writers expose `getpos`/`setpos` only while byte-aligned.
    pub fn getpos(&mut self) -> Result<Position> {
        if !self.byte_aligned() {
            return Err(BitstreamError::NotByteAligned);
        }
        let kind = match &mut self.sink {
            WriterSink::File(b) => PositionKind::File(b.get_pos()?),
            WriterSink::External(_) => {
                return Err(BitstreamError::ContractViolation("external writer has no position support"));
            }
            WriterSink::Buffered(buf) => PositionKind::Buffered { offset: buf.len() as u64, generation: self.generation },
            WriterSink::Counter(n) => PositionKind::Buffered { offset: *n, generation: self.generation },
            WriterSink::Closed => return Err(BitstreamError::Closed),
        };
        self.open_handles += 1;
        Ok(Position { origin: self.stream_id, kind, state: 0 })
    }

    pub fn setpos(&mut self, pos: &Position) -> Result<()> {
        if pos.origin != self.stream_id {
            return Err(BitstreamError::StalePosition);
        }
        if !self.byte_aligned() {
            return Err(BitstreamError::NotByteAligned);
        }
        match (&mut self.sink, &pos.kind) {
            (WriterSink::File(b), PositionKind::File(p)) => {
                b.set_pos(*p)?;
            }
            (WriterSink::Buffered(buf), PositionKind::Buffered { offset, generation }) => {
                if *generation != self.generation {
                    return Err(BitstreamError::StalePosition);
                }
                buf.truncate(*offset as usize);
            }
            (WriterSink::Counter(n), PositionKind::Buffered { offset, generation }) => {
                if *generation != self.generation {
                    return Err(BitstreamError::StalePosition);
                }
                *n = *offset;
            }
            _ => return Err(BitstreamError::StalePosition),
        }
        Ok(())
    }

    pub fn release(&mut self, pos: Position) {
        if pos.origin == self.stream_id {
            self.open_handles = self.open_handles.saturating_sub(1);
        }
    }

    pub fn add_callback(&mut self, callback: impl FnMut(u8) + 'static) {
        self.push_callback(callback);
    }

    pub fn push_callback(&mut self, callback: impl FnMut(u8) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn pop_callback(&mut self) {
        if self.callbacks.pop().is_none() {
            log::warn!("pop_callback: callback stack was already empty");
        }
    }

    pub fn call_callbacks(&mut self, byte: u8) {
        self.callbacks.call(byte);
    }

    pub fn barrier<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.barrier_depth += 1;
        let result = body(self);
        self.barrier_depth -= 1;
        result
    }

    pub fn close_internal_stream(&mut self) -> Result<()> {
        let result = self.flush();
        self.sink = WriterSink::Closed;
        result
    }

    pub fn close(&mut self) -> Result<()> {
        if self.barrier_depth > 0 {
            log::warn!("closing bitstream writer with a live abort barrier");
        }
        if self.open_handles > 0 {
            log::warn!("closing bitstream writer with {} unreleased position handle(s)", self.open_handles);
        }
        self.close_internal_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer_be() -> BitstreamWriter {
        BitstreamWriter::new_buffered(Endianness::Big)
    }

    fn writer_le() -> BitstreamWriter {
        BitstreamWriter::new_buffered(Endianness::Little)
    }

    fn buffered_bytes(w: &BitstreamWriter) -> &[u8] {
        match &w.sink {
            WriterSink::Buffered(buf) => buf,
            _ => panic!("not a buffered sink"),
        }
    }

    #[test]
    fn builds_the_spec_example_stream_big_endian() {
        let mut w = writer_be();
        w.write(2, 2).unwrap();
        w.write(3, 6).unwrap();
        w.write(5, 7).unwrap();
        w.write(3, 5).unwrap();
        w.write(19, 0x53BC1).unwrap();
        w.flush().unwrap();
        assert_eq!(buffered_bytes(&w), &[0xB1, 0xED, 0x3B, 0xC1]);
    }

    #[test]
    fn builds_the_spec_example_stream_little_endian() {
        let mut w = writer_le();
        w.write(2, 1).unwrap();
        w.write(3, 4).unwrap();
        w.write(5, 13).unwrap();
        w.write(3, 3).unwrap();
        w.write(19, 0x609DF).unwrap();
        w.flush().unwrap();
        assert_eq!(buffered_bytes(&w), &[0xB1, 0xED, 0x3B, 0xC1]);
    }

    #[test]
    fn signed_write_then_read_round_trips() {
        let mut w = writer_be();
        w.write_signed(19, -181311).unwrap();
        w.flush().unwrap();
        let mut r = crate::reader::BitstreamReader::from_bytes(Endianness::Big, buffered_bytes(&w).to_vec());
        assert_eq!(r.read_signed(19).unwrap(), -181311);
    }

    #[test]
    fn write_of_full_bytes_from_aligned_writer_stays_aligned() {
        let mut w = writer_be();
        w.write(8, 0xAB).unwrap();
        w.write(8, 0xCD).unwrap();
        assert!(w.byte_aligned());
        assert_eq!(buffered_bytes(&w).len(), 2);
    }

    #[test]
    fn unary_round_trips_through_reader() {
        let mut w = writer_be();
        for v in [0u32, 1, 5, 40, 63] {
            w.write_unary(0, v).unwrap();
        }
        w.flush().unwrap();
        let mut r = crate::reader::BitstreamReader::from_bytes(Endianness::Big, buffered_bytes(&w).to_vec());
        for v in [0u32, 1, 5, 40, 63] {
            assert_eq!(r.read_unary(0).unwrap(), v);
        }
    }

    #[test]
    fn huffman_write_then_read_round_trips() {
        use crate::huffman::FrequencyEntry;
        let entries = vec![
            FrequencyEntry { symbol: 0, bit_value: 0b11, bit_length: 2 },
            FrequencyEntry { symbol: 1, bit_value: 0b10, bit_length: 2 },
            FrequencyEntry { symbol: 2, bit_value: 0b01, bit_length: 2 },
            FrequencyEntry { symbol: 3, bit_value: 0b001, bit_length: 3 },
            FrequencyEntry { symbol: 4, bit_value: 0b000, bit_length: 3 },
        ];
        let write_table = huffman::compile_write_table(&entries, true).unwrap();
        let read_table = huffman::compile_read_table(&entries, true).unwrap();
        let mut w = writer_be();
        for symbol in [1, 0, 4, 0, 0, 2, 1, 1, 2, 0, 2, 0, 1, 4, 2] {
            w.write_huffman_code(&write_table, symbol).unwrap();
        }
        w.flush().unwrap();
        let mut r = crate::reader::BitstreamReader::from_bytes(Endianness::Big, buffered_bytes(&w).to_vec());
        for symbol in [1, 0, 4, 0, 0, 2, 1, 1, 2, 0, 2, 0, 1, 4, 2] {
            assert_eq!(r.read_huffman_code(&read_table).unwrap(), symbol);
        }
    }

    #[test]
    fn getpos_requires_byte_alignment() {
        let mut w = writer_be();
        w.write(3, 1).unwrap();
        assert!(matches!(w.getpos(), Err(BitstreamError::NotByteAligned)));
    }

    #[test]
    fn bigint_write_round_trips_arbitrary_width() {
        let mut w = writer_be();
        let value = BigUint::from(0x53BC1u32);
        w.write_bigint(19, &value).unwrap();
        w.flush().unwrap();
        let mut r = crate::reader::BitstreamReader::from_bytes(Endianness::Big, buffered_bytes(&w).to_vec());
        assert_eq!(r.read_bigint(19).unwrap(), value);
    }
}
