//! `BitstreamReader`: the typed façade over the backend and bit-level
//! engine.

use std::fs::File;
use std::sync::Arc;

use num_bigint::BigUint;

use crate::backend::external::ExternalReader;
use crate::backend::file::FileBackend;
use crate::backend::queue::QueueBackend;
use crate::backend::slice::SliceBackend;
use crate::backend::{ReadBackend, Whence};
use crate::callback::CallbackStack;
use crate::endian::Endianness;
use crate::error::{BitstreamError, Result};
use crate::format::{self, FormatValue};
use crate::huffman;
use crate::position::{Position, PositionKind, StreamId};
use crate::signed;
use crate::tables;

/// Chunk size for the byte-wise fast skip path.
const SKIP_CHUNK_BYTES: usize = 4096;
/// Chunk size for `substream`/`enqueue` bulk copies.
const SUBSTREAM_CHUNK_BYTES: usize = 1024 * 1024;

enum ReaderSink {
    File(FileBackend),
    Slice(SliceBackend),
    Queue(QueueBackend),
    External(ExternalReader),
    Closed,
}

impl ReadBackend for ReaderSink {
    fn get_byte(&mut self) -> Result<u8> {
        match self {
            ReaderSink::File(b) => b.get_byte(),
            ReaderSink::Slice(b) => b.get_byte(),
            ReaderSink::Queue(b) => b.get_byte(),
            ReaderSink::External(b) => b.get_byte(),
            ReaderSink::Closed => Err(BitstreamError::Closed),
        }
    }

    fn read_bytes_bulk(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            ReaderSink::File(b) => b.read_bytes_bulk(buf),
            ReaderSink::Slice(b) => b.read_bytes_bulk(buf),
            ReaderSink::Queue(b) => b.read_bytes_bulk(buf),
            ReaderSink::External(b) => b.read_bytes_bulk(buf),
            ReaderSink::Closed => Err(BitstreamError::Closed),
        }
    }

    fn get_pos(&mut self) -> Result<u64> {
        match self {
            ReaderSink::File(b) => b.get_pos(),
            ReaderSink::Slice(b) => b.get_pos(),
            ReaderSink::Queue(b) => b.get_pos(),
            ReaderSink::External(b) => b.get_pos(),
            ReaderSink::Closed => Err(BitstreamError::Closed),
        }
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        match self {
            ReaderSink::File(b) => b.set_pos(pos),
            ReaderSink::Slice(b) => b.set_pos(pos),
            ReaderSink::Queue(b) => b.set_pos(pos),
            ReaderSink::External(b) => b.set_pos(pos),
            ReaderSink::Closed => Err(BitstreamError::Closed),
        }
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        match self {
            ReaderSink::File(b) => b.seek(offset, whence),
            ReaderSink::Slice(b) => b.seek(offset, whence),
            ReaderSink::Queue(b) => b.seek(offset, whence),
            ReaderSink::External(b) => b.seek(offset, whence),
            ReaderSink::Closed => Err(BitstreamError::Closed),
        }
    }

    fn size(&self) -> u64 {
        match self {
            ReaderSink::File(b) => b.size(),
            ReaderSink::Slice(b) => b.size(),
            ReaderSink::Queue(b) => b.size(),
            ReaderSink::External(b) => b.size(),
            ReaderSink::Closed => 0,
        }
    }

    fn can_seek(&self) -> bool {
        match self {
            ReaderSink::File(b) => b.can_seek(),
            ReaderSink::Slice(b) => b.can_seek(),
            ReaderSink::Queue(b) => b.can_seek(),
            ReaderSink::External(b) => b.can_seek(),
            ReaderSink::Closed => false,
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            ReaderSink::File(b) => b.close(),
            ReaderSink::Slice(b) => b.close(),
            ReaderSink::Queue(b) => b.close(),
            ReaderSink::External(b) => b.close(),
            ReaderSink::Closed => Ok(()),
        }
    }
}

/// A bit-level reader over one of four backends.
pub struct BitstreamReader {
    endian: Endianness,
    sink: ReaderSink,
    /// The 9-bit self-describing state register: `0` means no partial
    /// byte is buffered, otherwise the top bit marks byte alignment and
    /// the low 8 bits hold the buffered byte and its consumed-bit count.
    state: u16,
    callbacks: CallbackStack,
    barrier_depth: u32,
    open_handles: u32,
    stream_id: StreamId,
}

impl BitstreamReader {
    fn from_sink(endian: Endianness, sink: ReaderSink) -> Self {
        Self {
            endian,
            sink,
            state: 0,
            callbacks: CallbackStack::default(),
            barrier_depth: 0,
            open_handles: 0,
            stream_id: StreamId::new(),
        }
    }

    pub fn from_file(endian: Endianness, file: File) -> Self {
        Self::from_sink(endian, ReaderSink::File(FileBackend::new(file)))
    }

    pub fn from_bytes(endian: Endianness, bytes: Vec<u8>) -> Self {
        Self::from_sink(endian, ReaderSink::Slice(SliceBackend::from_bytes(bytes)))
    }

    pub fn from_slice(endian: Endianness, data: Arc<[u8]>) -> Self {
        Self::from_sink(endian, ReaderSink::Slice(SliceBackend::new(data)))
    }

    pub fn from_queue(endian: Endianness) -> Self {
        Self::from_sink(endian, ReaderSink::Queue(QueueBackend::new()))
    }

    pub fn from_external(endian: Endianness, external: ExternalReader) -> Self {
        Self::from_sink(endian, ReaderSink::External(external))
    }

    fn ensure_nonempty(&mut self) -> Result<()> {
        if self.state == 0 {
            let byte = self.sink.get_byte()?;
            self.callbacks.call(byte);
            self.state = tables::tablegen::state_from_byte(byte);
        }
        Ok(())
    }

    fn read_core_u32(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(BitstreamError::ContractViolation("read: width exceeds 32 bits"));
        }
        let mut remaining = n;
        let mut acc: u32 = 0;
        let mut offset: u32 = 0;
        while remaining > 0 {
            self.ensure_nonempty()?;
            let want = remaining.min(8) as usize;
            let entry = tables::read_table(self.endian.is_big())[self.state as usize][want - 1];
            self.state = entry.new_state;
            if self.endian.is_big() {
                acc = (acc << entry.produced_bits) | entry.produced_value;
            } else {
                acc |= entry.produced_value << offset;
                offset += entry.produced_bits as u32;
            }
            remaining -= entry.produced_bits as u32;
        }
        Ok(acc)
    }

    fn read_core_u64(&mut self, n: u32) -> Result<u64> {
        if n == 0 {
            return Ok(0);
        }
        if n > 64 {
            return Err(BitstreamError::ContractViolation("read64: width exceeds 64 bits"));
        }
        let mut remaining = n;
        let mut acc: u64 = 0;
        let mut offset: u32 = 0;
        while remaining > 0 {
            self.ensure_nonempty()?;
            let want = remaining.min(8) as usize;
            let entry = tables::read_table(self.endian.is_big())[self.state as usize][want - 1];
            self.state = entry.new_state;
            if self.endian.is_big() {
                acc = (acc << entry.produced_bits) | entry.produced_value as u64;
            } else {
                acc |= (entry.produced_value as u64) << offset;
                offset += entry.produced_bits as u32;
            }
            remaining -= entry.produced_bits as u32;
        }
        Ok(acc)
    }

    fn read_core_bigint(&mut self, n: u32) -> Result<BigUint> {
        let mut remaining = n;
        let mut acc = BigUint::from(0u32);
        let mut offset: u32 = 0;
        while remaining > 0 {
            self.ensure_nonempty()?;
            let want = remaining.min(8) as usize;
            let entry = tables::read_table(self.endian.is_big())[self.state as usize][want - 1];
            self.state = entry.new_state;
            if self.endian.is_big() {
                acc = (acc << entry.produced_bits as usize) | BigUint::from(entry.produced_value);
            } else {
                acc |= BigUint::from(entry.produced_value) << offset as usize;
                offset += entry.produced_bits as u32;
            }
            remaining -= entry.produced_bits as u32;
        }
        Ok(acc)
    }

    pub fn read(&mut self, n: u32) -> Result<u32> {
        self.read_core_u32(n)
    }

    pub fn read_signed(&mut self, n: u32) -> Result<i32> {
        Ok(signed::extend(self.read_core_u32(n)? as u64, n) as i32)
    }

    pub fn read64(&mut self, n: u32) -> Result<u64> {
        self.read_core_u64(n)
    }

    pub fn read_signed_64(&mut self, n: u32) -> Result<i64> {
        Ok(signed::extend(self.read_core_u64(n)?, n))
    }

    pub fn read_bigint(&mut self, n: u32) -> Result<BigUint> {
        self.read_core_bigint(n)
    }

    pub fn read_signed_bigint(&mut self, n: u32) -> Result<num_bigint::BigInt> {
        Ok(signed::extend_big(&self.read_core_bigint(n)?, n))
    }

    /// Byte-wise bulk skip when the state register is empty and the
    /// request is a whole number of bytes; otherwise falls back to
    /// reading and discarding in 64-bit chunks.
    pub fn skip(&mut self, mut n: u64) -> Result<()> {
        if self.state == 0 && n % 8 == 0 {
            let mut remaining_bytes = n / 8;
            let mut buf = vec![0u8; SKIP_CHUNK_BYTES];
            while remaining_bytes > 0 {
                let chunk = remaining_bytes.min(SKIP_CHUNK_BYTES as u64) as usize;
                self.sink.read_bytes_bulk(&mut buf[..chunk])?;
                for &byte in &buf[..chunk] {
                    self.callbacks.call(byte);
                }
                remaining_bytes -= chunk as u64;
            }
            return Ok(());
        }
        while n > 0 {
            let chunk = n.min(64) as u32;
            let _ = self.read_core_u64(chunk)?;
            n -= chunk as u64;
        }
        Ok(())
    }

    pub fn skip_bytes(&mut self, n: u64) -> Result<()> {
        let bits = n.checked_mul(8).ok_or(BitstreamError::ContractViolation("skip_bytes: overflow"))?;
        self.skip(bits)
    }

    /// Pushes one bit back in front of the state register; valid only
    /// while fewer than 8 bits are buffered. Consecutive unreads without
    /// an intervening read are a contract violation.
    pub fn unread(&mut self, bit: u8) -> Result<()> {
        if bit > 1 {
            return Err(BitstreamError::ContractViolation("unread: bit must be 0 or 1"));
        }
        let entry = tables::unread_table(self.endian.is_big())[self.state as usize][bit as usize];
        if entry.limit_reached {
            return Err(BitstreamError::ContractViolation("unread: buffer already holds a full byte"));
        }
        self.state = entry.new_state;
        Ok(())
    }

    pub fn read_unary(&mut self, stop: u8) -> Result<u32> {
        if stop > 1 {
            return Err(BitstreamError::ContractViolation("read_unary: stop bit must be 0 or 1"));
        }
        let mut total = 0u32;
        loop {
            self.ensure_nonempty()?;
            let entry = tables::unary_table(self.endian.is_big())[self.state as usize][stop as usize];
            self.state = entry.new_state;
            total += entry.increment as u32;
            if !entry.continues {
                break;
            }
        }
        Ok(total)
    }

    pub fn skip_unary(&mut self, stop: u8) -> Result<()> {
        self.read_unary(stop).map(|_| ())
    }

    pub fn read_huffman_code(&mut self, table: &huffman::ReadTable) -> Result<i32> {
        if let Some(symbol) = table.trivial_symbol() {
            return Ok(symbol);
        }
        let mut node = 0usize;
        loop {
            self.ensure_nonempty()?;
            let (continues, next_node, new_state, symbol) = table.step(node, self.state);
            self.state = new_state;
            if continues {
                node = next_node;
            } else {
                return Ok(symbol);
            }
        }
    }

    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n as usize];
        if self.state == 0 {
            self.sink.read_bytes_bulk(&mut out)?;
            for &b in &out {
                self.callbacks.call(b);
            }
        } else {
            for slot in out.iter_mut() {
                *slot = self.read_core_u32(8)? as u8;
            }
        }
        Ok(out)
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.byte_align();
        self.endian = endianness;
    }

    pub fn byte_aligned(&self) -> bool {
        self.state == 0 || self.state & 0x100 != 0
    }

    pub fn byte_align(&mut self) {
        self.state = 0;
    }

    pub fn parse(&mut self, format: &str) -> Result<Vec<FormatValue>> {
        format::parse(self, format)
    }

    pub fn getpos(&mut self) -> Result<Position> {
        let kind = match &mut self.sink {
            ReaderSink::File(b) => PositionKind::File(b.get_pos()?),
            ReaderSink::Slice(b) => PositionKind::Slice(b.get_pos()?),
            ReaderSink::Queue(b) => {
                let pos = b.get_pos()?;
                b.queue_mut().pin(pos);
                PositionKind::Queue(pos)
            }
            ReaderSink::External(b) => PositionKind::External { token: b.get_pos()?, readahead: b.readahead_snapshot() },
            ReaderSink::Closed => return Err(BitstreamError::Closed),
        };
        self.open_handles += 1;
        Ok(Position { origin: self.stream_id, kind, state: self.state })
    }

    pub fn setpos(&mut self, pos: &Position) -> Result<()> {
        if pos.origin != self.stream_id {
            return Err(BitstreamError::StalePosition);
        }
        match (&mut self.sink, &pos.kind) {
            (ReaderSink::File(b), PositionKind::File(p)) => {
                b.set_pos(*p)?;
            }
            (ReaderSink::Slice(b), PositionKind::Slice(p)) => {
                b.set_pos(*p)?;
            }
            (ReaderSink::Queue(b), PositionKind::Queue(p)) => {
                b.set_pos(*p)?;
            }
            (ReaderSink::External(b), PositionKind::External { token, readahead }) => {
                b.set_pos(*token)?;
                b.restore_readahead(readahead.clone());
            }
            _ => return Err(BitstreamError::StalePosition),
        }
        self.state = pos.state;
        Ok(())
    }

    /// Releases a position handle, unpinning the backing queue offset if
    /// applicable.
    pub fn release(&mut self, pos: Position) {
        if pos.origin == self.stream_id {
            if let PositionKind::Queue(offset) = pos.kind {
                if let ReaderSink::Queue(b) = &mut self.sink {
                    b.queue_mut().unpin(offset);
                }
            }
            self.open_handles = self.open_handles.saturating_sub(1);
        }
    }

    /// `SET`/`END` clear the state register; `CUR` with offset 0 is a
    /// no-op and never touches it.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        if whence == Whence::Cur && offset == 0 {
            return self.sink.get_pos();
        }
        if !self.sink.can_seek() {
            return Err(BitstreamError::ContractViolation("seek: backend is not seekable"));
        }
        let pos = self.sink.seek(offset, whence)?;
        self.state = 0;
        Ok(pos)
    }

    pub fn size(&self) -> u64 {
        self.sink.size()
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

    /// Builds a fresh byte-slice-backed reader from the next `n` bytes,
    /// copying in chunks to cap peak memory. On mid-transfer failure the
    /// partial substream is closed before the error propagates.
    pub fn substream(&mut self, n: u64) -> Result<BitstreamReader> {
        let mut buf = Vec::with_capacity(n.min(SUBSTREAM_CHUNK_BYTES as u64) as usize);
        let mut remaining = n;
        let result: Result<()> = (|| {
            while remaining > 0 {
                let chunk = remaining.min(SUBSTREAM_CHUNK_BYTES as u64) as usize;
                let bytes = self.read_bytes(chunk as u64)?;
                buf.extend_from_slice(&bytes);
                remaining -= chunk as u64;
            }
            Ok(())
        })();
        match result {
            Ok(()) => Ok(BitstreamReader::from_bytes(self.endian, buf)),
            Err(e) => {
                let mut partial = BitstreamReader::from_bytes(self.endian, buf);
                let _ = partial.close_internal_stream();
                Err(e)
            }
        }
    }

    /// Copies `n` bytes from this reader into the tail of a queue-backed
    /// reader.
    pub fn enqueue(&mut self, n: u64, target: &mut BitstreamReader) -> Result<()> {
        let ReaderSink::Queue(queue_backend) = &mut target.sink else {
            return Err(BitstreamError::ContractViolation("enqueue: target is not a queue-backed reader"));
        };
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(SUBSTREAM_CHUNK_BYTES as u64) as usize;
            let bytes = self.read_bytes(chunk as u64)?;
            queue_backend.queue_mut().push(&bytes);
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Pushes bytes directly onto a queue-backed reader's tail.
    pub fn queue_push(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.sink {
            ReaderSink::Queue(b) => {
                b.queue_mut().push(bytes);
                Ok(())
            }
            _ => Err(BitstreamError::ContractViolation("queue_push: reader is not queue-backed")),
        }
    }

    /// Drops unread queued data.
    pub fn queue_reset(&mut self) -> Result<()> {
        match &mut self.sink {
            ReaderSink::Queue(b) => {
                b.queue_mut().reset();
                self.state = 0;
                Ok(())
            }
            _ => Err(BitstreamError::ContractViolation("queue_reset: reader is not queue-backed")),
        }
    }

    /// A scoped abort barrier: tracks nesting depth for the "freed with a
    /// live barrier" diagnostic. `Result`/`?` propagation is the actual
    /// abort mechanism; this never catches an error.
    pub fn barrier<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.barrier_depth += 1;
        let result = body(self);
        self.barrier_depth -= 1;
        result
    }

    pub fn close_internal_stream(&mut self) -> Result<()> {
        let result = self.sink.close();
        self.sink = ReaderSink::Closed;
        result
    }

    pub fn close(&mut self) -> Result<()> {
        if self.barrier_depth > 0 {
            log::warn!("closing bitstream reader with a live abort barrier");
        }
        if self.open_handles > 0 {
            log::warn!("closing bitstream reader with {} unreleased position handle(s)", self.open_handles);
        }
        self.close_internal_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::FrequencyEntry;

    fn reader_be(bytes: &[u8]) -> BitstreamReader {
        BitstreamReader::from_bytes(Endianness::Big, bytes.to_vec())
    }

    fn reader_le(bytes: &[u8]) -> BitstreamReader {
        BitstreamReader::from_bytes(Endianness::Little, bytes.to_vec())
    }

    const STREAM: [u8; 4] = [0xB1, 0xED, 0x3B, 0xC1];

    #[test]
    fn scenario_1_unsigned_reads_big_endian() {
        let mut r = reader_be(&STREAM);
        assert_eq!(r.read(2).unwrap(), 2);
        assert_eq!(r.read(3).unwrap(), 6);
        assert_eq!(r.read(5).unwrap(), 7);
        assert_eq!(r.read(3).unwrap(), 5);
        assert_eq!(r.read(19).unwrap(), 0x53BC1);
    }

    #[test]
    fn scenario_2_signed_reads_big_endian() {
        let mut r = reader_be(&STREAM);
        assert_eq!(r.read_signed(2).unwrap(), -2);
        assert_eq!(r.read_signed(3).unwrap(), -2);
        assert_eq!(r.read_signed(5).unwrap(), 7);
        assert_eq!(r.read_signed(3).unwrap(), -3);
        assert_eq!(r.read_signed(19).unwrap(), -181311);
    }

    #[test]
    fn scenario_3_unary_stop_zero_big_endian() {
        let mut r = reader_be(&STREAM);
        let got: Vec<u32> = (0..5).map(|_| r.read_unary(0).unwrap()).collect();
        assert_eq!(got, vec![1, 2, 0, 0, 4]);
    }

    #[test]
    fn scenario_4_unary_stop_one_big_endian() {
        let mut r = reader_be(&STREAM);
        let got: Vec<u32> = (0..5).map(|_| r.read_unary(1).unwrap()).collect();
        assert_eq!(got, vec![0, 1, 0, 3, 0]);
    }

    #[test]
    fn scenario_5_huffman_big_endian() {
        let entries = vec![
            FrequencyEntry { symbol: 0, bit_value: 0b11, bit_length: 2 },
            FrequencyEntry { symbol: 1, bit_value: 0b10, bit_length: 2 },
            FrequencyEntry { symbol: 2, bit_value: 0b01, bit_length: 2 },
            FrequencyEntry { symbol: 3, bit_value: 0b001, bit_length: 3 },
            FrequencyEntry { symbol: 4, bit_value: 0b000, bit_length: 3 },
        ];
        let table = huffman::compile_read_table(&entries, true).unwrap();
        let mut r = reader_be(&STREAM);
        let got: Vec<i32> = (0..15).map(|_| r.read_huffman_code(&table).unwrap()).collect();
        assert_eq!(got, vec![1, 0, 4, 0, 0, 2, 1, 1, 2, 0, 2, 0, 1, 4, 2]);
    }

    #[test]
    fn scenario_6_unsigned_reads_little_endian() {
        let mut r = reader_le(&STREAM);
        assert_eq!(r.read(2).unwrap(), 1);
        assert_eq!(r.read(3).unwrap(), 4);
        assert_eq!(r.read(5).unwrap(), 13);
        assert_eq!(r.read(3).unwrap(), 3);
        assert_eq!(r.read(19).unwrap(), 0x609DF);
    }

    #[test]
    fn scenario_7_unary_little_endian() {
        let mut r = reader_le(&STREAM);
        let got: Vec<u32> = (0..5).map(|_| r.read_unary(0).unwrap()).collect();
        assert_eq!(got, vec![1, 0, 0, 2, 2]);
    }

    #[test]
    fn byte_align_clears_partial_state() {
        let mut r = reader_be(&STREAM);
        let _ = r.read(3).unwrap();
        assert!(!r.byte_aligned());
        r.byte_align();
        assert!(r.byte_aligned());
    }

    #[test]
    fn set_endianness_byte_aligns_and_switches_order() {
        let mut r = reader_be(&STREAM);
        let _ = r.read(3).unwrap();
        r.set_endianness(Endianness::Little);
        assert!(r.byte_aligned());
        assert_eq!(r.read(8).unwrap(), 0xED);
    }

    #[test]
    fn setpos_of_getpos_is_a_no_op() {
        let mut r = reader_be(&STREAM);
        let _ = r.read(6).unwrap();
        let pos = r.getpos().unwrap();
        let before = r.read(10).unwrap();
        r.setpos(&pos).unwrap();
        let after = r.read(10).unwrap();
        assert_eq!(before, after);
        r.release(pos);
    }

    #[test]
    fn external_backend_setpos_of_getpos_is_a_no_op() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let data: Vec<u8> = (0u8..20).collect();
        let cursor = Rc::new(RefCell::new(0usize));

        let d = data.clone();
        let c = cursor.clone();
        let read = move |buf: &mut [u8]| -> std::io::Result<usize> {
            let mut pos = c.borrow_mut();
            let n = buf.len().min(d.len().saturating_sub(*pos));
            buf[..n].copy_from_slice(&d[*pos..*pos + n]);
            *pos += n;
            Ok(n)
        };

        let c = cursor.clone();
        let get_pos = move || -> std::io::Result<u64> { Ok(*c.borrow() as u64) };

        let c = cursor.clone();
        let set_pos = move |p: u64| -> std::io::Result<()> {
            *c.borrow_mut() = p as usize;
            Ok(())
        };

        let external = ExternalReader::new(read).with_readahead_bytes(4).with_position(get_pos, set_pos);
        let mut r = BitstreamReader::from_external(Endianness::Big, external);

        let _ = r.read_bytes(6).unwrap();
        let pos = r.getpos().unwrap();
        let before = r.read_bytes(10).unwrap();
        r.setpos(&pos).unwrap();
        let after = r.read_bytes(10).unwrap();
        assert_eq!(before, after);
        r.release(pos);
    }

    #[test]
    fn seek_past_end_then_read_aborts() {
        let mut r = reader_be(&STREAM);
        r.seek(r.size() as i64, Whence::Set).unwrap();
        assert!(r.read_bytes(1).is_err());
    }

    #[test]
    fn seek_to_negative_one_from_set_aborts() {
        let mut r = reader_be(&STREAM);
        assert!(r.seek(-1, Whence::Set).is_err());
    }

    #[test]
    fn unread_then_reread_round_trips() {
        let mut r = reader_be(&STREAM);
        let first = r.read(1).unwrap();
        r.unread(first as u8).unwrap();
        let reread = r.read(1).unwrap();
        assert_eq!(first, reread);
    }

    #[test]
    fn substream_copies_bytes_into_an_independent_reader() {
        let mut r = reader_be(&STREAM);
        let mut sub = r.substream(2).unwrap();
        assert_eq!(sub.read(8).unwrap(), 0xB1);
        assert_eq!(sub.read(8).unwrap(), 0xED);
        assert_eq!(r.read(8).unwrap(), 0x3B);
    }

    #[test]
    fn enqueue_copies_bytes_into_a_queue_backed_reader() {
        let mut r = reader_be(&STREAM);
        let mut q = BitstreamReader::from_queue(Endianness::Big);
        r.enqueue(2, &mut q).unwrap();
        assert_eq!(q.read(8).unwrap(), 0xB1);
        assert_eq!(q.read(8).unwrap(), 0xED);
    }

    #[test]
    fn callback_fires_once_per_whole_byte() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let mut r = reader_be(&STREAM);
        r.push_callback(move |_| *c.borrow_mut() += 1);
        let _ = r.read(16).unwrap();
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn popping_an_empty_callback_stack_still_succeeds() {
        let mut r = reader_be(&STREAM);
        r.pop_callback();
    }

    #[test]
    fn closing_with_an_unreleased_position_handle_logs_a_warning() {
        let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
        let mut r = reader_be(&STREAM);
        let _pos = r.getpos().unwrap();
        r.close().unwrap();
    }

    #[test]
    fn closed_reader_aborts_immediately_and_is_idempotent() {
        let mut r = reader_be(&STREAM);
        r.close().unwrap();
        assert!(matches!(r.read(1), Err(BitstreamError::Closed)));
        r.close().unwrap();
    }
}
