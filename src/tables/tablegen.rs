//! The table generator. Pure, dependency-free functions over the 9-bit
//! reader/writer state so the same code can run from `build.rs` (to emit
//! the static tables baked into the crate) and from `#[cfg(test)]` (to
//! check the generator's properties directly, independent of the engine
//! that consumes its output).
//!
//! `include!`-ed verbatim into both `build.rs` and `src/tables/mod.rs`,
//! it must not reference anything outside `std`.

/// One cell of the fixed-width read jump table: consuming up to 8 bits
/// from a given state produces a new state, a bit count, and a value.
#[derive(Clone, Copy)]
pub struct ReadEntry {
    pub new_state: u16,
    pub produced_bits: u8,
    pub produced_value: u32,
}

/// One cell of the unary jump table.
#[derive(Clone, Copy)]
pub struct UnaryEntry {
    pub continues: bool,
    pub increment: u8,
    pub new_state: u16,
}

/// One cell of the single-bit unread table.
#[derive(Clone, Copy)]
pub struct UnreadEntry {
    pub limit_reached: bool,
    pub new_state: u16,
}

/// Decodes the self-describing 9-bit state into `(remaining, value)`.
/// `state == 0` has no decomposition (the empty state).
pub fn decode_state(state: u16) -> Option<(u8, u8)> {
    if state == 0 {
        return None;
    }
    let bit_length = 16 - state.leading_zeros() as u8;
    let remaining = bit_length - 1;
    let value = (state ^ (1u16 << remaining)) as u8;
    Some((remaining, value))
}

/// Encodes `(remaining, value)` back into the 9-bit state. `remaining == 0`
/// always collapses to the empty state, regardless of `value`.
pub fn encode_state(remaining: u8, value: u8) -> u16 {
    if remaining == 0 {
        0
    } else {
        (1u16 << remaining) | value as u16
    }
}

/// A freshly loaded byte always has all 8 of its bits unconsumed.
pub fn state_from_byte(byte: u8) -> u16 {
    0x100 | byte as u16
}

/// Consumes up to `want` bits (1..=8) from `(remaining, value)` in the
/// given bit order. Returns `(produced_bits, produced_value, new_remaining,
/// new_value)`. `produced_bits` is always `min(want, remaining)`.
pub fn consume(big_endian: bool, remaining: u8, value: u8, want: u8) -> (u8, u32, u8, u8) {
    let produced = if want < remaining { want } else { remaining };
    if big_endian {
        let new_remaining = remaining - produced;
        let produced_value = (value >> new_remaining) as u32 & mask32(produced);
        let new_value = value & mask8(new_remaining);
        (produced, produced_value, new_remaining, new_value)
    } else {
        let new_remaining = remaining - produced;
        let produced_value = value as u32 & mask32(produced);
        let new_value = value >> produced;
        (produced, produced_value, new_remaining, new_value)
    }
}

/// Scans `(remaining, value)` for the first occurrence of `stop_bit`,
/// returning `(continues, increment, new_remaining, new_value)`.
/// `continues == true` means the whole buffered byte was consumed
/// without finding the stop bit (the caller must fetch another byte).
pub fn scan_unary(big_endian: bool, remaining: u8, value: u8, stop_bit: u8) -> (bool, u8, u8, u8) {
    if big_endian {
        let mut pos = remaining;
        while pos > 0 {
            pos -= 1;
            let bit = (value >> pos) & 1;
            if bit == stop_bit {
                let increment = remaining - 1 - pos;
                let new_value = value & mask8(pos);
                return (false, increment, pos, new_value);
            }
        }
        (true, remaining, 0, 0)
    } else {
        let mut pos = 0u8;
        while pos < remaining {
            let bit = (value >> pos) & 1;
            if bit == stop_bit {
                let new_remaining = remaining - pos - 1;
                let new_value = value >> (pos + 1);
                return (false, pos, new_remaining, new_value);
            }
            pos += 1;
        }
        (true, remaining, 0, 0)
    }
}

/// Pushes a single bit back in front of `(remaining, value)`. Fails (sets
/// `limit_reached`) once `remaining == 8`: a state can never buffer more
/// than one full byte.
pub fn unread(big_endian: bool, remaining: u8, value: u8, bit: u8) -> (bool, u8, u8) {
    if remaining >= 8 {
        return (true, remaining, value);
    }
    if big_endian {
        (false, remaining + 1, value | (bit << remaining))
    } else {
        (false, remaining + 1, (value << 1) | bit)
    }
}

fn mask8(bits: u8) -> u8 {
    if bits >= 8 { 0xFF } else { (1u8 << bits) - 1 }
}

fn mask32(bits: u8) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

/// Builds the 512-row, 8-column read-bits jump table for one bit order.
pub fn build_read_table(big_endian: bool) -> Vec<[ReadEntry; 8]> {
    let mut table = Vec::with_capacity(512);
    for state in 0u32..512 {
        let mut row = [ReadEntry { new_state: 0, produced_bits: 0, produced_value: 0 }; 8];
        if let Some((remaining, value)) = decode_state(state as u16) {
            for (n, slot) in row.iter_mut().enumerate() {
                let want = (n + 1) as u8;
                let (produced, produced_value, new_remaining, new_value) =
                    consume(big_endian, remaining, value, want);
                *slot = ReadEntry {
                    new_state: encode_state(new_remaining, new_value),
                    produced_bits: produced,
                    produced_value,
                };
            }
        }
        table.push(row);
    }
    table
}

/// Builds the 512-row, 2-column (stop-bit) unary jump table.
pub fn build_unary_table(big_endian: bool) -> Vec<[UnaryEntry; 2]> {
    let mut table = Vec::with_capacity(512);
    for state in 0u32..512 {
        let mut row = [UnaryEntry { continues: false, increment: 0, new_state: 0 }; 2];
        if let Some((remaining, value)) = decode_state(state as u16) {
            for (stop_bit, slot) in row.iter_mut().enumerate() {
                let (continues, increment, new_remaining, new_value) =
                    scan_unary(big_endian, remaining, value, stop_bit as u8);
                *slot = UnaryEntry {
                    continues,
                    increment,
                    new_state: encode_state(new_remaining, new_value),
                };
            }
        }
        table.push(row);
    }
    table
}

/// Builds the 512-row, 2-column (pushed-back bit) unread table.
pub fn build_unread_table(big_endian: bool) -> Vec<[UnreadEntry; 2]> {
    let mut table = Vec::with_capacity(512);
    for state in 0u32..512 {
        let mut row = [UnreadEntry { limit_reached: false, new_state: 0 }; 2];
        let (remaining, value) = decode_state(state as u16).unwrap_or((0, 0));
        for (bit, slot) in row.iter_mut().enumerate() {
            let (limit_reached, new_remaining, new_value) =
                unread(big_endian, remaining, value, bit as u8);
            *slot = UnreadEntry {
                limit_reached,
                new_state: if limit_reached { state as u16 } else { encode_state(new_remaining, new_value) },
            };
        }
        table.push(row);
    }
    table
}
