//! The format mini-language: a compact string driving declarative
//! parse/build of packed structures, shared between
//! [`crate::reader::BitstreamReader`] and [`crate::writer::BitstreamWriter`].

use num_bigint::{BigInt, BigUint};

use crate::error::{BitstreamError, Result};
use crate::reader::BitstreamReader;
use crate::writer::BitstreamWriter;

/// One value produced by `parse` or consumed by `build`, tagged by which
/// format code produced/consumes it.
#[derive(Debug, Clone)]
pub enum FormatValue {
    Unsigned(u32),
    Signed(i32),
    WideUnsigned(u64),
    WideSigned(i64),
    BigUnsigned(BigUint),
    BigSigned(BigInt),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token {
    pub(crate) repeat: u32,
    pub(crate) size: u32,
    pub(crate) code: char,
}

const KNOWN_CODES: &str = "usUSKLpPba";

/// Grammar: `([0-9]+\*)?\s*[0-9]*\s*[usUSKLpPba]`, whitespace-tolerant.
/// An unknown code terminates parsing silently.
pub(crate) fn tokenize(format: &str) -> Vec<Token> {
    let chars: Vec<char> = format.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let digits_start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let mut repeat = 1u32;
        if i < chars.len() && chars[i] == '*' && i > digits_start {
            repeat = chars[digits_start..i].iter().collect::<String>().parse().unwrap_or(1);
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
        } else {
            i = digits_start;
        }

        let size_start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let size: u32 = if i > size_start { chars[size_start..i].iter().collect::<String>().parse().unwrap_or(0) } else { 0 };
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        if i >= chars.len() {
            break;
        }
        let code = chars[i];
        if !KNOWN_CODES.contains(code) {
            break;
        }
        i += 1;
        tokens.push(Token { repeat, size, code });
    }

    tokens
}

/// The total bit width a format string describes; `a` rounds the running
/// count up to the next byte boundary.
pub fn format_size(format: &str) -> u64 {
    let mut bits: u64 = 0;
    for tok in tokenize(format) {
        for _ in 0..tok.repeat {
            bits += match tok.code {
                'u' | 's' | 'U' | 'S' | 'K' | 'L' | 'p' => tok.size as u64,
                'P' | 'b' => tok.size as u64 * 8,
                'a' => {
                    let rem = bits % 8;
                    if rem == 0 { 0 } else { 8 - rem }
                }
                _ => 0,
            };
        }
    }
    bits
}

/// The number of `FormatValue`s a `parse`/`build` call against this format
/// string produces/consumes. `p`, `P`, and `a` produce no value.
pub fn format_arity(format: &str) -> usize {
    tokenize(format)
        .iter()
        .map(|t| match t.code {
            'p' | 'P' | 'a' => 0,
            _ => t.repeat as usize,
        })
        .sum()
}

pub(crate) fn parse(reader: &mut BitstreamReader, format: &str) -> Result<Vec<FormatValue>> {
    let mut out = Vec::new();
    for tok in tokenize(format) {
        for _ in 0..tok.repeat {
            match tok.code {
                'u' => out.push(FormatValue::Unsigned(reader.read(tok.size)?)),
                's' => out.push(FormatValue::Signed(reader.read_signed(tok.size)?)),
                'U' => out.push(FormatValue::WideUnsigned(reader.read64(tok.size)?)),
                'S' => out.push(FormatValue::WideSigned(reader.read_signed_64(tok.size)?)),
                'K' => out.push(FormatValue::BigUnsigned(reader.read_bigint(tok.size)?)),
                'L' => out.push(FormatValue::BigSigned(reader.read_signed_bigint(tok.size)?)),
                'p' => reader.skip(tok.size as u64)?,
                'P' => reader.skip_bytes(tok.size as u64)?,
                'b' => out.push(FormatValue::Bytes(reader.read_bytes(tok.size as u64)?)),
                'a' => reader.byte_align(),
                _ => {}
            }
        }
    }
    Ok(out)
}

pub(crate) fn build(writer: &mut BitstreamWriter, format: &str, values: &[FormatValue]) -> Result<()> {
    let mut cursor = values.iter();
    let mut next = |code: char| -> Result<&FormatValue> {
        cursor.next().ok_or(BitstreamError::ContractViolation(match code {
            'b' => "build: not enough values supplied for format string (bytes)",
            _ => "build: not enough values supplied for format string",
        }))
    };

    for tok in tokenize(format) {
        for _ in 0..tok.repeat {
            match tok.code {
                'u' => match next('u')? {
                    FormatValue::Unsigned(v) => writer.write(tok.size, *v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected an unsigned value")),
                },
                's' => match next('s')? {
                    FormatValue::Signed(v) => writer.write_signed(tok.size, *v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected a signed value")),
                },
                'U' => match next('U')? {
                    FormatValue::WideUnsigned(v) => writer.write64(tok.size, *v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected a wide unsigned value")),
                },
                'S' => match next('S')? {
                    FormatValue::WideSigned(v) => writer.write_signed_64(tok.size, *v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected a wide signed value")),
                },
                'K' => match next('K')? {
                    FormatValue::BigUnsigned(v) => writer.write_bigint(tok.size, v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected a bigint value")),
                },
                'L' => match next('L')? {
                    FormatValue::BigSigned(v) => writer.write_signed_bigint(tok.size, v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected a signed bigint value")),
                },
                'p' => writer.write(tok.size, 0)?,
                'P' => writer.write_bytes(&vec![0u8; tok.size as usize])?,
                'b' => match next('b')? {
                    FormatValue::Bytes(v) => writer.write_bytes(v)?,
                    _ => return Err(BitstreamError::ContractViolation("build: expected a byte buffer")),
                },
                'a' => writer.byte_align()?,
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::Endianness;

    #[test]
    fn tokenizes_sizes_and_repeats() {
        let tokens = tokenize("2u 3*8u p4 a");
        assert_eq!(tokens.len(), 4);
        assert_eq!((tokens[0].size, tokens[0].code), (2, 'u'));
        assert_eq!((tokens[1].repeat, tokens[1].size, tokens[1].code), (3, 8, 'u'));
        assert_eq!((tokens[2].size, tokens[2].code), (4, 'p'));
        assert_eq!(tokens[3].code, 'a');
    }

    #[test]
    fn unknown_code_terminates_silently() {
        let tokens = tokenize("2u 3z 4u");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn format_size_rounds_align_up_to_byte_boundary() {
        assert_eq!(format_size("3u a"), 8);
        assert_eq!(format_size("8u a"), 8);
        assert_eq!(format_size("2u 3u 5u 3u 19u"), 32);
    }

    #[test]
    fn format_arity_counts_value_producing_tokens_only() {
        assert_eq!(format_arity("2u 3u 5u 3u 19u"), 5);
        assert_eq!(format_arity("3*8u p4 a"), 3);
    }

    #[test]
    fn build_then_parse_round_trips_the_spec_example() {
        use crate::writer::BitstreamWriter;

        let mut w = BitstreamWriter::new_buffered(Endianness::Big);
        let values = vec![
            FormatValue::Unsigned(2),
            FormatValue::Unsigned(6),
            FormatValue::Unsigned(7),
            FormatValue::Unsigned(5),
            FormatValue::Unsigned(342977),
        ];
        build(&mut w, "2u 3u 5u 3u 19u", &values).unwrap();
        w.flush().unwrap();
        let bytes = w.data().to_vec();
        assert_eq!(bytes, vec![0xB1, 0xED, 0x3B, 0xC1]);

        let mut r = BitstreamReader::from_bytes(Endianness::Big, bytes);
        let parsed = parse(&mut r, "2u 3u 5u 3u 19u").unwrap();
        let got: Vec<u32> = parsed
            .into_iter()
            .map(|v| match v {
                FormatValue::Unsigned(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(got, vec![2, 6, 7, 5, 342977]);
    }
}
