//! Signed/unsigned conversion for fixed-width integers: textbook
//! two's-complement sign extension, `signed = unsigned - (1 << count)`
//! when the sign bit is set (see `DESIGN.md` for why this module settled
//! on that formula over a naive `unsigned - (1 << (count - 1))`).

use num_bigint::{BigInt, BigUint, Sign};

use crate::error::{BitstreamError, Result};

/// Reinterprets the low `n` bits of `unsigned` as a two's-complement
/// signed value.
pub(crate) fn extend(unsigned: u64, n: u32) -> i64 {
    if n == 0 {
        return 0;
    }
    let sign_bit = 1u64 << (n - 1);
    if unsigned & sign_bit != 0 {
        (unsigned as i128 - (1i128 << n)) as i64
    } else {
        unsigned as i64
    }
}

/// The inverse of [`extend`]: packs a signed value into its `n`-bit
/// two's-complement unsigned representation.
pub(crate) fn unsign(signed: i64, n: u32) -> u64 {
    if signed < 0 {
        ((signed as i128) + (1i128 << n)) as u64
    } else {
        signed as u64
    }
}

pub(crate) fn extend_big(unsigned: &BigUint, n: u32) -> BigInt {
    if n == 0 {
        return BigInt::from(0);
    }
    if unsigned.bit((n - 1) as u64) {
        BigInt::from_biguint(Sign::Plus, unsigned.clone()) - (BigInt::from(1) << n as usize)
    } else {
        BigInt::from_biguint(Sign::Plus, unsigned.clone())
    }
}

pub(crate) fn unsign_big(signed: &BigInt, n: u32) -> Result<BigUint> {
    let err = || BitstreamError::ContractViolation("signed value out of range for the given bit width");
    if signed.sign() == Sign::Minus {
        let wrapped = signed + (BigInt::from(1) << n as usize);
        wrapped.to_biguint().ok_or_else(err)
    } else {
        signed.to_biguint().ok_or_else(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extends_two_complement_values() {
        assert_eq!(extend(0b10, 2), -2);
        assert_eq!(extend(0b110, 3), -2);
        assert_eq!(extend(0b111, 5), 7);
        assert_eq!(extend(0b101, 3), -3);
        assert_eq!(extend(0x53BC1, 19), -181311);
    }

    #[test]
    fn round_trips_across_the_representable_range() {
        for n in 1u32..=32 {
            let max = (1i64 << (n - 1)) - 1;
            let min = -(1i64 << (n - 1));
            for &v in &[min, min + 1, -1, 0, 1, max - 1, max] {
                let u = unsign(v, n);
                assert_eq!(extend(u, n), v, "n={n} v={v}");
            }
        }
    }

    #[test]
    fn unsign_big_rejects_a_negative_value_too_wide_for_the_width() {
        assert!(unsign_big(&BigInt::from(-1000), 2).is_err());
        assert!(unsign_big(&BigInt::from(-2), 2).is_ok());
        assert!(unsign_big(&BigInt::from(1), 2).is_ok());
    }
}
