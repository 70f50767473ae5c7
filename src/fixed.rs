//! Unsigned fixed point values with `FRAC_BITS` fractional bits.
//!
//! Used for the PLL fractional dividers. Conversion from a ratio rounds half up,
//! a fraction that rounds up to `1 << FRAC_BITS` carries into the integer part.

/// `integer + fraction / 2^FRAC_BITS`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Fixed<const FRAC_BITS: u32> {
    integer: u64,
    fraction: u32,
}

impl<const FRAC_BITS: u32> Fixed<FRAC_BITS> {
    /// `1.0` in fraction units
    pub const ONE: u64 = 1 << FRAC_BITS;

    /// `0.5` in fraction units
    pub const HALF: u32 = 1 << (FRAC_BITS - 1);

    /// Build from raw parts, `None` if the fraction is not below `ONE`.
    pub fn new(integer: u64, fraction: u32) -> Option<Self> {
        if (fraction as u64) < Self::ONE {
            Some(Fixed { integer, fraction })
        } else {
            None
        }
    }

    /// `round(num / den)` to `FRAC_BITS` of fraction.
    ///
    /// The remainder is scaled by `2^FRAC_BITS` after dividing the common power
    /// of two out of the denominator, so 64 bits are enough for any remainder
    /// below `den`. E.g. `den = 80 MHz` scales by 2048 and divides by 78125
    /// for 21 fraction bits.
    ///
    /// `None` on division by zero or if the scaled remainder overflows.
    pub fn from_ratio(num: u64, den: u64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let integer = num / den;
        let rem = num % den;

        let shift = den.trailing_zeros().min(FRAC_BITS);
        let den = den >> shift;
        let scale = 1u64 << (FRAC_BITS - shift);

        let fraction = rem.checked_mul(scale)?.checked_add(den >> 1)? / den;
        if fraction >= Self::ONE {
            Some(Fixed { integer: integer + 1, fraction: 0 })
        } else {
            Some(Fixed { integer, fraction: fraction as u32 })
        }
    }

    #[inline]
    pub fn integer(&self) -> u64 {
        self.integer
    }

    #[inline]
    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    /// Value scaled by `2^FRAC_BITS`, `None` on overflow
    pub fn to_bits(&self) -> Option<u64> {
        self.integer
            .checked_mul(Self::ONE)?
            .checked_add(self.fraction as u64)
    }

    /// `self * k`, truncated to whole units
    pub fn mul_floor(&self, k: u64) -> u64 {
        let frac = (self.fraction as u128 * k as u128) >> FRAC_BITS;
        (self.integer as u128 * k as u128 + frac) as u64
    }
}

#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
proptest! {
    #[test]
    fn ratio_within_half_lsb(num in 0u64..1 << 40, den in 1u64..1 << 30) {
        let f = Fixed::<21>::from_ratio(num, den).unwrap();
        // |bits/2^21 - num/den| <= 1/2^22  <=>  |bits*den - num*2^21| * 2 <= den
        let bits = f.to_bits().unwrap() as i128;
        let diff = (bits * den as i128 - ((num as i128) << 21)).abs();
        prop_assert!(diff * 2 <= den as i128);
        prop_assert!((f.fraction() as u64) < Fixed::<21>::ONE);
    }

    #[test]
    fn exact_halves(n in 0u64..1 << 32) {
        let f = Fixed::<28>::from_ratio(n, 2).unwrap();
        prop_assert_eq!(f.integer(), n / 2);
        prop_assert_eq!(f.fraction(), if n & 1 == 1 { Fixed::<28>::HALF } else { 0 });
    }
}
