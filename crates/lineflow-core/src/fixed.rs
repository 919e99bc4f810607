use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Used for probabilities and ratios so the tick loop never touches floats.
pub type Fixed64 = I32F32;

/// Simulated milliseconds. The atomic unit of line time.
pub type Millis = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// `num / den` clamped to `[0, 1]`.
///
/// Works for the full `u64` range by scaling in `u128`, so cumulative
/// millisecond counters never overflow the Q32.32 integer part. A zero
/// denominator yields zero.
pub fn ratio(num: u128, den: u128) -> Fixed64 {
    if den == 0 || num == 0 {
        return Fixed64::ZERO;
    }
    if num >= den {
        return Fixed64::ONE;
    }
    // num < den, so the quotient is < 2^32 and fits the fractional bits.
    let bits = (num << 32) / den;
    Fixed64::from_bits(bits as i64)
}
