//! Deterministic station → dial position mapping.
//!
//! The hash is a cross-system identity contract: the catalog server and every
//! device must land a station on the same frequency, so the arithmetic below
//! is the classic 32-bit signed rolling string hash (`h = 31*h + c`, two's
//! complement wraparound), never a widened one.

/// Lowest dial position, in tenths of a MHz (87.0 MHz).
pub const FREQ_MIN: u16 = 870;
/// Highest dial position, in tenths of a MHz (106.9 MHz).
pub const FREQ_MAX: u16 = 1069;
/// Number of distinct dial positions.
pub const FREQ_COUNT: u32 = (FREQ_MAX - FREQ_MIN + 1) as u32;

/// 32-bit signed rolling hash over the codepoints of `s`.
pub fn string_hash(s: &str) -> i32 {
    s.chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Frequency for the station `(owner_token, name)`.
///
/// Hashes `name` followed by `owner_token`. The magnitude is taken as an
/// unsigned value so `i32::MIN` does not overflow.
pub fn assign(owner_token: &str, name: &str) -> u16 {
    let mut key = String::with_capacity(name.len() + owner_token.len());
    key.push_str(name);
    key.push_str(owner_token);
    let magnitude = string_hash(&key).unsigned_abs();
    FREQ_MIN + (magnitude % FREQ_COUNT) as u16
}

/// True when `freq` is on the dial.
pub fn in_range(freq: u16) -> bool {
    (FREQ_MIN..=FREQ_MAX).contains(&freq)
}

/// `1000` → `"100.0 MHz"`.
pub fn format_mhz(freq: u16) -> String {
    format!("{}.{} MHz", freq / 10, freq % 10)
}
