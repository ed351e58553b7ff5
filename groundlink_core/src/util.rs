//! Small hex and timing helpers shared across the engine.

/// Format `val` as `width` upper-case hex digits, zero padded.
#[inline]
pub fn to_hex(val: u32, width: usize) -> String {
    format!("{val:0width$X}")
}

/// True when `s` is a non-empty, even-length string of hex digits.
pub fn is_hex_bytes(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Case-insensitive comparison of two hex strings.
#[inline]
pub fn hex_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Elapsed time between two UTC instants as a std `Duration`, 0 when `to`
/// precedes `from`.
pub fn elapsed_between(
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
) -> std::time::Duration {
    (to - from).to_std().unwrap_or(std::time::Duration::ZERO)
}
