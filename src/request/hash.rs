//! Cheap rolling hash for request bodies.
//!
//! Not collision resistant. Callers that need unique keys pass an explicit
//! cache key instead.

/// `h = h * 31 + unit` over the UTF-16 code units of `input` in wrapping
/// 32-bit arithmetic, rendered as the base-36 absolute value.
pub fn body_hash(input: &str) -> String {
    let hash = input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    to_base36(i64::from(hash).unsigned_abs())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}
