//! Register value normalization
//!
//! Measurement registers arrive as raw unsigned 16-bit words with an
//! inverted-offset sign convention: 32768 is the zero point and values
//! above it wrap into the negative range. This module decodes that
//! representation into plain signed integers.

/// Decode one raw register into a signed value
///
/// The zero point 32768 maps to 0, values above it map to
/// `raw - 65536`, everything else is returned unchanged.
///
/// # Examples
///
/// ```rust
/// use voltage_breaker_test::codec::normalize;
///
/// assert_eq!(normalize(32768), 0);
/// assert_eq!(normalize(65535), -1);
/// assert_eq!(normalize(230), 230);
/// ```
pub fn normalize(raw: u16) -> i16 {
    if raw == 32768 {
        return 0;
    }
    if raw > 32768 {
        return (raw as i32 - 65536) as i16;
    }
    raw as i16
}

/// Decode a sequence of raw registers in order
pub fn normalize_all(raw: &[u16]) -> Vec<i16> {
    raw.iter().map(|&value| normalize(value)).collect()
}
