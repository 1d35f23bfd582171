//! Trademark serial number format validation.
//!
//! A registry serial number is exactly eight ASCII digits (e.g.
//! `"88000001"`). Lookups for malformed serials are classified as
//! `not_found` without ever touching the network, so this check sits in
//! front of every registry call.

/// Required length of a trademark serial number.
pub const SERIAL_LEN: usize = 8;

/// Returns `true` if `serial` is a well-formed trademark serial number.
pub fn is_valid_serial(serial: &str) -> bool {
    serial.len() == SERIAL_LEN && serial.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_eight_digit_serial() {
        assert!(is_valid_serial("88000001"));
        assert!(is_valid_serial("00000000"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid_serial(""));
        assert!(!is_valid_serial("8800001"));
        assert!(!is_valid_serial("880000011"));
    }

    #[test]
    fn rejects_non_digits() {
        assert!(!is_valid_serial("88-00001"));
        assert!(!is_valid_serial("8800000a"));
        // Multi-byte characters must not pass the length check either.
        assert!(!is_valid_serial("8800000é"));
    }
}
