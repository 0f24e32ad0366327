//! Content checksums
//!
//! A document's identity is the MD5 digest of the UTF-8 encoding of its text,
//! stored and exported as 32 lowercase hex characters.

use md5::{Digest, Md5};
use std::fmt::Write as _;

/// Length of a hex-encoded checksum
pub const CHECKSUM_HEX_LEN: usize = 32;

/// MD5 hex digest of `text`'s UTF-8 bytes
pub fn content_checksum(text: &str) -> String {
    let digest = Md5::digest(text.as_bytes());
    let mut out = String::with_capacity(CHECKSUM_HEX_LEN);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Normalize a checksum declared in an input file
///
/// Surrounding whitespace is ignored and hex digits are lowercased. Returns
/// `None` unless the result is exactly 32 hex digits.
pub fn normalize_checksum(declared: &str) -> Option<String> {
    let trimmed = declared.trim();
    if trimmed.len() == CHECKSUM_HEX_LEN && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(trimmed.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(content_checksum(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            content_checksum("The quick brown fox jumps over the lazy dog"),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_checksum_uses_utf8_bytes() {
        // "é" as one code point and as e + combining accent are different texts
        assert_ne!(content_checksum("\u{e9}"), content_checksum("e\u{301}"));
        assert_eq!(content_checksum("\u{e9}").len(), CHECKSUM_HEX_LEN);
    }

    #[test]
    fn test_normalize_checksum() {
        assert_eq!(
            normalize_checksum(" 9E107D9D372BB6826BD81D3542A419D6 "),
            Some("9e107d9d372bb6826bd81d3542a419d6".to_string())
        );
        assert_eq!(normalize_checksum("abc"), None);
        assert_eq!(normalize_checksum("zz107d9d372bb6826bd81d3542a419d6"), None);
    }
}
