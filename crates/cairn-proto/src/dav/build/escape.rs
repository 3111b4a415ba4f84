//! The uniform value-escaping rule.
//!
//! Any human-supplied value (lock owner/comment, property values, commit
//! messages) is emitted as escaped character data when it is XML-safe and
//! as base64 with an `encoding="base64"` attribute otherwise.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Returns whether the bytes may be carried inline as XML character data.
///
/// The bytes must be valid UTF-8 and every scalar value must be a legal
/// XML 1.0 character.
#[must_use]
pub fn is_xml_safe(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };
    text.chars().all(is_xml_char)
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Encodes bytes for an `encoding="base64"` element body.
#[must_use]
pub fn base64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_safe() {
        assert!(is_xml_safe(b"fixed the frobnicator"));
        assert!(is_xml_safe("caf\u{e9} & <tags>".as_bytes()));
    }

    #[test]
    fn control_bytes_are_unsafe() {
        assert!(!is_xml_safe(b"nul\x00byte"));
        assert!(!is_xml_safe(b"\x08backspace"));
    }

    #[test]
    fn invalid_utf8_is_unsafe() {
        assert!(!is_xml_safe(&[0xff, 0xfe, 0x00]));
    }

    #[test]
    fn base64_round_trip() {
        use base64::Engine as _;
        let original = b"nul\x00byte";
        let encoded = base64_encode(original);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, original);
    }
}
