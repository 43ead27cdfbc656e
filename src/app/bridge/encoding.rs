use encoding_rs::{Encoding, GB18030, GBK};

/// Best-effort transcoding of subprocess output into valid UTF-8.
///
/// Decoders are tried in order: strict UTF-8 passthrough, then GBK, then
/// GB18030, each accepted only if it decodes without substitutions. The
/// terminal fallback strips replacement markers from a lossy decode, so
/// normalization itself can never fail a caller. The second value is true
/// whenever a non-UTF-8 path was taken (informational, never an error).
pub fn normalize(bytes: &[u8]) -> (String, bool) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), false);
    }

    let legacy_codecs: [&'static Encoding; 2] = [GBK, GB18030];
    for codec in legacy_codecs {
        let (decoded, _, had_errors) = codec.decode(bytes);
        if !had_errors {
            return (decoded.into_owned(), true);
        }
    }

    let stripped: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|ch| *ch != '\u{FFFD}')
        .collect();
    (stripped, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_utf8_passes_through_unchanged() {
        let input = "hello 设备\n".as_bytes();
        let (text, recovered) = normalize(input);
        assert_eq!(text, "hello 设备\n");
        assert!(!recovered);
    }

    #[test]
    fn gbk_bytes_are_transcoded_losslessly() {
        // "中文" in GBK, which is not valid UTF-8.
        let input = [0xD6, 0xD0, 0xCE, 0xC4];
        assert!(std::str::from_utf8(&input).is_err());
        let (text, recovered) = normalize(&input);
        assert_eq!(text, "中文");
        assert!(recovered);
    }

    #[test]
    fn undecodable_bytes_fall_back_to_stripped_lossy() {
        // 0xFF is not a valid lead byte in UTF-8, GBK, or GB18030.
        let input = [0xFF, 0xFF, b'o', b'k'];
        let (text, recovered) = normalize(&input);
        assert_eq!(text, "ok");
        assert!(recovered);
        assert!(std::str::from_utf8(text.as_bytes()).is_ok());
    }

    #[test]
    fn empty_input_is_passthrough() {
        let (text, recovered) = normalize(&[]);
        assert_eq!(text, "");
        assert!(!recovered);
    }
}
