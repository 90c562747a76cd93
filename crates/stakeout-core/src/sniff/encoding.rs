use chardetng::EncodingDetector;
use encoding_rs::{
    DecoderResult, Encoding, ISO_8859_6, KOI8_R, KOI8_U, UTF_8, WINDOWS_1252, WINDOWS_1256,
    X_MAC_CYRILLIC,
};
use tracing::{debug, info, warn};

use crate::error::PointError;

/// Bytes examined by the ordered trial decode.
pub const TRIAL_SAMPLE_SIZE: usize = 8192;
/// Bytes fed to the statistical detector.
pub const DETECTOR_SAMPLE_SIZE: usize = 16384;
/// The statistical guess is used only above this confidence.
pub const DETECTOR_MIN_CONFIDENCE: f64 = 0.75;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A detected text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    pub encoding: &'static Encoding,
    /// Input starts with a UTF-8 byte order mark that must be skipped.
    pub bom: bool,
}

impl TextEncoding {
    const fn plain(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            bom: false,
        }
    }

    pub fn name(&self) -> &'static str {
        if self.bom {
            "UTF-8-SIG"
        } else {
            self.encoding.name()
        }
    }
}

/// Trial order: UTF-8 with and without BOM, the two Arabic code pages, Latin-1.
fn trial_candidates() -> [TextEncoding; 5] {
    [
        TextEncoding {
            encoding: UTF_8,
            bom: true,
        },
        TextEncoding::plain(UTF_8),
        TextEncoding::plain(WINDOWS_1256),
        TextEncoding::plain(ISO_8859_6),
        TextEncoding::plain(WINDOWS_1252),
    ]
}

/// Detectors confuse these with the Arabic code pages; their answers are ignored.
fn is_unreliable(encoding: &'static Encoding) -> bool {
    encoding == KOI8_R || encoding == KOI8_U || encoding == X_MAC_CYRILLIC
}

/// C0 control characters that never appear in survey text files.
fn is_binary_control(c: char) -> bool {
    matches!(c, '\0'..='\u{8}' | '\u{b}' | '\u{e}'..='\u{19}' | '\u{1b}'..='\u{1f}')
}

/// Best-guess encoding of `bytes`. Never fails; UTF-8 is the last resort.
pub fn detect_encoding(bytes: &[u8]) -> TextEncoding {
    let sample = &bytes[..bytes.len().min(TRIAL_SAMPLE_SIZE)];
    for candidate in trial_candidates() {
        if decodes_cleanly(candidate, sample) {
            debug!(encoding = candidate.name(), "encoding detected by trial decode");
            return candidate;
        }
    }

    let larger = &bytes[..bytes.len().min(DETECTOR_SAMPLE_SIZE)];
    match detect_statistically(larger) {
        Some(d) if d.confidence > DETECTOR_MIN_CONFIDENCE && !is_unreliable(d.encoding) => {
            info!(
                encoding = d.encoding.name(),
                confidence = d.confidence,
                "encoding detected statistically"
            );
            TextEncoding::plain(d.encoding)
        }
        Some(d) => {
            warn!(
                encoding = d.encoding.name(),
                confidence = d.confidence,
                "statistical encoding guess rejected, defaulting to UTF-8"
            );
            TextEncoding::plain(UTF_8)
        }
        None => TextEncoding::plain(UTF_8),
    }
}

/// Decoded text together with the encoding that produced it.
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Decode a whole input. The detected encoding is tried first, then every
/// trial candidate in order; only when all of them fail is the input rejected.
pub fn decode_text(bytes: &[u8]) -> Result<DecodedText, PointError> {
    let detected = detect_encoding(bytes);
    std::iter::once(detected)
        .chain(trial_candidates())
        .find_map(|candidate| {
            decode_full(candidate, bytes).map(|text| DecodedText {
                text,
                encoding: candidate,
            })
        })
        .ok_or(PointError::EncodingUndetectable)
}

fn payload(candidate: TextEncoding, bytes: &[u8]) -> Option<&[u8]> {
    if candidate.bom {
        bytes.strip_prefix(UTF8_BOM)
    } else {
        Some(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes))
    }
}

/// Strict decode of a sample. A multi-byte sequence cut off at the end of
/// the sample is not an error.
fn decodes_cleanly(candidate: TextEncoding, sample: &[u8]) -> bool {
    let Some(input) = payload(candidate, sample) else {
        return false;
    };
    let mut decoder = candidate.encoding.new_decoder_without_bom_handling();
    let Some(capacity) = decoder.max_utf8_buffer_length_without_replacement(input.len()) else {
        return false;
    };
    let mut out = String::with_capacity(capacity);
    let (result, _) = decoder.decode_to_string_without_replacement(input, &mut out, false);
    matches!(result, DecoderResult::InputEmpty) && !out.chars().any(is_binary_control)
}

fn decode_full(candidate: TextEncoding, bytes: &[u8]) -> Option<String> {
    let input = payload(candidate, bytes)?;
    let text = candidate
        .encoding
        .decode_without_bom_handling_and_without_replacement(input)?;
    if text.chars().any(is_binary_control) {
        return None;
    }
    Some(text.into_owned())
}

/// Statistical guess with a confidence in `0.0..=1.0`.
///
/// chardetng only says whether a guess is reliable, which maps to 1.0 or 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub encoding: &'static Encoding,
    pub confidence: f64,
}

fn assessed(encoding: &'static Encoding, reliable: bool) -> Detection {
    Detection {
        encoding,
        confidence: if reliable { 1.0 } else { 0.0 },
    }
}

/// Statistical guess over the whole sample. Pure ASCII is reported as UTF-8.
pub fn detect_statistically(sample: &[u8]) -> Option<Detection> {
    if sample.is_empty() {
        return None;
    }
    if sample.is_ascii() {
        let clean = !sample.iter().any(|b| is_binary_control(char::from(*b)));
        return Some(assessed(UTF_8, clean));
    }
    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    let (encoding, reliable) = detector.guess_assess(None, true);
    debug!(encoding = encoding.name(), reliable, "chardetng guess");
    Some(assessed(encoding, reliable))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_with_bom() {
        let bytes = b"\xEF\xBB\xBFPT,E,N\n1,2,3\n";
        let enc = detect_encoding(bytes);
        assert_eq!(enc, TextEncoding { encoding: UTF_8, bom: true });
        let decoded = decode_text(bytes).unwrap();
        assert!(decoded.text.starts_with("PT,E,N"));
    }

    #[test]
    fn plain_utf8_arabic() {
        let bytes = "رقم النقطة,شرق,شمال\n1,2,3\n".as_bytes();
        assert_eq!(detect_encoding(bytes), TextEncoding::plain(UTF_8));
        assert!(decode_text(bytes).unwrap().text.starts_with("رقم"));
    }

    #[test]
    fn windows_1256_arabic() {
        let (bytes, _, had_errors) = WINDOWS_1256.encode("وصف,شرق\nنقطة,1\n");
        assert!(!had_errors);
        assert_eq!(detect_encoding(&bytes), TextEncoding::plain(WINDOWS_1256));
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.text, "وصف,شرق\nنقطة,1\n");
    }

    #[test]
    fn truncated_sample_is_not_an_error() {
        let mut bytes = vec![b'a'; TRIAL_SAMPLE_SIZE - 1];
        bytes.extend_from_slice("é".as_bytes());
        assert_eq!(detect_encoding(&bytes), TextEncoding::plain(UTF_8));
    }

    #[test]
    fn binary_input_is_undetectable() {
        let bytes = [0u8, 1, 2, 3, 0xff, 0xfe, 0, 0, 7, 8];
        assert!(matches!(
            decode_text(&bytes),
            Err(PointError::EncodingUndetectable)
        ));
    }

    #[test]
    fn detector_recognizes_arabic_code_page() {
        let text = "رقم النقطة,الشرق,الشمال,المنسوب,الوصف\n\
                    1,500000,2500000,10,حافة الرصيف\n\
                    2,500001,2500001,11,عمود إنارة\n\
                    3,500002,2500002,12,غرفة تفتيش للصرف الصحي\n\
                    4,500003,2500003,13,منسوب أرض طبيعية\n";
        let (bytes, _, had_errors) = WINDOWS_1256.encode(text);
        assert!(!had_errors);
        let d = detect_statistically(&bytes).unwrap();
        assert!(d.encoding == WINDOWS_1256 || d.encoding == ISO_8859_6, "{}", d.encoding.name());
        assert!(!is_unreliable(d.encoding));
    }

    #[test]
    fn ascii_is_reported_as_utf8() {
        let d = detect_statistically(b"PT,E,N\n1,2,3\n").unwrap();
        assert_eq!(d, Detection { encoding: UTF_8, confidence: 1.0 });
        assert!(d.confidence > DETECTOR_MIN_CONFIDENCE);
        assert_eq!(detect_statistically(b"PT\x01E").unwrap().confidence, 0.0);
        assert!(detect_statistically(b"").is_none());
    }

    #[test]
    fn cyrillic_guesses_are_unreliable() {
        assert!(is_unreliable(KOI8_R));
        assert!(is_unreliable(KOI8_U));
        assert!(is_unreliable(X_MAC_CYRILLIC));
        assert!(!is_unreliable(WINDOWS_1256));
    }
}
