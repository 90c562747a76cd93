//! Encoding, delimiter and header detection for loosely specified text input.

pub mod delimiter;
pub mod encoding;
pub mod header;

pub use delimiter::{sniff_delimiter, Delimiter, DelimiterGuess};
pub use encoding::{decode_text, detect_encoding, DecodedText, TextEncoding};
pub use header::{sniff_header, HeaderGuess};

/// Everything needed to parse a delimited text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    pub delimiter: DelimiterGuess,
    pub header: HeaderGuess,
}

/// Sniff delimiter and header position of already decoded text.
pub fn sniff_layout(text: &str, comment_prefix: &str) -> TextLayout {
    let delimiter = sniff_delimiter(text, comment_prefix);
    let header = sniff_header(text, delimiter.delimiter, comment_prefix);
    TextLayout { delimiter, header }
}
