use tracing::{debug, info};

use crate::parsing::normalize::is_known_alias;
use crate::parsing::values::is_numeric_token;
use crate::sniff::delimiter::Delimiter;

/// File lines read while looking for a header.
pub const HEADER_SCAN_LINES: usize = 60;
/// Data-bearing lines considered as header candidates.
pub const HEADER_CANDIDATES: usize = 30;
/// A header is mostly text: more than this share of non-numeric fields.
pub const HEADER_TEXT_RATIO: f64 = 0.6;
/// The line after a header is mostly numbers.
pub const HEADER_NUMERIC_RATIO: f64 = 0.5;
/// Share of fields that must be known column aliases.
pub const ALIAS_MATCH_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderGuess {
    /// File lines to skip before the table (or its header) starts.
    pub skip_rows: usize,
    /// The first line after `skip_rows` is a header.
    pub has_header: bool,
}

/// Locate the header row, or the start of headerless data.
///
/// Blank and comment lines before the first data line are counted into the
/// skip offset. A candidate is a header when it is mostly text and the next
/// line is mostly numeric with the same field count, or when most of its
/// fields are known column aliases.
pub fn sniff_header(text: &str, delimiter: Delimiter, comment_prefix: &str) -> HeaderGuess {
    let mut leading_skip = 0;
    let mut candidates: Vec<(usize, &str)> = Vec::new();

    for (i, line) in text.lines().take(HEADER_SCAN_LINES).enumerate() {
        let trimmed = line.trim();
        let is_comment = !comment_prefix.is_empty() && trimmed.starts_with(comment_prefix);
        if trimmed.is_empty() || is_comment {
            if candidates.is_empty() {
                leading_skip = i + 1;
            }
            continue;
        }
        candidates.push((i, trimmed));
        if candidates.len() >= HEADER_CANDIDATES {
            break;
        }
    }

    for (pos, (line_index, line)) in candidates.iter().enumerate() {
        let fields = delimiter.split(line);
        if fields.is_empty() {
            continue;
        }
        let n = fields.len() as f64;

        let text_fields = fields.iter().filter(|f| !is_numeric_token(f)).count();
        let mostly_text = text_fields as f64 / n > HEADER_TEXT_RATIO;

        let data_below = candidates.get(pos + 1).is_some_and(|(_, next)| {
            let next_fields = delimiter.split(next);
            next_fields.len() == fields.len() && {
                let numeric = next_fields.iter().filter(|f| is_numeric_token(f)).count();
                numeric as f64 / next_fields.len() as f64 > HEADER_NUMERIC_RATIO
            }
        });

        let alias_hits = fields.iter().filter(|f| is_known_alias(f)).count();
        let alias_like = alias_hits as f64 / n > ALIAS_MATCH_RATIO;

        if (mostly_text && data_below) || alias_like {
            info!(line = line_index + 1, "header row detected");
            return HeaderGuess {
                skip_rows: *line_index,
                has_header: true,
            };
        }
    }

    debug!(skip = leading_skip, "no header row detected");
    HeaderGuess {
        skip_rows: leading_skip,
        has_header: false,
    }
}
