use std::fmt;

use csv_nose::Sniffer;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lines read from the start of the input while sniffing.
pub const SNIFF_MAX_LINES: usize = 50;
/// Non-empty, non-comment lines that make up the sample.
pub const SNIFF_SAMPLE_LINES: usize = 20;
/// Spaces must outnumber each of comma, tab and semicolon by this factor
/// before whitespace runs are considered a delimiter.
pub const WHITESPACE_DOMINANCE: usize = 5;

/// Field separator of delimited text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delimiter {
    Char(u8),
    /// One or more whitespace characters.
    Whitespace,
}

impl Delimiter {
    pub const COMMA: Delimiter = Delimiter::Char(b',');

    /// Split a line on this delimiter without quote handling, trimming fields.
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Char(c) => line.split(char::from(*c)).map(str::trim).collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Char(b'\t') => write!(f, "\\t"),
            Delimiter::Char(c) => write!(f, "{}", char::from(*c)),
            Delimiter::Whitespace => write!(f, "\\s+"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterGuess {
    pub delimiter: Delimiter,
    /// True when no candidate was consistent and a default was used.
    pub ambiguous: bool,
}

/// Single-byte delimiters accepted from the dialect sniffer.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Up to `SNIFF_SAMPLE_LINES` non-empty, non-comment lines among the first `SNIFF_MAX_LINES`.
pub fn sample_lines<'a>(text: &'a str, comment_prefix: &str) -> Vec<&'a str> {
    text.lines()
        .take(SNIFF_MAX_LINES)
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && (comment_prefix.is_empty() || !t.starts_with(comment_prefix))
        })
        .take(SNIFF_SAMPLE_LINES)
        .collect()
}

/// Guess the field delimiter of delimited text.
///
/// Space-aligned columns are recognized first. Everything else goes through
/// the csv-nose dialect sniffer, restricted to `DELIMITER_CANDIDATES`.
pub fn sniff_delimiter(text: &str, comment_prefix: &str) -> DelimiterGuess {
    let lines = sample_lines(text, comment_prefix);
    if lines.is_empty() {
        return DelimiterGuess {
            delimiter: Delimiter::COMMA,
            ambiguous: true,
        };
    }

    let count = |c: char| lines.iter().map(|l| l.matches(c).count()).sum::<usize>();
    let (spaces, commas, tabs, semis) = (count(' '), count(','), count('\t'), count(';'));
    let whitespace_dominant = spaces > commas * WHITESPACE_DOMINANCE
        && spaces > tabs * WHITESPACE_DOMINANCE
        && spaces > semis * WHITESPACE_DOMINANCE;

    if whitespace_dominant && has_uniform_whitespace_columns(&lines) {
        debug!(delimiter = %Delimiter::Whitespace, "sniffed delimiter");
        return DelimiterGuess {
            delimiter: Delimiter::Whitespace,
            ambiguous: false,
        };
    }

    if let Some(delimiter) = sniff_dialect(&lines) {
        debug!(%delimiter, "sniffed delimiter");
        return DelimiterGuess {
            delimiter,
            ambiguous: false,
        };
    }

    let delimiter = if spaces > 0 && commas == 0 && tabs == 0 && semis == 0 {
        Delimiter::Whitespace
    } else {
        Delimiter::COMMA
    };
    warn!(%delimiter, "could not sniff a consistent delimiter, using default");
    DelimiterGuess {
        delimiter,
        ambiguous: true,
    }
}

/// Every sample line splits into the same number (at least two) of whitespace-separated fields.
fn has_uniform_whitespace_columns(lines: &[&str]) -> bool {
    let widths: Vec<usize> = lines.iter().map(|l| Delimiter::Whitespace.split(l).len()).collect();
    widths[0] >= 2 && widths.iter().all(|w| *w == widths[0])
}

/// Dialect sniffing over the sample. Single-column results and delimiters
/// outside the candidate set count as no answer.
fn sniff_dialect(lines: &[&str]) -> Option<Delimiter> {
    let mut sample = lines.join("\n");
    sample.push('\n');
    let metadata = match Sniffer::new().sniff_bytes(sample.as_bytes()) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "dialect sniffer found no dialect");
            return None;
        }
    };
    let delimiter = metadata.dialect.delimiter;
    if metadata.num_fields < 2 || !DELIMITER_CANDIDATES.contains(&delimiter) {
        debug!(delimiter = %char::from(delimiter), fields = metadata.num_fields, "sniffed dialect rejected");
        return None;
    }
    Some(Delimiter::Char(delimiter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_sample() {
        let text = "1,500000,2500000,10\n2,500001,2500001,11\n3,500002,2500002,12\n\
                    4,500003,2500003,13\n5,500004,2500004,14\n";
        let guess = sniff_delimiter(text, "#");
        assert_eq!(guess.delimiter, Delimiter::Char(b','));
        assert!(!guess.ambiguous);
    }

    #[test]
    fn semicolon_with_decimal_commas() {
        let text = "PT;E;N\n1;500000,5;2500000,1\n2;500001,5;2500001,1\n";
        assert_eq!(sniff_delimiter(text, "#").delimiter, Delimiter::Char(b';'));
    }

    #[test]
    fn aligned_columns_use_whitespace_runs() {
        let text = "1    500000.000   2500000.000   10.0\n\
                    22   500001.000   2500001.000    9.5\n\
                    333  500002.000   2500002.000   11.25\n";
        assert_eq!(sniff_delimiter(text, "#").delimiter, Delimiter::Whitespace);
    }

    #[test]
    fn tabs() {
        let text = "PT\tE\tN\n1\t2\t3\n4\t5\t6\n";
        assert_eq!(sniff_delimiter(text, "#").delimiter, Delimiter::Char(b'\t'));
    }

    #[test]
    fn quoted_delimiters_are_ignored() {
        let text = "1,\"a, b\",3\n2,\"c\",4\n3,\"d, e, f\",5\n";
        assert_eq!(sniff_delimiter(text, "#").delimiter, Delimiter::Char(b','));
    }

    #[test]
    fn pipes() {
        let text = "PT|E|N|Z\n1|500000|2500000|10\n2|500001|2500001|11\n3|500002|2500002|12\n";
        let guess = sniff_delimiter(text, "#");
        assert_eq!(guess.delimiter, Delimiter::Char(b'|'));
        assert!(!guess.ambiguous);
    }

    #[test]
    fn ragged_space_runs_are_not_whitespace_columns() {
        assert!(!has_uniform_whitespace_columns(&["1 2 3", "4 5", "6 7 8"]));
        assert!(has_uniform_whitespace_columns(&["1  2 3", "4 5   6"]));
    }

    #[test]
    fn comments_are_not_sampled() {
        let lines = sample_lines("# a;b;c\n\n1,2\n", "#");
        assert_eq!(lines, vec!["1,2"]);
    }

    #[test]
    fn single_tokens_fall_back_to_comma() {
        let guess = sniff_delimiter("alpha\nbeta\ngamma\n", "#");
        assert_eq!(guess.delimiter, Delimiter::COMMA);
        assert!(guess.ambiguous);
    }

    #[test]
    fn whitespace_split() {
        assert_eq!(Delimiter::Whitespace.split("  1   2 3 "), vec!["1", "2", "3"]);
        assert_eq!(Delimiter::COMMA.split("1, 2 ,3"), vec!["1", "2", "3"]);
    }
}
