use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::Cell;

/// Tokens that stand for "no value" in text columns.
const NULL_TOKENS: [&str; 5] = ["nan", "NaN", "NAN", "None", "NULL"];

/// Loose numeric test used by header sniffing: the token is all digits once
/// the first '.' and the first '-' are removed.
///
/// - "12" -> true
/// - "-12.5" -> true
/// - "1.2.3" -> false
/// - "" -> false
pub fn is_numeric_token(s: &str) -> bool {
    let s = s.trim();
    let without_dot = s.replacen('.', "", 1);
    let digits = without_dot.replacen('-', "", 1);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Result of coercing a coordinate cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced {
    /// The cell held a usable number.
    Parsed(f64),
    /// The cell was empty; the default applies.
    Missing,
    /// The cell held something unparsable; the default applies.
    Invalid,
}

impl Coerced {
    pub fn value(self) -> f64 {
        match self {
            Coerced::Parsed(v) => v,
            Coerced::Missing | Coerced::Invalid => 0.0,
        }
    }
}

/// Coerce a cell to a coordinate value.
pub fn coerce_number(cell: &Cell) -> Coerced {
    if cell.is_blank() {
        return Coerced::Missing;
    }
    match cell.as_f64() {
        Some(v) => Coerced::Parsed(v),
        None => Coerced::Invalid,
    }
}

/// Coerce a cell to text, collapsing null markers to the empty string.
pub fn coerce_text(cell: &Cell) -> String {
    let s = match cell {
        Cell::Null => return String::new(),
        Cell::Number(v) if v.is_nan() => return String::new(),
        other => other.to_string(),
    };
    if NULL_TOKENS.contains(&s.as_str()) {
        String::new()
    } else {
        s
    }
}

/// Parse a fixed-width numeric field. Blank fields yield `None`.
pub fn parse_field(s: &str) -> Option<Result<f64, String>> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    Some(
        t.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| t.to_string()),
    )
}

/// Characters `start..end` of `s`, clamped to its length.
pub fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Format a number for fixed-width exports: integers without decimals.
pub fn format_plain(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Convert f64 to Decimal through its shortest display form, so that
/// 500000.123 stays 500000.123 instead of picking up binary noise.
pub fn to_decimal(v: f64) -> Decimal {
    try_to_decimal(v).unwrap_or_default()
}

/// Like [`to_decimal`], but `None` for values a `Decimal` cannot hold.
pub fn try_to_decimal(v: f64) -> Option<Decimal> {
    if !v.is_finite() {
        return None;
    }
    format!("{v}")
        .parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::try_from(v).ok())
}

/// Value in thousandths, rounded half away from zero. `None` when the
/// result does not fit an `i64`.
pub fn to_millis(v: f64) -> Option<i64> {
    try_to_decimal(v)?
        .checked_mul(Decimal::ONE_THOUSAND)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Inverse of [`to_millis`] for digit strings read from fixed-width records.
pub fn from_millis(digits: &str) -> Option<f64> {
    let d = digits.trim().parse::<Decimal>().ok()?;
    (d / Decimal::ONE_THOUSAND).to_string().parse().ok()
}
