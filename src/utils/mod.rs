//! Utility functions for Brazilian-locale text and numbers
//!
//! CVM files are Latin-1 encoded and use a comma as decimal separator.
//! Everything that reads or displays those values goes through here so the
//! conventions stay in one place.

use anyhow::{anyhow, Context, Result};
use encoding_rs::WINDOWS_1252;
use rust_decimal::Decimal;
use std::str::FromStr;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Decode bytes from a CVM/B3 file.
///
/// `WINDOWS_1252` is what `encoding_rs` resolves the `iso-8859-1` label to,
/// and it is a superset of Latin-1 for every printable character.
pub fn decode_latin1(bytes: &[u8]) -> String {
    let (decoded, _, had_errors) = WINDOWS_1252.decode(bytes);
    if had_errors {
        tracing::debug!("Replaced undecodable bytes while reading Latin-1 text");
    }
    decoded.into_owned()
}

/// Encode text for the persisted tables. Characters outside Latin-1 are
/// replaced by numeric character references.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    let (encoded, _, _) = WINDOWS_1252.encode(text);
    encoded.into_owned()
}

/// Parse a decimal written with either comma or dot as decimal separator.
///
/// When a comma is present, dots are treated as thousands separators.
///
/// # Examples
/// ```
/// use fundamentals::utils::parse_decimal_br;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(parse_decimal_br("1.234,56").unwrap(), dec!(1234.56));
/// assert_eq!(parse_decimal_br("-250,0000000000").unwrap(), dec!(-250));
/// assert_eq!(parse_decimal_br("100.5").unwrap(), dec!(100.5));
/// ```
pub fn parse_decimal_br(text: &str) -> Result<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty decimal value"));
    }

    let cleaned = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .with_context(|| format!("Failed to parse decimal: {}", text))
}

/// Uppercase, strip accents and collapse whitespace.
///
/// Used to compare source labels such as `ÚLTIMO` without depending on the
/// exact accentuation the portal happens to ship.
pub fn normalize_label(value: &str) -> String {
    let stripped: String = value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format a decimal using Brazilian conventions: "1.234,56"
///
/// # Examples
/// ```
/// use fundamentals::utils::format_decimal_br;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_decimal_br(dec!(1234.56)), "1.234,56");
/// assert_eq!(format_decimal_br(dec!(-500)), "-500,00");
/// ```
pub fn format_decimal_br(value: Decimal) -> String {
    let is_negative = value < Decimal::ZERO;
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec!['.', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    format!("{}{},{}", sign, with_separators, decimal_part)
}

/// Format a ratio for display; undefined values render as "-".
pub fn format_ratio_br(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    match Decimal::from_f64_retain(value) {
        Some(d) => format_decimal_br(d.round_dp(2)),
        None => "-".to_string(),
    }
}
