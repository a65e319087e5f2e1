use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::table::Cell;

// Values banks print for "no amount in this column".
const DASH_FAMILY: &[&str] = &["-", "\u{2013}", "\u{2014}", "\u{2212}"];
const CURRENCY_GLYPHS: &[char] = &['\u{20ab}', '$', '\u{20ac}', '\u{a3}', '\u{a5}'];

/// Parse a locale-ambiguous amount string into a signed decimal.
///
/// Handles conflicting thousand/decimal separators ("1.000" vs "1,000.50" vs
/// "1.000,50"), parenthesis negatives, currency glyphs, and dash-as-null.
/// Returns None for anything that does not resolve to a number; never panics.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() || DASH_FAMILY.contains(&s) {
        return None;
    }

    let mut negative = false;
    let mut s = s.to_string();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner.trim().to_string();
    }

    s.retain(|c| !CURRENCY_GLYPHS.contains(&c) && !c.is_whitespace());
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }
    if s.is_empty() {
        return None;
    }

    let cleaned = strip_separators(&s);
    let value: Decimal = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Resolve `.` and `,` into at most one decimal point.
///
/// A separator occurring more than once is a thousands separator. When both
/// occur exactly once the later one is the decimal point. A lone separator is
/// a thousands separator iff exactly three digits follow it.
fn strip_separators(s: &str) -> String {
    let dots = s.matches('.').count();
    let commas = s.matches(',').count();

    let mut out = s.to_string();
    if dots > 1 {
        out = out.replace('.', "");
    }
    if commas > 1 {
        out = out.replace(',', "");
    }

    let dot = out.rfind('.');
    let comma = out.rfind(',');
    match (dot, comma) {
        (Some(d), Some(c)) => {
            if d > c {
                out = out.replace(',', "");
            } else {
                out = out.replace('.', "").replace(',', ".");
            }
        }
        (Some(d), None) => {
            if is_thousands(&out, d) {
                out = out.replace('.', "");
            }
        }
        (None, Some(c)) => {
            if is_thousands(&out, c) {
                out = out.replace(',', "");
            } else {
                out = out.replace(',', ".");
            }
        }
        (None, None) => {}
    }
    out
}

fn is_thousands(s: &str, sep_idx: usize) -> bool {
    let tail = &s[sep_idx + 1..];
    tail.len() == 3 && tail.chars().all(|c| c.is_ascii_digit())
}

/// Amount from a raw cell: numbers pass through, text goes through
/// `parse_amount`, everything else is null.
pub fn parse_cell_amount(cell: &Cell) -> Option<Decimal> {
    match cell {
        Cell::Number(n) => Decimal::from_f64(*n),
        Cell::Text(s) => parse_amount(s),
        Cell::Empty | Cell::Date(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_thousand_dot() {
        assert_eq!(parse_amount("1.000"), Some(dec!(1000)));
        assert_eq!(parse_amount("2.500.000"), Some(dec!(2500000)));
    }

    #[test]
    fn test_mixed_separators() {
        assert_eq!(parse_amount("1,000.50"), Some(dec!(1000.50)));
        assert_eq!(parse_amount("1.000,50"), Some(dec!(1000.50)));
        assert_eq!(parse_amount("1.234.567,89"), Some(dec!(1234567.89)));
        assert_eq!(parse_amount("1,234,567.89"), Some(dec!(1234567.89)));
    }

    #[test]
    fn test_lone_separator_decimal() {
        assert_eq!(parse_amount("10.5"), Some(dec!(10.5)));
        assert_eq!(parse_amount("50,00"), Some(dec!(50.00)));
        assert_eq!(parse_amount("1.2345"), Some(dec!(1.2345)));
    }

    #[test]
    fn test_lone_comma_thousands() {
        assert_eq!(parse_amount("1,000"), Some(dec!(1000)));
    }

    #[test]
    fn test_parenthesis_negative() {
        assert_eq!(parse_amount("(1500)"), Some(dec!(-1500)));
        assert_eq!(parse_amount("(1,234.56)"), Some(dec!(-1234.56)));
    }

    #[test]
    fn test_minus_sign() {
        assert_eq!(parse_amount("-42.50"), Some(dec!(-42.50)));
        assert_eq!(parse_amount("+42.50"), Some(dec!(42.50)));
    }

    #[test]
    fn test_dash_family_is_null() {
        assert_eq!(parse_amount("-"), None);
        assert_eq!(parse_amount("\u{2014}"), None);
        assert_eq!(parse_amount("\u{2013}"), None);
        assert_eq!(parse_amount("\u{2212}"), None);
    }

    #[test]
    fn test_currency_glyphs() {
        assert_eq!(parse_amount("\u{20ab}500.000"), Some(dec!(500000)));
        assert_eq!(parse_amount("$1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("-\u{20ac}1.234,56"), Some(dec!(-1234.56)));
    }

    #[test]
    fn test_garbage_is_null() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("12abc"), None);
    }

    #[test]
    fn test_cell_passthrough() {
        assert_eq!(parse_cell_amount(&Cell::Number(1234.5)), Some(dec!(1234.5)));
        assert_eq!(parse_cell_amount(&Cell::Empty), None);
        assert_eq!(
            parse_cell_amount(&Cell::Text("1.000,50".into())),
            Some(dec!(1000.50))
        );
    }
}
