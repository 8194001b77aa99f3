use models::{Direction, Side};

/// Parses a money/quantity cell the way broker exports write them.
///
/// Handles currency symbols, thousands separators and accounting negatives
/// (`"(987.65)"`). Returns `None` when nothing numeric is left, so callers can
/// tell a real zero from garbage.
pub fn try_parse_number(value: &str) -> Option<f64> {
    let t = value.trim();
    if t.is_empty() || t == "--" {
        return None;
    }

    let negative_parens = t.contains('(') && t.ends_with(')');
    let chars: Vec<char> = t.replace('\u{2212}', "-").chars().collect();
    let cleaned: String = chars
        .iter()
        .enumerate()
        .filter(|&(i, c)| c.is_ascii_digit() || matches!(*c, '.' | '-' | '+') || is_exponent(&chars, i))
        .map(|(_, c)| *c)
        .collect();

    if cleaned.is_empty() || cleaned == "-" || cleaned == "+" || cleaned == "." {
        return None;
    }

    let n = cleaned.parse::<f64>().ok()?;
    if !n.is_finite() {
        return None;
    }
    Some(if negative_parens { -n.abs() } else { n })
}

/// An `e`/`E` between a digit and an (optionally signed) digit, as in `1.5E+3`.
fn is_exponent(chars: &[char], i: usize) -> bool {
    if !matches!(chars[i], 'e' | 'E') || i == 0 || !chars[i - 1].is_ascii_digit() {
        return false;
    }
    match chars.get(i + 1) {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-') => chars.get(i + 2).is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Never fails: unparseable cells become 0 so one bad cell cannot abort a row.
pub fn parse_number(value: &str) -> f64 {
    try_parse_number(value).unwrap_or(0.0)
}

/// Reads a side/direction cell. `None` means the cell gave no usable hint.
pub fn infer_direction(value: &str) -> Option<Direction> {
    let v = value.trim().to_lowercase();
    if v.is_empty() {
        return None;
    }
    if v.contains("sell") || v.contains("short") || matches!(v.as_str(), "s" | "sld" | "ss" | "sl") {
        return Some(Direction::Short);
    }
    if v.contains("buy") || v.contains("long") || v.contains("cover") || matches!(v.as_str(), "b" | "bot" | "bt" | "l") {
        return Some(Direction::Long);
    }
    None
}

/// Anything that is not recognisably a sell/short reads as long.
pub fn parse_direction(value: &str) -> Direction {
    infer_direction(value).unwrap_or(Direction::Long)
}

pub fn infer_side(value: &str) -> Option<Side> {
    infer_direction(value).map(Side::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_currency_and_separators() {
        assert_eq!(parse_number("$1,234.56"), 1234.56);
        assert_eq!(parse_number("€ 2.5"), 2.5);
        assert_eq!(parse_number("  -42 "), -42.0);
        assert_eq!(parse_number("+7"), 7.0);
    }

    #[test]
    fn test_parse_number_accounting_negative() {
        assert_eq!(parse_number("(987.65)"), -987.65);
        assert_eq!(parse_number("$(50.00)"), -50.0);
    }

    #[test]
    fn test_parse_number_never_fails() {
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("abc"), 0.0);
        assert_eq!(parse_number("--"), 0.0);
        assert_eq!(try_parse_number("abc"), None);
        assert_eq!(try_parse_number("0"), Some(0.0));
    }

    #[test]
    fn test_parse_number_scientific_notation() {
        assert_eq!(try_parse_number("1e5"), Some(100000.0));
        assert_eq!(try_parse_number("1.5E+3"), Some(1500.0));
        assert_eq!(try_parse_number("-2.5e-2"), Some(-0.025));
        assert_eq!(parse_number("5 EUR"), 5.0);
        assert_eq!(parse_number("EUR 12.50"), 12.5);
    }

    #[test]
    fn test_parse_direction() {
        assert_eq!(parse_direction("Sell"), Direction::Short);
        assert_eq!(parse_direction("SHORT"), Direction::Short);
        assert_eq!(parse_direction("s"), Direction::Short);
        assert_eq!(parse_direction("Buy"), Direction::Long);
        assert_eq!(parse_direction(""), Direction::Long);
        assert_eq!(parse_direction("???"), Direction::Long);
    }

    #[test]
    fn test_infer_direction_reports_ambiguity() {
        assert_eq!(infer_direction(""), None);
        assert_eq!(infer_direction("Market"), None);
        assert_eq!(infer_direction("B"), Some(Direction::Long));
        assert_eq!(infer_side("SLD"), Some(Side::Sell));
        assert_eq!(infer_side("Buy to Cover"), Some(Side::Buy));
    }
}
