use crate::period::Period;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use std::ops::RangeInclusive;

/// Result of reading one quantity cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantityCell {
    /// Empty cell or a literal "-". Counts as zero without a warning.
    Blank,
    Value(f64),
    /// Parsed to a negative number; the engine clamps it to zero.
    Negative(f64),
    Unparseable,
}

impl QuantityCell {
    /// The non-negative quantity this cell contributes.
    pub fn quantity(&self) -> f64 {
        match self {
            QuantityCell::Value(v) => *v,
            QuantityCell::Blank | QuantityCell::Negative(_) | QuantityCell::Unparseable => 0.0,
        }
    }
}

const MONTH_NAMES: &[(&str, u32)] = &[
    ("jan", 1),
    ("january", 1),
    ("januari", 1),
    ("feb", 2),
    ("february", 2),
    ("februari", 2),
    ("mar", 3),
    ("march", 3),
    ("maret", 3),
    ("apr", 4),
    ("april", 4),
    ("may", 5),
    ("mei", 5),
    ("jun", 6),
    ("june", 6),
    ("juni", 6),
    ("jul", 7),
    ("july", 7),
    ("juli", 7),
    ("aug", 8),
    ("august", 8),
    ("agu", 8),
    ("ags", 8),
    ("agt", 8),
    ("agustus", 8),
    ("sep", 9),
    ("sept", 9),
    ("september", 9),
    ("oct", 10),
    ("october", 10),
    ("okt", 10),
    ("oktober", 10),
    ("nov", 11),
    ("november", 11),
    ("dec", 12),
    ("december", 12),
    ("des", 12),
    ("desember", 12),
];

/// Spreadsheet serial day numbers count from this date.
const SPREADSHEET_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Serial numbers outside this window are not treated as dates (1954..2119).
const SERIAL_DATE_RANGE: RangeInclusive<f64> = 20_000.0..=80_000.0;

/// chrono's `%Y` also accepts one- and two-digit years, so "05-01-24" parses as
/// year 5. Dates outside this window are treated as unparseable.
const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1900..=2200;

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    PLAUSIBLE_YEARS.contains(&date.year()).then_some(date)
}

pub fn month_from_name(word: &str) -> Option<u32> {
    let lower = word.to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, month)| *month)
}

/// Splits a header into runs of letters and runs of digits, dropping everything else.
/// `"Jan-2024"` becomes `["Jan", "2024"]`, `"Jan24"` becomes `["Jan", "24"]`.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    // (start byte, is_alpha) of the run being collected
    let mut run: Option<(usize, bool)> = None;

    for (idx, ch) in text.char_indices() {
        let class = if ch.is_alphabetic() {
            Some(true)
        } else if ch.is_ascii_digit() {
            Some(false)
        } else {
            None
        };

        if let Some((start, is_alpha)) = run {
            if class == Some(is_alpha) {
                continue;
            }
            tokens.push(&text[start..idx]);
            run = None;
        }

        if let Some(is_alpha) = class {
            run = Some((idx, is_alpha));
        }
    }

    if let Some((start, _)) = run {
        tokens.push(&text[start..]);
    }

    tokens
}

/// True when any whole word of the header is a month name. Substrings do not count,
/// so "Material" or "Market" never look like months.
pub fn contains_month_word(header: &str) -> bool {
    tokenize(header)
        .into_iter()
        .any(|token| month_from_name(token).is_some())
}

/// A four-digit year anywhere in the tokens wins; otherwise the last two-digit
/// token is read as `20YY` ("01-Jan-24" is January 2024).
fn year_from_tokens(tokens: &[&str]) -> Option<i32> {
    let numeric = |t: &&&str| t.chars().all(|c| c.is_ascii_digit());

    if let Some(full) = tokens.iter().filter(numeric).find(|t| t.len() == 4) {
        return full.parse().ok();
    }

    tokens
        .iter()
        .filter(numeric)
        .filter(|t| t.len() == 2)
        .last()
        .and_then(|yy| yy.parse::<i32>().ok())
        .map(|yy| 2000 + yy)
}

fn parse_iso_like(text: &str) -> Option<NaiveDate> {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

    for format in DATETIME_FORMATS {
        if let Some(date) = NaiveDateTime::parse_from_str(text, format)
            .ok()
            .and_then(|dt| plausible(dt.date()))
        {
            return Some(date);
        }
    }
    for format in DATE_FORMATS {
        if let Some(date) = NaiveDate::parse_from_str(text, format).ok().and_then(plausible) {
            return Some(date);
        }
    }

    // "YYYY-MM" and "YYYY/MM"
    for sep in ['-', '/'] {
        let padded = NaiveDate::parse_from_str(&format!("{text}{sep}01"), &format!("%Y{sep}%m{sep}%d"));
        if let Some(date) = padded.ok().and_then(plausible) {
            return Some(date);
        }
    }

    None
}

/// Byte spans of the ASCII digit runs in `text`.
fn digit_runs(text: &str) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        match (ch.is_ascii_digit(), start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                runs.push((s, idx));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, text.len()));
    }

    runs
}

/// A purely numeric month inside a header: `YYYY-MM` (also `/`, `.` or a space
/// between) or `MM/YYYY`. Both numbers must stand alone, so "Q1 2024",
/// "Week 5 2024" and "ROFO 2024 v2" do not qualify.
fn numeric_month(text: &str) -> Option<Period> {
    let standalone = |start: usize, end: usize| {
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    };

    for pair in digit_runs(text).windows(2) {
        let ((s0, e0), (s1, e1)) = (pair[0], pair[1]);
        let mut between = text[e0..s1].chars();
        let (Some(sep), None) = (between.next(), between.next()) else {
            continue;
        };
        if !standalone(s0, e1) {
            continue;
        }

        let (first, second) = (&text[s0..e0], &text[s1..e1]);
        let year_first = first.len() == 4 && second.len() <= 2 && matches!(sep, '-' | '/' | '.' | ' ');
        let month_first = first.len() <= 2 && second.len() == 4 && sep == '/';
        let candidate: Option<(i32, u32)> = if year_first {
            first.parse().ok().zip(second.parse().ok())
        } else if month_first {
            second.parse().ok().zip(first.parse().ok())
        } else {
            None
        };

        if let Some(period) = candidate.and_then(|(year, month)| Period::new(year, month)) {
            return Some(period);
        }
    }

    None
}

/// Parses a wide-layout column header into the month it represents.
///
/// Accepted shapes include `2024-01-01`, `2024-01-01 00:00:00`, `2024-01`,
/// `Jan-2024`, `January 2024`, `Mei 2024`, `Jan-24` and headers carrying one of
/// those with a label around it (`Forecast 2024-01`).
pub fn parse_period_header(header: &str) -> Option<Period> {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(date) = parse_iso_like(trimmed) {
        return Some(Period::from_date(date));
    }

    let tokens = tokenize(trimmed);

    let month_word = tokens.iter().find_map(|t| month_from_name(t));
    if let Some(month) = month_word {
        let year = year_from_tokens(&tokens)?;
        return Period::new(year, month);
    }

    numeric_month(trimmed)
}

pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !SERIAL_DATE_RANGE.contains(&serial) {
        return None;
    }
    let (y, m, d) = SPREADSHEET_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Parses a transactional date cell into its calendar month.
///
/// Tries the caller's formats first (as dates, then as datetimes), then
/// spreadsheet serial day numbers, then the header shapes of
/// [`parse_period_header`].
pub fn parse_date_cell(value: &str, formats: &[String]) -> Option<Period> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in formats {
        let date = NaiveDate::parse_from_str(trimmed, format)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, format).map(|dt| dt.date()));
        if let Some(date) = date.ok().and_then(plausible) {
            return Some(Period::from_date(date));
        }
    }

    if let Ok(serial) = trimmed.parse::<f64>() {
        return date_from_serial(serial).map(Period::from_date);
    }

    parse_period_header(trimmed)
}

/// Reads a quantity cell the way spreadsheet exports write them: thousands
/// separators and inner whitespace are ignored, `(12)` is read as -12.
pub fn parse_quantity(raw: &str, thousands_separator: char) -> QuantityCell {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return QuantityCell::Blank;
    }

    let mut cleaned: String = trimmed
        .chars()
        .filter(|c| *c != thousands_separator && !c.is_whitespace())
        .collect();

    let mut negate = false;
    if cleaned.len() > 2 && cleaned.starts_with('(') && cleaned.ends_with(')') {
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
        negate = true;
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            let value = if negate { -value } else { value };
            if value < 0.0 {
                QuantityCell::Negative(value)
            } else {
                // -0.0 normalizes to 0.0 so output stays byte-stable
                QuantityCell::Value(value + 0.0)
            }
        }
        _ => QuantityCell::Unparseable,
    }
}

/// Normalizes a raw SKU cell so the same item matches across sources.
/// Returns `None` when nothing is left.
pub fn normalize_entity_key(raw: &str, prefixes: &[String]) -> Option<String> {
    let mut key = raw.trim();

    for prefix in prefixes {
        if prefix.is_empty() {
            continue;
        }
        let matches = key
            .get(..prefix.len())
            .map(|head| head.eq_ignore_ascii_case(prefix))
            .unwrap_or(false);
        if matches {
            key = key[prefix.len()..].trim();
            break;
        }
    }

    // Numeric SKUs exported as floats, e.g. "100234.0"
    if let Some((int_part, frac_part)) = key.split_once('.') {
        let numeric = !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_digit());
        let zero_fraction = !frac_part.is_empty() && frac_part.chars().all(|c| c == '0');
        if numeric && zero_fraction {
            key = int_part;
        }
    }

    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReconciliationConfig;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    #[test]
    fn test_parse_period_header_formats() {
        assert_eq!(parse_period_header("2024-01-01"), Some(p(2024, 1)));
        assert_eq!(parse_period_header("2024-02-01 00:00:00"), Some(p(2024, 2)));
        assert_eq!(parse_period_header("2024-03-01T00:00:00"), Some(p(2024, 3)));
        assert_eq!(parse_period_header("2024-04"), Some(p(2024, 4)));
        assert_eq!(parse_period_header("Jan-2024"), Some(p(2024, 1)));
        assert_eq!(parse_period_header("January 2024"), Some(p(2024, 1)));
        assert_eq!(parse_period_header("Mei 2024"), Some(p(2024, 5)));
        assert_eq!(parse_period_header("Des-24"), Some(p(2024, 12)));
        assert_eq!(parse_period_header("01-Jan-24"), Some(p(2024, 1)));
        assert_eq!(parse_period_header(" Forecast 2024-06 "), Some(p(2024, 6)));
        assert_eq!(parse_period_header("07/2024"), Some(p(2024, 7)));
        assert_eq!(parse_period_header("2024/3"), Some(p(2024, 3)));
        assert_eq!(parse_period_header("2024.11"), Some(p(2024, 11)));
        assert_eq!(parse_period_header("ROFO 2024 05"), Some(p(2024, 5)));
    }

    #[test]
    fn test_parse_period_header_rejects_non_periods() {
        assert_eq!(parse_period_header(""), None);
        assert_eq!(parse_period_header("Total 2024"), None);
        assert_eq!(parse_period_header("Jan"), None);
        assert_eq!(parse_period_header("2024-13"), None);
        assert_eq!(parse_period_header("Q1 2024"), None);
        assert_eq!(parse_period_header("Q3 2024"), None);
        assert_eq!(parse_period_header("H1 2024"), None);
        assert_eq!(parse_period_header("Week 5 2024"), None);
        assert_eq!(parse_period_header("ROFO 2024 v2"), None);
        assert_eq!(parse_period_header("FY2024-01"), None);
    }

    #[test]
    fn test_month_word_is_whole_word() {
        assert!(contains_month_word("Jan-2024"));
        assert!(contains_month_word("Sales Agustus"));
        assert!(!contains_month_word("Material"));
        assert!(!contains_month_word("Market Decision"));
    }

    #[test]
    fn test_parse_date_cell() {
        let formats = vec!["%Y-%m-%d".to_string(), "%d/%m/%Y".to_string()];
        assert_eq!(parse_date_cell("2024-01-15", &formats), Some(p(2024, 1)));
        assert_eq!(parse_date_cell("15/02/2024", &formats), Some(p(2024, 2)));
        assert_eq!(parse_date_cell("45292", &formats), Some(p(2024, 1)));
        assert_eq!(parse_date_cell("Mar-2024", &formats), Some(p(2024, 3)));
        assert_eq!(parse_date_cell("soon", &formats), None);
        assert_eq!(parse_date_cell("", &formats), None);
        assert_eq!(parse_date_cell("12", &formats), None);
    }

    #[test]
    fn test_parse_date_cell_rejects_short_years() {
        let formats = ReconciliationConfig::default().date_formats;
        assert_eq!(parse_date_cell("05-01-24", &formats), None);
        assert_eq!(parse_date_cell("5/1/24", &formats), None);
        assert_eq!(parse_date_cell("24-01-15", &formats), None);
        assert_eq!(parse_date_cell("5/1/2024", &formats), Some(p(2024, 1)));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("1,234", ','), QuantityCell::Value(1234.0));
        assert_eq!(parse_quantity(" 12.5 ", ','), QuantityCell::Value(12.5));
        assert_eq!(parse_quantity("-", ','), QuantityCell::Blank);
        assert_eq!(parse_quantity("", ','), QuantityCell::Blank);
        assert_eq!(parse_quantity("abc", ','), QuantityCell::Unparseable);
        assert_eq!(parse_quantity("NaN", ','), QuantityCell::Unparseable);
        assert_eq!(parse_quantity("-5", ','), QuantityCell::Negative(-5.0));
        assert_eq!(parse_quantity("(1,000)", ','), QuantityCell::Negative(-1000.0));
        assert_eq!(parse_quantity("1.234.567", '.'), QuantityCell::Value(1234567.0));
        assert_eq!(parse_quantity("-5", ',').quantity(), 0.0);
        assert_eq!(parse_quantity("abc", ',').quantity(), 0.0);
    }

    #[test]
    fn test_normalize_entity_key() {
        let prefixes = vec!["FG-".to_string()];
        assert_eq!(normalize_entity_key("  FG-1001 ", &prefixes).as_deref(), Some("1001"));
        assert_eq!(normalize_entity_key("fg-1001", &prefixes).as_deref(), Some("1001"));
        assert_eq!(normalize_entity_key("1001", &prefixes).as_deref(), Some("1001"));
        assert_eq!(normalize_entity_key("100234.0", &prefixes).as_deref(), Some("100234"));
        assert_eq!(normalize_entity_key("10.5", &prefixes).as_deref(), Some("10.5"));
        assert_eq!(normalize_entity_key("FG-", &prefixes), None);
        assert_eq!(normalize_entity_key("   ", &prefixes), None);
    }
}
