//! Field normalisation for the LIS wire format.
//!
//! Pure functions: no side effects and no error returns. Every edge case degrades to an
//! empty string or a sentinel default so that a wire field is never null.

use chrono::{NaiveDate, NaiveDateTime};

/// Source formats tried, most specific first.
const SOURCE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const SOURCE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Truncate `value` to at most `max_len` bytes without splitting a character.
///
/// Returns `""` for `None` or an empty string. ASCII input keeps exactly its first
/// `max_len` characters.
pub fn truncate<S: AsRef<str>>(value: Option<S>, max_len: usize) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let value = value.as_ref();

    if value.len() <= max_len {
        return value.to_string();
    }

    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Return `fallback` when `value` is absent or empty, otherwise `value`.
pub fn with_default<S: AsRef<str>>(value: Option<S>, fallback: &str) -> String {
    match value {
        Some(v) if !v.as_ref().is_empty() => v.as_ref().to_string(),
        _ => fallback.to_string(),
    }
}

/// Reformat a source date or datetime string with a `chrono` pattern.
///
/// Accepts `Y-m-d`, `Y-m-d H:i:s` (space or `T` separated) and `Y-m-d H:i`. Returns `None`
/// for empty input and for anything that does not parse, including MySQL zero dates.
pub fn format_date(raw: Option<&str>, pattern: &str) -> Option<String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;

    let parsed = SOURCE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, SOURCE_DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Some(parsed.format(pattern).to_string())
}

/// Left-pad `value` with `fill` up to `width` characters. Longer values are unchanged.
pub fn pad_left(value: &str, width: usize, fill: char) -> String {
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }

    let mut padded: String = std::iter::repeat(fill).take(width - len).collect();
    padded.push_str(value);
    padded
}

/// Map the HIS gender code to the wire sex code.
pub fn gender_code(jenis_kelamin: Option<i64>) -> &'static str {
    match jenis_kelamin {
        Some(1) => "L",
        Some(2) => "P",
        _ => "-",
    }
}

/// Map the urgent flag to the wire `cito` value.
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Y"
    } else {
        "N"
    }
}

/// Split a comma-joined test list into wire entries.
///
/// Entries are trimmed, truncated to `max_len` and empty entries are dropped.
pub fn split_test_list(list: Option<&str>, max_len: usize) -> Vec<String> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| truncate(Some(entry), max_len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BIRTH_DATE_FORMAT, DEFAULT_EMAIL, DEFAULT_PHONE, ORDER_DATE_FORMAT};

    #[test]
    fn truncate_keeps_short_values_and_cuts_long_ones() {
        assert_eq!(truncate(Some("RM-0001"), 15), "RM-0001");
        assert_eq!(truncate(Some("ABCDEFGHIJ"), 10), "ABCDEFGHIJ");
        assert_eq!(truncate(Some("ABCDEFGHIJK"), 10), "ABCDEFGHIJ");

        let long = "x".repeat(250);
        let cut = truncate(Some(&long), 100);
        assert_eq!(cut.len(), 100);
        assert!(long.starts_with(&cut));
    }

    #[test]
    fn truncate_is_null_safe() {
        assert_eq!(truncate(None::<&str>, 10), "");
        assert_eq!(truncate(Some(""), 10), "");
        assert_eq!(truncate(Some("abc"), 0), "");
    }

    #[test]
    fn truncate_never_splits_a_character() {
        // "é" is two bytes; a 3-byte budget fits "aé" but not "aéb".
        assert_eq!(truncate(Some("aéb"), 3), "aé");
        assert_eq!(truncate(Some("aéb"), 2), "a");
    }

    #[test]
    fn defaults_apply_to_absent_and_empty_values() {
        assert_eq!(with_default(None::<&str>, DEFAULT_PHONE), "000000000");
        assert_eq!(with_default(Some(""), DEFAULT_PHONE), "000000000");
        assert_eq!(with_default(Some("08123"), DEFAULT_PHONE), "08123");
        assert_eq!(with_default(None::<&str>, DEFAULT_EMAIL), "none@mail.com");
        assert_eq!(with_default(Some(""), DEFAULT_EMAIL), "none@mail.com");
    }

    #[test]
    fn format_date_reformats_dates_and_datetimes() {
        assert_eq!(
            format_date(Some("2025-07-30"), BIRTH_DATE_FORMAT).as_deref(),
            Some("30.07.2025")
        );
        assert_eq!(
            format_date(Some("2025-07-30 15:24:11"), ORDER_DATE_FORMAT).as_deref(),
            Some("30.07.2025 15:24:11")
        );
        assert_eq!(
            format_date(Some("1992-04-24 00:00:00"), BIRTH_DATE_FORMAT).as_deref(),
            Some("24.04.1992")
        );
    }

    #[test]
    fn format_date_degrades_to_none() {
        assert_eq!(format_date(None, BIRTH_DATE_FORMAT), None);
        assert_eq!(format_date(Some(""), BIRTH_DATE_FORMAT), None);
        assert_eq!(format_date(Some("0000-00-00"), BIRTH_DATE_FORMAT), None);
        assert_eq!(format_date(Some("30/07/2025"), BIRTH_DATE_FORMAT), None);
        assert_eq!(truncate(format_date(Some("garbage"), BIRTH_DATE_FORMAT), 10), "");
    }

    #[test]
    fn pad_left_fills_to_width() {
        assert_eq!(pad_left("5", 3, '0'), "005");
        assert_eq!(pad_left("123", 3, '0'), "123");
        assert_eq!(pad_left("12345", 3, '0'), "12345");
    }

    #[test]
    fn gender_and_flag_mapping() {
        assert_eq!(gender_code(Some(1)), "L");
        assert_eq!(gender_code(Some(2)), "P");
        assert_eq!(gender_code(Some(0)), "-");
        assert_eq!(gender_code(None), "-");
        assert_eq!(yes_no(true), "Y");
        assert_eq!(yes_no(false), "N");
    }

    #[test]
    fn test_list_is_trimmed_truncated_and_compacted() {
        let entries = split_test_list(Some(" HEM01, ,GLU-PUASA-DAN-2-JAM-PP ,,LIP"), 20);
        assert_eq!(entries, vec!["HEM01", "GLU-PUASA-DAN-2-JAM-", "LIP"]);
        assert!(split_test_list(None, 20).is_empty());
    }
}
