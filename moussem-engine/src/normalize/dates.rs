//! Date parsing for inbound records.
//!
//! Accepts ISO 8601, RFC 3339 timestamps, and day/month-name forms in
//! English and French. Purely numeric day/month orderings are accepted only
//! when one component is provably the day; an ambiguous ordering fails
//! closed rather than guessing.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::common::error::{PipelineError, Result};

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(parse_error(raw, "empty"));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Ok(date);
    }

    let folded: String = s
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let tokens: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() != 3 {
        return Err(parse_error(raw, "expected day, month and year"));
    }

    let year = match tokens[2].parse::<i32>() {
        Ok(y) if tokens[2].len() == 4 => y,
        _ => return Err(parse_error(raw, "no four-digit year")),
    };

    // Month-name forms are unambiguous in either order.
    if let Some(month) = month_number(tokens[1]) {
        let day = day_number(tokens[0]).ok_or_else(|| parse_error(raw, "bad day component"))?;
        return make_date(raw, year, month, day);
    }
    if let Some(month) = month_number(tokens[0]) {
        let day = day_number(tokens[1]).ok_or_else(|| parse_error(raw, "bad day component"))?;
        return make_date(raw, year, month, day);
    }

    // Purely numeric: only take it when the day side is provable.
    let a = tokens[0]
        .parse::<u32>()
        .map_err(|_| parse_error(raw, "bad day component"))?;
    let b = tokens[1]
        .parse::<u32>()
        .map_err(|_| parse_error(raw, "bad month component"))?;
    if a > 12 && b <= 12 {
        return make_date(raw, year, b, a);
    }
    if b > 12 && a <= 12 {
        return make_date(raw, year, a, b);
    }
    if a == b {
        return make_date(raw, year, a, b);
    }
    Err(parse_error(raw, "ambiguous day/month ordering"))
}

/// "26 - 28 juin 2025", "du 26 au 28 juin 2025", "June 26-28, 2025": the
/// range forms scraped pages print. Single dates fall through to
/// [`parse_date`].
pub fn parse_date_range(raw: &str) -> Result<(NaiveDate, Option<NaiveDate>)> {
    static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^\s*(?:du\s+)?(\d{1,2})(?:er)?\s*(?:-|–|au|to)\s*(\d{1,2})\s+(\p{L}+)\.?,?\s+(\d{4})\s*$")
            .expect("range regex is valid")
    });
    static RANGE_MONTH_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^\s*(\p{L}+)\.?\s+(\d{1,2})\s*(?:-|–|to)\s*(\d{1,2}),?\s+(\d{4})\s*$")
            .expect("range regex is valid")
    });

    let folded: String = raw
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    if let Some(captures) = RANGE_RE.captures(&folded) {
        let (start, end) = (
            parse_date(&format!("{} {} {}", &captures[1], &captures[3], &captures[4]))?,
            parse_date(&format!("{} {} {}", &captures[2], &captures[3], &captures[4]))?,
        );
        return range(raw, start, end);
    }
    if let Some(captures) = RANGE_MONTH_FIRST_RE.captures(&folded) {
        let (start, end) = (
            parse_date(&format!("{} {} {}", &captures[2], &captures[1], &captures[4]))?,
            parse_date(&format!("{} {} {}", &captures[3], &captures[1], &captures[4]))?,
        );
        return range(raw, start, end);
    }
    parse_date(raw).map(|date| (date, None))
}

fn range(raw: &str, start: NaiveDate, end: NaiveDate) -> Result<(NaiveDate, Option<NaiveDate>)> {
    if end < start {
        return Err(parse_error(raw, "range ends before it starts"));
    }
    Ok((start, Some(end)))
}

fn make_date(raw: &str, year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| parse_error(raw, "no such calendar date"))
}

fn parse_error(raw: &str, why: &str) -> PipelineError {
    PipelineError::Parse {
        message: format!("unparseable date '{raw}': {why}"),
    }
}

/// Day component, tolerating ordinal suffixes ("1er", "21st").
fn day_number(token: &str) -> Option<u32> {
    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || token.len() - digits.len() > 2 {
        return None;
    }
    digits.parse().ok()
}

/// Month names and common abbreviations, English and French. Input arrives
/// diacritic-folded, so "Août" shows up as "aout".
fn month_number(token: &str) -> Option<u32> {
    let month = match token {
        "january" | "jan" | "janvier" => 1,
        "february" | "feb" | "fevrier" => 2,
        "march" | "mar" | "mars" => 3,
        "april" | "apr" | "avril" => 4,
        "may" | "mai" => 5,
        "june" | "jun" | "juin" => 6,
        "july" | "jul" | "juillet" => 7,
        "august" | "aug" | "aout" => 8,
        "september" | "sep" | "sept" | "septembre" => 9,
        "october" | "oct" | "octobre" => 10,
        "november" | "nov" | "novembre" => 11,
        "december" | "dec" | "decembre" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_iso_and_rfc3339() {
        assert_eq!(parse_date("2025-06-26").unwrap(), date(2025, 6, 26));
        assert_eq!(
            parse_date("2025-06-26T20:00:00+01:00").unwrap(),
            date(2025, 6, 26)
        );
        assert_eq!(parse_date("2025/06/26").unwrap(), date(2025, 6, 26));
    }

    #[test]
    fn parses_month_name_forms() {
        assert_eq!(parse_date("26 June 2025").unwrap(), date(2025, 6, 26));
        assert_eq!(parse_date("June 26, 2025").unwrap(), date(2025, 6, 26));
        assert_eq!(parse_date("26 juin 2025").unwrap(), date(2025, 6, 26));
        assert_eq!(parse_date("1er Août 2025").unwrap(), date(2025, 8, 1));
        assert_eq!(parse_date("15 décembre 2025").unwrap(), date(2025, 12, 15));
    }

    #[test]
    fn parses_numeric_only_when_day_is_provable() {
        assert_eq!(parse_date("26/06/2025").unwrap(), date(2025, 6, 26));
        assert_eq!(parse_date("06/26/2025").unwrap(), date(2025, 6, 26));
        assert_eq!(parse_date("05/05/2025").unwrap(), date(2025, 5, 5));
        assert!(parse_date("03/04/2025").is_err());
    }

    #[test]
    fn parses_range_forms_from_scraped_pages() {
        assert_eq!(
            parse_date_range("du 26 au 28 juin 2025").unwrap(),
            (date(2025, 6, 26), Some(date(2025, 6, 28)))
        );
        assert_eq!(
            parse_date_range("26 - 28 juin 2025").unwrap(),
            (date(2025, 6, 26), Some(date(2025, 6, 28)))
        );
        assert_eq!(
            parse_date_range("June 26-28, 2025").unwrap(),
            (date(2025, 6, 26), Some(date(2025, 6, 28)))
        );
        assert_eq!(
            parse_date_range("2025-06-26").unwrap(),
            (date(2025, 6, 26), None)
        );
        assert!(parse_date_range("du 28 au 26 juin 2025").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("").is_err());
        assert!(parse_date("soon").is_err());
        assert!(parse_date("31/02/2025").is_err());
    }
}
