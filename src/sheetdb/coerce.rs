//! Typing of raw cell text.
//!
//! The backend hands every cell back as text, so the data-access layer guesses
//! a type for it. A guess is only kept when formatting the typed value again
//! reproduces the original text exactly; `"007"`, `"5.60"` or `"1e3"` stay
//! strings because turning them into numbers would lose how they were written.

use crate::model::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

const DATE_TIME_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parses an integer or decimal, accepting `,` as the decimal separator.
pub fn coerce_number(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }

    let normalized = if uses_decimal_comma(raw) {
        raw.replacen(',', ".", 1)
    } else {
        raw.to_string()
    };

    let number: f64 = normalized.parse().ok()?;
    if !number.is_finite() || number.to_string() != normalized {
        return None;
    }
    Some(number)
}

fn uses_decimal_comma(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    digits.matches(',').count() == 1 && digits.chars().all(|c| c.is_ascii_digit() || c == ',')
}

/// Parses a timestamp in one of the layouts the backend produces.
pub fn coerce_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        let at = parsed.with_timezone(&Utc);
        let round_trips = [SecondsFormat::Millis, SecondsFormat::Secs, SecondsFormat::AutoSi]
            .into_iter()
            .any(|format| at.to_rfc3339_opts(format, true) == raw);
        return round_trips.then_some(at);
    }

    for layout in DATE_TIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            if naive.format(layout).to_string() == raw {
                return Some(naive.and_utc());
            }
        }
    }

    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, layout) {
            if date.format(layout).to_string() == raw {
                return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
        }
    }

    None
}

/// Types raw cell text: number first, then date, else the text itself.
pub fn coerce_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Some(number) = coerce_number(raw) {
        return Value::Number(number);
    }
    if let Some(at) = coerce_date(raw) {
        return Value::Date(at);
    }
    Value::Text(raw.to_string())
}
