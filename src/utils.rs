use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use num_format::{Locale, ToFormattedString};

static WARNED_MESSAGES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

pub fn warn_once(message: impl Into<String>) {
    let message = message.into();
    let cache = WARNED_MESSAGES.get_or_init(|| Mutex::new(HashSet::new()));

    if let Ok(mut warned) = cache.lock()
        && warned.insert(message.clone())
    {
        eprintln!("{message}");
    }
}

#[derive(Clone)]
pub struct NumberFormatOptions {
    pub use_comma: bool,
    pub use_human: bool,
    pub locale: String,
    pub decimal_places: usize,
}

/// Format a number for display. Accepts both u32 and u64.
pub fn format_number(n: impl Into<u64>, options: &NumberFormatOptions) -> String {
    let n: u64 = n.into();
    let locale = match options.locale.as_str() {
        "de" => Locale::de,
        "fr" => Locale::fr,
        "es" => Locale::es,
        "it" => Locale::it,
        "ja" => Locale::ja,
        "ko" => Locale::ko,
        "zh" => Locale::zh,
        _ => Locale::en,
    };

    if options.use_human {
        if n >= 1_000_000_000 {
            format!(
                "{:.prec$}b",
                n as f64 / 1_000_000_000.0,
                prec = options.decimal_places
            )
        } else if n >= 1_000_000 {
            format!(
                "{:.prec$}m",
                n as f64 / 1_000_000.0,
                prec = options.decimal_places
            )
        } else if n >= 1_000 {
            format!(
                "{:.prec$}k",
                n as f64 / 1_000.0,
                prec = options.decimal_places
            )
        } else {
            n.to_string()
        }
    } else if options.use_comma {
        n.to_formatted_string(&locale)
    } else {
        n.to_string()
    }
}

/// Format a play-time total as days/hours (minutes below an hour).
pub fn format_duration(ms: u64) -> String {
    let total_hours = ms / 3_600_000;
    let days = total_hours / 24;
    let hours = total_hours % 24;

    match (days, hours) {
        (0, 0) => format!("{} minutes", ms / 60_000),
        (0, h) => format!("{h} {}", if h == 1 { "hour" } else { "hours" }),
        (d, 0) => format!("{d} {}", if d == 1 { "day" } else { "days" }),
        (d, h) => format!(
            "{d} {} {h} {}",
            if d == 1 { "day" } else { "days" },
            if h == 1 { "hour" } else { "hours" }
        ),
    }
}

/// Parse a timestamp or date string as a UTC instant.
///
/// Accepts RFC3339 (extended exports), the legacy export's
/// "YYYY-MM-DD HH:MM" form, and a bare "YYYY-MM-DD" (meaning midnight UTC,
/// the way filter bounds have always been interpreted).
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.into());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Get the system's local timezone as an IANA timezone string (e.g., "America/Chicago")
pub fn get_local_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> NumberFormatOptions {
        NumberFormatOptions {
            use_comma: false,
            use_human: false,
            locale: "en".to_string(),
            decimal_places: 1,
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1234u64, &plain()), "1234");

        let comma = NumberFormatOptions {
            use_comma: true,
            ..plain()
        };
        assert_eq!(format_number(1234567u64, &comma), "1,234,567");

        let human = NumberFormatOptions {
            use_human: true,
            ..plain()
        };
        assert_eq!(format_number(1500u64, &human), "1.5k");
        assert_eq!(format_number(2_500_000u64, &human), "2.5m");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30 * 60_000), "30 minutes");
        assert_eq!(format_duration(3_600_000), "1 hour");
        assert_eq!(format_duration(5 * 3_600_000), "5 hours");
        assert_eq!(format_duration(24 * 3_600_000), "1 day");
        assert_eq!(format_duration(51 * 3_600_000), "2 days 3 hours");
    }

    #[test]
    fn test_parse_instant_formats() {
        let rfc = parse_instant("2024-01-01T10:00:00Z").expect("rfc3339");
        assert_eq!(rfc.to_rfc3339(), "2024-01-01T10:00:00+00:00");

        let legacy = parse_instant("2019-11-03 14:22").expect("legacy");
        assert_eq!(legacy.to_rfc3339(), "2019-11-03T14:22:00+00:00");

        let date_only = parse_instant("2024-01-02").expect("date");
        assert_eq!(date_only.to_rfc3339(), "2024-01-02T00:00:00+00:00");

        assert!(parse_instant("not a date").is_none());
        assert!(parse_instant("").is_none());
    }

    #[test]
    fn test_warn_once_deduplicates() {
        // Mostly a does-not-panic check; the dedup set is process-global.
        warn_once("spintrace test warning");
        warn_once("spintrace test warning");
    }
}
