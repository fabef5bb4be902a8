use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Format timestamp in human-readable format
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Unix seconds as a timestamp, `None` when out of range.
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Parses RFC 3339 or a naive ISO date-time (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Shortens long text for table cells.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (i, col) in columns.iter().enumerate() {
        if i < widths.len() {
            row.push_str(&format!("{:<width$}  ", col, width = widths[i]));
        }
    }
    println!("{}", row.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-04T10:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T18:30:00+08:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T10:30:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Gloves", 10), "Gloves");
        assert_eq!(truncate("Hand Sanitiser", 6), "Hand …");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = from_unix(0).unwrap();
        assert_eq!(format_timestamp(&ts), "1970-01-01 00:00:00 UTC");
    }
}
