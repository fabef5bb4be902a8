use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("No number found in quantity.")]
    NoNumber,
    #[error("Quantity must be positive.")]
    NotPositive,
    #[error("Empty date")]
    EmptyDate,
    #[error("Invalid date. Use DD/MM/YYYY or 'na'.")]
    InvalidDate,
}

/// First integer in free text, so "10 bottles" reads as 10.
pub fn extract_quantity(text: &str) -> Result<u32, InputError> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(InputError::NoNumber);
    }

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Err(InputError::NotPositive);
    }
    digits.parse::<u32>().map_err(|_| InputError::NotPositive)
}

fn is_not_applicable(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "na" | "n/a" | "none")
}

/// Normalises an expiry answer to `DD/MM/YY`, or `N/A`.
pub fn parse_expiry(text: &str) -> Result<String, InputError> {
    let t = text.trim();
    if t.is_empty() {
        return Err(InputError::EmptyDate);
    }
    if is_not_applicable(t) {
        return Ok("N/A".to_string());
    }

    let two_digit_year = t.contains('/') && t.rsplit('/').next().map_or(false, |y| y.len() == 2);
    let formats: &[&str] = if two_digit_year {
        &["%d/%m/%y"]
    } else {
        &["%d/%m/%Y", "%Y-%m-%d"]
    };

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
        .map(|date| date.format("%d/%m/%y").to_string())
        .ok_or(InputError::InvalidDate)
}

pub fn normalize_size(text: &str) -> String {
    let t = text.trim();
    match t.to_lowercase().as_str() {
        "na" | "n/a" => "Not applicable".to_string(),
        _ => t.to_string(),
    }
}

pub fn is_skip(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("skip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_quantity() {
        assert_eq!(extract_quantity("10"), Ok(10));
        assert_eq!(extract_quantity("10 bottles"), Ok(10));
        assert_eq!(extract_quantity("about 3 boxes of 50"), Ok(3));
        assert_eq!(extract_quantity("007 gloves"), Ok(7));
        assert_eq!(extract_quantity("a few"), Err(InputError::NoNumber));
        assert_eq!(extract_quantity("0 left"), Err(InputError::NotPositive));
        assert_eq!(extract_quantity("99999999999999"), Err(InputError::NotPositive));
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert_eq!(parse_expiry("31/12/2025").unwrap(), "31/12/25");
        assert_eq!(parse_expiry("31/12/25").unwrap(), "31/12/25");
        assert_eq!(parse_expiry("2026-01-05").unwrap(), "05/01/26");
        assert_eq!(parse_expiry(" NA ").unwrap(), "N/A");
        assert_eq!(parse_expiry("n/a").unwrap(), "N/A");
        assert_eq!(parse_expiry("None").unwrap(), "N/A");
    }

    #[test]
    fn test_parse_expiry_rejects_garbage() {
        assert_eq!(parse_expiry("   "), Err(InputError::EmptyDate));
        assert_eq!(parse_expiry("32/01/2025"), Err(InputError::InvalidDate));
        assert_eq!(parse_expiry("next week"), Err(InputError::InvalidDate));
        assert_eq!(
            InputError::InvalidDate.to_string(),
            "Invalid date. Use DD/MM/YYYY or 'na'."
        );
    }

    #[test]
    fn test_normalize_size_and_skip() {
        assert_eq!(normalize_size("N/A"), "Not applicable");
        assert_eq!(normalize_size(" 500ml "), "500ml");
        assert!(is_skip("Skip"));
        assert!(!is_skip("skipping"));
    }
}
