use crate::utils::error::{ChamaError, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ChamaError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ChamaError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ChamaError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ChamaError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ChamaError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(ChamaError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ChamaError::validation(
            field_name,
            "This field may not be blank.",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ChamaError::validation(
            field_name,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// 單筆金額上限 (KES 10 億，以分計)
pub const MAX_AMOUNT: i64 = 100_000_000_000;

pub fn validate_amount(field_name: &str, amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(ChamaError::validation(
            field_name,
            "Amount must be greater than zero",
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(ChamaError::validation(
            field_name,
            format!("Amount may not exceed {}", MAX_AMOUNT),
        ));
    }
    Ok(())
}

fn overflow(field_name: &str) -> ChamaError {
    ChamaError::validation(field_name, "Amount is out of range")
}

pub fn checked_add(field_name: &str, a: i64, b: i64) -> Result<i64> {
    a.checked_add(b).ok_or_else(|| overflow(field_name))
}

pub fn checked_sub(field_name: &str, a: i64, b: i64) -> Result<i64> {
    a.checked_sub(b).ok_or_else(|| overflow(field_name))
}

pub fn checked_mul(field_name: &str, a: i64, b: i64) -> Result<i64> {
    a.checked_mul(b).ok_or_else(|| overflow(field_name))
}

pub fn checked_sum(field_name: &str, amounts: impl IntoIterator<Item = i64>) -> Result<i64> {
    amounts
        .into_iter()
        .try_fold(0i64, |total, amount| checked_add(field_name, total, amount))
}

fn username_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.@+\-]{3,150}$").ok())
        .as_ref()
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").ok())
        .as_ref()
}

pub fn validate_username(username: &str) -> Result<()> {
    if !username_regex().is_some_and(|re| re.is_match(username)) {
        return Err(ChamaError::validation(
            "username",
            "Use 3-150 letters, digits and @/./+/-/_ only.",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    if !email_regex().is_some_and(|re| re.is_match(email)) {
        return Err(ChamaError::validation("email", "Enter a valid email address."));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(ChamaError::validation(
            "password",
            "This password is too short. It must contain at least 8 characters.",
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ChamaError::validation(
            "password",
            "This password is entirely numeric.",
        ));
    }
    Ok(())
}

/// 將肯亞手機號碼正規化為 2547XXXXXXXX / 2541XXXXXXXX
pub fn normalize_phone_number(raw: &str) -> Result<String> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);

    let local = if let Some(rest) = digits.strip_prefix("254") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest.to_string()
    } else {
        digits.to_string()
    };

    let valid = local.len() == 9
        && (local.starts_with('7') || local.starts_with('1'))
        && local.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(ChamaError::validation(
            "phone_number",
            "Enter a valid Kenyan mobile number, e.g. 0712345678.",
        ));
    }
    Ok(format!("254{}", local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("mpesa.base_url", "https://example.com").is_ok());
        assert!(validate_url("mpesa.base_url", "http://example.com").is_ok());
        assert!(validate_url("mpesa.base_url", "").is_err());
        assert!(validate_url("mpesa.base_url", "invalid-url").is_err());
        assert!(validate_url("mpesa.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("cache.max_entries", 5, 1).is_ok());
        assert!(validate_positive_number("cache.max_entries", 0, 1).is_err());
    }

    #[test]
    fn test_amount_bounds_and_checked_totals() {
        assert!(validate_amount("amount", 1).is_ok());
        assert!(validate_amount("amount", MAX_AMOUNT).is_ok());
        assert!(validate_amount("amount", 0).is_err());
        assert!(validate_amount("amount", MAX_AMOUNT + 1).is_err());

        assert_eq!(checked_sum("total", [1, 2, 3]).unwrap(), 6);
        assert!(matches!(
            checked_sum("total", [i64::MAX, 1]),
            Err(ChamaError::ValidationError { .. })
        ));
        assert!(checked_mul("limit", i64::MAX / 2, 3).is_err());
        assert!(checked_sub("balance", i64::MIN, 1).is_err());
    }

    #[test]
    fn test_normalize_phone_number_formats() {
        assert_eq!(normalize_phone_number("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone_number("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone_number("254 712 345 678").unwrap(), "254712345678");
        assert_eq!(normalize_phone_number("0110345678").unwrap(), "254110345678");
        assert!(normalize_phone_number("0812345678").is_err());
        assert!(normalize_phone_number("07123").is_err());
        assert!(normalize_phone_number("07123456ab").is_err());
    }

    #[test]
    fn test_validate_password_rules() {
        assert!(validate_password("s3cure-pass").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_validate_username_and_email() {
        assert!(validate_username("wanjiku_k").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("no-at-sign").is_err());
    }
}
