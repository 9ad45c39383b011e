//! Input rules shared by the facade, auth service and contact form.

use lazy_static::lazy_static;
use regex::Regex;

use crate::ValidationError;

pub const MAX_TICKER_LEN: usize = 10;
pub const MIN_PASSWORD_LEN: usize = 6;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern is valid");
    static ref NAME_RE: Regex = Regex::new(r"^[a-zA-Z\s]*$").expect("name pattern is valid");
}

/// Tickers are 1-10 ASCII letters or digits.
pub fn validate_ticker(raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyTicker);
    }
    let len = raw.chars().count();
    if len > MAX_TICKER_LEN {
        return Err(ValidationError::TickerTooLong {
            len,
            max: MAX_TICKER_LEN,
        });
    }
    if let Some((index, ch)) = raw.chars().enumerate().find(|(_, c)| !c.is_ascii_alphanumeric()) {
        return Err(ValidationError::TickerInvalidChar { ch, index });
    }
    Ok(())
}

pub fn validate_email(raw: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(raw.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_password(raw: &str) -> Result<(), ValidationError> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Person names: letters and whitespace only. Empty passes; callers that
/// require a value check that separately.
pub fn validate_name(field: &'static str, raw: &str) -> Result<(), ValidationError> {
    if NAME_RE.is_match(raw) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName { field })
    }
}

pub fn require_non_empty(field: &'static str, raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}
