use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

// Same shape the signup form checks in the browser
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

const EARLIEST_BIRTHDAY: (i32, u32, u32) = (1900, 1, 1);

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || !EMAIL_PATTERN.is_match(email) || !validator::validate_email(email) {
        return Err(ValidationError::new("invalid_email_format"));
    }
    Ok(())
}

pub fn validate_birthday(birthday: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    let (year, month, day) = EARLIEST_BIRTHDAY;
    let earliest = NaiveDate::from_ymd_opt(year, month, day);
    if birthday > today || earliest.map_or(false, |earliest| birthday < earliest) {
        return Err(ValidationError::new("invalid_birthday"));
    }
    Ok(())
}
