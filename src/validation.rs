use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Loose address check: something, an `@`, something, a dot, something.
pub static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("valid email regex"));

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_FULL_NAME_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Collects the names of required fields that are missing or blank.
#[derive(Default)]
pub struct RequiredFields {
    missing: Vec<&'static str>,
}

impl RequiredFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, field: &'static str, value: Option<&str>) -> Self {
        if value.map(str::trim).map_or(true, str::is_empty) {
            self.missing.push(field);
        }
        self
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::bad_request(format!(
                "required fields missing: {}",
                self.missing.join(", ")
            )))
        }
    }
}

pub fn require_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::bad_request("email must not be empty"));
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err(AppError::bad_request("email is not a valid address"));
    }
    Ok(())
}

pub fn validate_password(password: &str, confirmation: Option<&str>) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::bad_request("password must not be empty"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if let Some(confirmation) = confirmation {
        if confirmation.is_empty() {
            return Err(AppError::bad_request("password confirmation must not be empty"));
        }
        if confirmation != password {
            return Err(AppError::bad_request("passwords do not match"));
        }
    }
    Ok(())
}

pub fn validate_signup(
    full_name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), AppError> {
    let name = full_name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("full name must not be empty"));
    }
    if name.chars().count() < MIN_FULL_NAME_LEN {
        return Err(AppError::bad_request(format!(
            "full name must be at least {MIN_FULL_NAME_LEN} characters"
        )));
    }
    validate_email(email)?;
    validate_password(password, Some(confirm_password))
}

/// End must fall strictly after start.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if start >= end {
        return Err(AppError::bad_request("end date must be after start date"));
    }
    Ok(())
}

pub fn parse_priority(value: &str) -> Result<Priority, AppError> {
    Priority::parse(value).ok_or_else(|| {
        AppError::bad_request(format!(
            "invalid priority '{}'. Allowed values: high, medium, low",
            value.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn required_fields_reports_every_blank_field() {
        let err = RequiredFields::new()
            .check("title", Some(""))
            .check("description", Some("   "))
            .check("priority", None)
            .check("category", Some("system"))
            .finish()
            .unwrap_err();
        assert_eq!(
            err.message(),
            "required fields missing: title, description, priority"
        );
    }

    #[test]
    fn required_fields_accepts_complete_form() {
        assert!(RequiredFields::new()
            .check("title", Some("Backup"))
            .check("category", Some("system"))
            .finish()
            .is_ok());
    }

    #[test]
    fn email_format() {
        assert!(validate_email("kim@corp.kr").is_ok());
        assert!(validate_email("kim@corp").is_err());
        assert!(validate_email("").is_err());
        assert!(validate_email("kim corp.kr").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("123456", Some("123456")).is_ok());
        assert!(validate_password("12345", None).is_err());
        assert!(validate_password("123456", Some("654321")).is_err());
        assert!(validate_password("", None).is_err());
    }

    #[test]
    fn signup_requires_two_character_name() {
        assert!(validate_signup("K", "kim@corp.kr", "secret", "secret").is_err());
        assert!(validate_signup("Kim", "kim@corp.kr", "secret", "secret").is_ok());
        assert!(validate_signup("  ", "kim@corp.kr", "secret", "secret").is_err());
    }

    #[test]
    fn date_range_rejects_end_before_or_equal_start() {
        assert!(validate_date_range(date(2024, 7, 1), date(2024, 7, 31)).is_ok());
        assert!(validate_date_range(date(2024, 7, 31), date(2024, 7, 1)).is_err());
        assert!(validate_date_range(date(2024, 7, 1), date(2024, 7, 1)).is_err());
    }

    #[test]
    fn priority_parsing_is_case_insensitive() {
        assert_eq!(parse_priority(" High ").unwrap(), Priority::High);
        assert!(parse_priority("urgent").is_err());
    }
}
