use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const MAX_USERNAME_LEN: usize = 80;
pub const MAX_EMAIL_LEN: usize = 120;

/// Registration strictness. The lenient default only requires non-empty
/// fields; [`ValidationRules::strict`] adds a minimum length and a
/// confirmation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ValidationRules {
    pub min_password_length: usize,
    pub require_confirmation: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_password_length: 1,
            require_confirmation: false,
        }
    }
}

impl ValidationRules {
    pub fn strict() -> Self {
        Self {
            min_password_length: 6,
            require_confirmation: true,
        }
    }
}

/// Raw registration input as submitted.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirmation: Option<&'a str>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn validate_registration(rules: &ValidationRules, reg: &Registration<'_>) -> AppResult<()> {
    if reg.username.is_empty() || reg.email.is_empty() || reg.password.is_empty() {
        return Err(AppError::invalid("All fields are required"));
    }
    if reg.username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::invalid(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if reg.email.chars().count() > MAX_EMAIL_LEN || !is_valid_email(reg.email) {
        return Err(AppError::invalid("Invalid email"));
    }
    if reg.password.chars().count() < rules.min_password_length {
        return Err(AppError::invalid(format!(
            "Password must be at least {} characters",
            rules.min_password_length
        )));
    }
    if rules.require_confirmation && reg.confirmation != Some(reg.password) {
        return Err(AppError::invalid("Passwords do not match"));
    }
    Ok(())
}
