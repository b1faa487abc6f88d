use std::sync::LazyLock;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use regex::Regex;
use reqwest::Url;

use crate::error::{AppError, FieldErrors};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Empty strings from form fields mean "not set".
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Collects every failing field before rejecting, so a form can show all messages at once.
#[derive(Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, field: &'static str, message: &str) {
        self.errors
            .entry(field)
            .or_default()
            .push(message.to_string());
    }

    pub fn min_chars(&mut self, field: &'static str, value: &str, min: usize, message: &str) {
        if value.trim().chars().count() < min {
            self.fail(field, message);
        }
    }

    pub fn max_chars(&mut self, field: &'static str, value: &str, max: usize, message: &str) {
        if value.chars().count() > max {
            self.fail(field, message);
        }
    }

    pub fn email(&mut self, field: &'static str, value: &str) {
        if !EMAIL.is_match(value) {
            self.fail(field, "Please enter a valid email address.");
        }
    }

    pub fn url(&mut self, field: &'static str, value: &str) {
        if Url::parse(value).is_err() {
            self.fail(field, "Please enter a valid URL.");
        }
    }

    pub fn non_negative(&mut self, field: &'static str, value: i64, message: &str) {
        if value < 0 {
            self.fail(field, message);
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}
