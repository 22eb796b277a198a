//! Form validation shared by the account, user and run views.
//!
//! A form collects every problem it finds before failing, so a client can
//! show all of them at once. Errors that do not belong to one field are
//! stored under [`NON_FIELD_ERRORS`].

pub mod runs;
pub mod users;

use std::collections::BTreeMap;

use serde::Serialize;

/// Key for errors not tied to a single field.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_DATE: &str = "Enter a valid date.";

/// Field name to list of messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single error not tied to any field.
    pub fn non_field(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(NON_FIELD_ERRORS, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Fail with these errors unless there are none.
    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// One-line description for the error envelope.
    pub fn summary(&self) -> String {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| {
                    if field == NON_FIELD_ERRORS {
                        m.clone()
                    } else {
                        format!("{}: {}", field, m)
                    }
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Trimmed value of a required text field.
pub fn required_text<'a>(
    errors: &mut FormErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

/// At least 8 characters, at least one letter and one digit.
pub fn check_password_strength(password: &str) -> Option<&'static str> {
    if password.chars().count() < 8 {
        return Some("Your password must be a minimum of 8 characters.");
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Some("Your password must contain at least one letter and one number.");
    }
    None
}
