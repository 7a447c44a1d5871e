//! Field validation: the generic accept/reject contract step handlers use.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("email regex")
});

/// Fields the flows collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Phone,
    BusinessName,
    HabitName,
    HabitValue,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::BusinessName => "business_name",
            Self::HabitName => "habit",
            Self::HabitValue => "value",
        }
    }
}

/// Validates and normalizes one raw field value.
pub trait FieldValidator: Send + Sync {
    /// Returns the parsed value, or a message to show the user.
    fn validate(&self, field: Field, raw: &str) -> Result<String, ValidationError>;
}

/// Default validator: length limits, email shape, phone digits, numbers.
#[derive(Debug, Default, Clone)]
pub struct BasicValidator;

impl FieldValidator for BasicValidator {
    fn validate(&self, field: Field, raw: &str) -> Result<String, ValidationError> {
        let value = raw.trim();
        let reject = |message: &str| Err(ValidationError::new(field.as_str(), message));

        match field {
            Field::Name | Field::BusinessName | Field::HabitName => {
                if value.chars().count() < 2 {
                    return reject("That's a bit short. Please send at least 2 characters.");
                }
                if value.chars().count() > 80 {
                    return reject("That's too long. Please keep it under 80 characters.");
                }
                Ok(value.to_string())
            }
            Field::Email => {
                if EMAIL_RE.is_match(value) {
                    Ok(value.to_lowercase())
                } else {
                    reject("That doesn't look like an email address (e.g. name@example.com).")
                }
            }
            Field::Phone => normalize_phone(value)
                .ok_or_else(|| {
                    ValidationError::new(
                        field.as_str(),
                        "Please send a phone number with country code, e.g. +27 82 123 4567.",
                    )
                }),
            Field::HabitValue => match value.replace(',', ".").parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => Ok(n.to_string()),
                _ => reject("Please send a number, e.g. 8 or 2.5."),
            },
        }
    }
}

/// Strip formatting and return 10–15 digits, or `None`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')')))
    {
        return None;
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    (10..=15).contains(&digits.len()).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        let v = BasicValidator;
        assert_eq!(v.validate(Field::Name, "  Lerato M ").unwrap(), "Lerato M");
        assert!(v.validate(Field::Name, "L").is_err());
        assert!(v.validate(Field::BusinessName, &"x".repeat(81)).is_err());
    }

    #[test]
    fn email_shape() {
        let v = BasicValidator;
        assert_eq!(
            v.validate(Field::Email, "Coach@Example.com").unwrap(),
            "coach@example.com"
        );
        let err = v.validate(Field::Email, "not-an-email").unwrap_err();
        assert_eq!(err.field, "email");
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("+27 82 123 4567").unwrap(), "27821234567");
        assert_eq!(normalize_phone("(082) 123-4567").unwrap(), "0821234567");
        assert!(normalize_phone("12345").is_none());
        assert!(normalize_phone("call me maybe").is_none());
    }

    #[test]
    fn habit_values_are_numbers() {
        let v = BasicValidator;
        assert_eq!(v.validate(Field::HabitValue, "2,5").unwrap(), "2.5");
        assert_eq!(v.validate(Field::HabitValue, "8").unwrap(), "8");
        assert!(v.validate(Field::HabitValue, "lots").is_err());
        assert!(v.validate(Field::HabitValue, "-1").is_err());
    }
}
