//! Validation rules for request fields.

use regex::Regex;

use super::error::{FieldError, ValidationErrorKind};

/// A validation rule that can be applied to a value.
pub trait ValidationRule<T: ?Sized> {
    fn validate(&self, value: &T) -> Option<FieldError>;
}

/// Present and not blank.
#[derive(Debug, Clone)]
pub struct Required;

impl ValidationRule<String> for Required {
    fn validate(&self, value: &String) -> Option<FieldError> {
        value
            .trim()
            .is_empty()
            .then(|| FieldError::new(ValidationErrorKind::Required))
    }
}

impl<T> ValidationRule<Option<T>> for Required {
    fn validate(&self, value: &Option<T>) -> Option<FieldError> {
        value
            .is_none()
            .then(|| FieldError::new(ValidationErrorKind::Required))
    }
}

#[derive(Debug, Clone)]
pub struct MinLength(pub usize);

impl ValidationRule<String> for MinLength {
    fn validate(&self, value: &String) -> Option<FieldError> {
        let actual = value.chars().count();
        (actual < self.0).then(|| {
            FieldError::new(ValidationErrorKind::MinLength {
                min: self.0,
                actual,
            })
        })
    }
}

#[derive(Debug, Clone)]
pub struct MaxLength(pub usize);

impl ValidationRule<String> for MaxLength {
    fn validate(&self, value: &String) -> Option<FieldError> {
        let actual = value.chars().count();
        (actual > self.0).then(|| {
            FieldError::new(ValidationErrorKind::MaxLength {
                max: self.0,
                actual,
            })
        })
    }
}

/// Matches a regex. Empty values pass; combine with [`Required`].
#[derive(Debug, Clone)]
pub struct Pattern(pub Regex);

impl ValidationRule<String> for Pattern {
    fn validate(&self, value: &String) -> Option<FieldError> {
        (!value.is_empty() && !self.0.is_match(value)).then(|| {
            FieldError::new(ValidationErrorKind::Pattern {
                pattern: self.0.as_str().to_string(),
            })
        })
    }
}

/// Member of a fixed set. Empty values pass; combine with [`Required`].
#[derive(Debug, Clone)]
pub struct OneOf<'a>(pub &'a [&'a str]);

impl ValidationRule<String> for OneOf<'_> {
    fn validate(&self, value: &String) -> Option<FieldError> {
        (!value.is_empty() && !self.0.contains(&value.as_str())).then(|| {
            FieldError::new(ValidationErrorKind::NotInSet {
                allowed: self.0.iter().map(|s| s.to_string()).collect(),
            })
        })
    }
}
