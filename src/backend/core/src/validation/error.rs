//! Field-level validation errors.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CarehubError;

pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// The kind of validation error that occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Required,
    MinLength { min: usize, actual: usize },
    MaxLength { max: usize, actual: usize },
    Pattern { pattern: String },
    NotInSet { allowed: Vec<String> },
    Custom { code: String },
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "field is required"),
            Self::MinLength { min, actual } => {
                write!(f, "must be at least {} characters (got {})", min, actual)
            }
            Self::MaxLength { max, actual } => {
                write!(f, "must be at most {} characters (got {})", max, actual)
            }
            Self::Pattern { pattern } => write!(f, "must match pattern: {}", pattern),
            Self::NotInSet { allowed } => write!(f, "must be one of: {}", allowed.join(", ")),
            Self::Custom { code } => write!(f, "validation failed: {}", code),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: ValidationErrorKind) -> Self {
        let message = kind.to_string();
        Self { kind, message }
    }

    pub fn with_message(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors keyed by field name, in field order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    #[serde(flatten)]
    errors: BTreeMap<String, Vec<FieldError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add(&mut self, field: impl Into<String>, error: FieldError) {
        self.errors.entry(field.into()).or_default().push(error);
    }

    pub fn get(&self, field: &str) -> Option<&Vec<FieldError>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, errors) in other.errors {
            self.errors.entry(field).or_default().extend(errors);
        }
    }

    pub fn first_error(&self) -> Option<(&String, &FieldError)> {
        self.errors
            .iter()
            .find_map(|(field, errors)| errors.first().map(|e| (field, e)))
    }

    /// `"field: message"` for every error.
    pub fn to_flat_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .flat_map(|(field, errors)| errors.iter().map(move |e| format!("{}: {}", field, e.message)))
            .collect()
    }

    /// `Ok(())` when empty.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_flat_messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for CarehubError {
    fn from(errors: ValidationErrors) -> Self {
        let message = match errors.first_error() {
            Some((field, error)) => format!("Validation failed: {} - {}", field, error.message),
            None => "Validation failed".to_string(),
        };
        CarehubError::validation(message).with_internal_message(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_collects_errors_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("resource", FieldError::new(ValidationErrorKind::Required));
        errors.add(
            "action",
            FieldError::new(ValidationErrorKind::MaxLength { max: 3, actual: 6 }),
        );

        assert_eq!(
            errors.to_flat_messages(),
            vec![
                "action: must be at most 3 characters (got 6)",
                "resource: field is required",
            ]
        );
    }

    #[test]
    fn test_converts_to_validation_failed() {
        let mut errors = ValidationErrors::new();
        errors.add("resource", FieldError::new(ValidationErrorKind::Required));

        let err: CarehubError = errors.into();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(err.user_message(), "Validation failed: resource - field is required");
    }

    #[test]
    fn test_empty_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
