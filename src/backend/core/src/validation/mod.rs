//! Request payload validation.
//!
//! Payload types implement [`Validate`]; the pipeline's validation step
//! deserializes the payload, calls `validate`, and turns a failure into a
//! `VALIDATION_FAILED` envelope.
//!
//! ```rust,ignore
//! impl Validate for CheckQuery {
//!     fn validate(&self) -> ValidationResult<()> {
//!         let mut errors = ValidationErrors::new();
//!         validate_field("resource", &self.resource)
//!             .rule(Required)
//!             .rule(MaxLength(64))
//!             .collect_into(&mut errors);
//!         errors.into_result()
//!     }
//! }
//! ```

pub mod error;
pub mod rules;

pub use error::{FieldError, ValidationErrorKind, ValidationErrors, ValidationResult};
pub use rules::{MaxLength, MinLength, OneOf, Pattern, Required, ValidationRule};

/// Synchronous validation of a deserialized payload.
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Applies rules to one field, collecting every failure.
pub struct FieldValidator<'a, T: ?Sized> {
    field_name: &'a str,
    value: &'a T,
    errors: Vec<FieldError>,
}

pub fn validate_field<'a, T: ?Sized>(field_name: &'a str, value: &'a T) -> FieldValidator<'a, T> {
    FieldValidator {
        field_name,
        value,
        errors: Vec::new(),
    }
}

impl<'a, T: ?Sized> FieldValidator<'a, T> {
    pub fn rule<R: ValidationRule<T>>(mut self, rule: R) -> Self {
        if let Some(error) = rule.validate(self.value) {
            self.errors.push(error);
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn collect_into(self, errors: &mut ValidationErrors) {
        for error in self.errors {
            errors.add(self.field_name, error);
        }
    }
}
