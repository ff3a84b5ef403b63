//! Rule checks run by typed value shapes.

use crate::error::ValidationError;

/// Rules a typed parameter must satisfy after it is deserialized.
///
/// Blanket-implemented for every `validator::Validate` type. A
/// [`ValueShape::of`](crate::ValueShape::of) shape calls [`check_rules`]
/// once the raw value has been coerced into `Self`, so the `validator`
/// report comes back as field-level violations with dotted paths for
/// nested structs.
///
/// [`check_rules`]: CheckRules::check_rules
pub trait CheckRules: validator::Validate {
    fn check_rules(&self) -> Result<(), ValidationError> {
        validator::Validate::validate(self).map_err(ValidationError::from_validator_errors)
    }
}

impl<T: validator::Validate> CheckRules for T {}
