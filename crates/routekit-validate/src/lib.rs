//! # routekit validation
//!
//! Value shapes and validation for routekit action parameters. Parameters
//! declare a [`ValueShape`]; the parameter resolver coerces raw request
//! values into that shape and reports violations as a [`ValidationError`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use routekit_validate::prelude::*;
//! use validator::Validate as ValidatorValidate;
//!
//! #[derive(Deserialize, Serialize, ValidatorValidate)]
//! struct CreatePost {
//!     #[validate(length(min = 3, max = 120))]
//!     title: String,
//! }
//!
//! let shape = ValueShape::of::<CreatePost>();
//! let err = shape.coerce(json!({"title": "ab"}), CoerceOptions::default()).unwrap_err();
//! assert_eq!(err.fields[0].field, "title");
//! ```
//!
//! ## Error Format
//!
//! ```json
//! {
//!   "error": {
//!     "type": "validation_error",
//!     "message": "Validation failed",
//!     "fields": [
//!       {"field": "title", "code": "length", "message": "..."}
//!     ]
//!   }
//! }
//! ```

mod error;
mod shape;
mod validate;

pub use error::{FieldError, ValidationError};
pub use shape::{CoerceOptions, ShapeCoercer, ValueShape};
pub use validate::CheckRules;

pub use validator::Validate as ValidatorValidate;

/// Prelude module for validation
pub mod prelude {
    pub use crate::error::{FieldError, ValidationError};
    pub use crate::shape::{CoerceOptions, ValueShape};
    pub use crate::validate::CheckRules;
    pub use validator::Validate as ValidatorValidate;
}
