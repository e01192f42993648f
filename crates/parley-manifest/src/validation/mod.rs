use std::error::Error;
use std::fmt;

use crate::error::ManifestError;
use crate::model::Manifest;

mod declarations;
mod lineage;

/// A problem found while validating a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error code (one of [`error_codes`])
    pub code: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Optional path to the location of the error (e.g., "flows[2].extends")
    pub path: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl Error for ValidationError {}

/// Validation error codes
pub mod error_codes {
    /// A flow name is declared more than once
    pub const DUPLICATE_NAME: &str = "ERR_MANIFEST_VALIDATION_DUPLICATE_NAME";

    /// `extends` or `initiated_by` names an undeclared flow
    pub const INVALID_REFERENCE: &str = "ERR_MANIFEST_VALIDATION_INVALID_REFERENCE";

    /// An `extends` chain loops back on itself
    pub const CYCLIC_EXTENDS: &str = "ERR_MANIFEST_VALIDATION_CYCLIC_EXTENDS";

    /// A flow is declared as responding to itself
    pub const SELF_INITIATION: &str = "ERR_MANIFEST_VALIDATION_SELF_INITIATION";

    /// A required field is empty
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_MANIFEST_VALIDATION_MISSING_REQUIRED_FIELD";
}

/// A check over one aspect of a manifest
pub trait Validator {
    /// Validate the manifest and return every problem found
    fn validate(&self, manifest: &Manifest) -> Vec<ValidationError>;
}

/// Run every validator and report all problems together
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ManifestError> {
    let validators: Vec<Box<dyn Validator>> = vec![
        Box::new(declarations::DeclarationValidator),
        Box::new(lineage::LineageValidator),
    ];

    let errors: Vec<ValidationError> = validators
        .iter()
        .flat_map(|validator| validator.validate(manifest))
        .collect();

    if !errors.is_empty() {
        return Err(ManifestError::from_validation_errors(errors));
    }
    Ok(())
}
