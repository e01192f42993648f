use std::fmt;
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors raised while loading a deployment manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The document is not valid YAML or does not match the manifest shape
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The manifest file could not be read
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A single validation error
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    /// Multiple validation errors
    #[error("{}", MultipleErrorsFormat(.0))]
    MultipleValidationErrors(Vec<ValidationError>),

    /// Unsupported manifest version
    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersion(String),

    /// A responder in the manifest has no logic supplied by the host
    #[error("No responder logic supplied for flow {0}")]
    MissingResponderLogic(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

struct MultipleErrorsFormat<'a>(&'a [ValidationError]);

impl fmt::Display for MultipleErrorsFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiple validation errors ({} issues):", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, err)?;
        }
        Ok(())
    }
}

impl ManifestError {
    /// Collapse collected validation errors into one error
    pub fn from_validation_errors(mut errors: Vec<ValidationError>) -> Self {
        if errors.len() > 1 {
            return ManifestError::MultipleValidationErrors(errors);
        }
        match errors.pop() {
            Some(err) => ManifestError::ValidationError(err),
            None => ManifestError::InternalError(
                "Called from_validation_errors with empty vector".to_string(),
            ),
        }
    }

    /// Stable code identifying the failure
    pub fn error_code(&self) -> &'static str {
        match self {
            ManifestError::YamlError(_) => "ERR_MANIFEST_YAML_PARSE",
            ManifestError::Io { .. } => "ERR_MANIFEST_IO",
            ManifestError::ValidationError(err) => err.code,
            ManifestError::MultipleValidationErrors(_) => "ERR_MANIFEST_VALIDATION_MULTIPLE",
            ManifestError::UnsupportedVersion(_) => "ERR_MANIFEST_UNSUPPORTED_VERSION",
            ManifestError::MissingResponderLogic(_) => "ERR_MANIFEST_MISSING_RESPONDER_LOGIC",
            ManifestError::InternalError(_) => "ERR_MANIFEST_INTERNAL",
        }
    }

    /// Every validation error carried by this error
    pub fn validation_errors(&self) -> Vec<&ValidationError> {
        match self {
            ManifestError::ValidationError(err) => vec![err],
            ManifestError::MultipleValidationErrors(errors) => errors.iter().collect(),
            _ => Vec::new(),
        }
    }
}
