//! # Parley Manifest
//!
//! A YAML deployment manifest lists the flows an application ships, which
//! flows they specialise (`extends`) and which initiating flow each responder
//! answers (`initiated_by`). This crate parses and validates manifests and
//! turns them into a [`parley_core::FlowBundle`] once the host supplies the
//! responder logic.
//!
//! ## Example
//!
//! ```
//! use parley_manifest::parse_and_validate_manifest;
//!
//! let yaml = r#"
//! manifest_version: "1.0"
//! flows:
//!   - name: Ping
//!   - name: Pong
//!     initiated_by: Ping
//!   - name: Pongiest
//!     extends: Pong
//!     initiated_by: Ping
//! "#;
//!
//! let manifest = parse_and_validate_manifest(yaml).unwrap();
//! let flows = manifest.resolve().unwrap();
//! assert_eq!(flows[2].identity.depth(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod model;
mod parser;

pub mod validation;

pub use error::ManifestError;
pub use model::{FlowEntry, Manifest, ResolvedFlow};
pub use parser::SUPPORTED_VERSION;
pub use validation::ValidationError;

use std::path::Path;

/// Parse and validate a manifest document
pub fn parse_and_validate_manifest(yaml_str: &str) -> Result<Manifest, ManifestError> {
    let manifest = parser::parse_manifest(yaml_str)?;
    validation::validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Read, parse and validate a manifest file
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let manifest = parser::read_manifest(path)?;
    validation::validate_manifest(&manifest)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::error_codes;
    use parley_core::{FlowName, Registry};
    use pretty_assertions::assert_eq;

    const PING_PONG: &str = r#"
    manifest_version: "1.0"
    flows:
      - name: Ping
        description: Sends PING and expects a reply
      - name: Pong
        initiated_by: Ping
      - name: Pongiest
        extends: Pong
        initiated_by: Ping
    "#;

    #[test]
    fn test_parse_valid_manifest() {
        let manifest = parse_and_validate_manifest(PING_PONG).unwrap();
        assert_eq!(manifest.flows.len(), 3);
        assert_eq!(
            manifest.flows[0].description.as_deref(),
            Some("Sends PING and expects a reply")
        );
    }

    #[test]
    fn test_multiple_problems_are_reported_together() {
        let yaml = r#"
        manifest_version: "1.0"
        flows:
          - name: Pong
            initiated_by: Pong
          - name: Pong
            extends: Missing
        "#;

        let err = parse_and_validate_manifest(yaml).unwrap_err();
        assert_eq!(err.error_code(), "ERR_MANIFEST_VALIDATION_MULTIPLE");

        let mut codes: Vec<_> = err.validation_errors().iter().map(|e| e.code).collect();
        codes.sort();
        assert_eq!(
            codes,
            vec![
                error_codes::DUPLICATE_NAME,
                error_codes::INVALID_REFERENCE,
                error_codes::SELF_INITIATION,
            ]
        );
    }

    #[test]
    fn test_single_problem_keeps_its_code() {
        let yaml = r#"
        manifest_version: "1.0"
        flows:
          - name: Pong
            initiated_by: Ping
        "#;

        let err = parse_and_validate_manifest(yaml).unwrap_err();
        assert_eq!(err.error_code(), error_codes::INVALID_REFERENCE);
    }

    #[test]
    fn test_bundle_installs_into_registry() {
        let manifest = parse_and_validate_manifest(PING_PONG).unwrap();
        let bundle = manifest
            .bundle_with(|_| Some(parley_core::responder_factory(|_session| Noop)))
            .unwrap();
        assert_eq!(bundle.len(), 3);

        let registry = Registry::new();
        let catalog = bundle.install(&registry).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(registry.candidates_for(&FlowName::from("Ping")).len(), 2);
        assert_eq!(
            registry
                .identity(&FlowName::from("Pongiest"))
                .map(|identity| identity.depth()),
            Some(2)
        );
    }

    #[test]
    fn test_bundle_requires_responder_logic() {
        let manifest = parse_and_validate_manifest(PING_PONG).unwrap();
        let err = manifest.bundle_with(|_| None).unwrap_err();
        assert!(matches!(err, ManifestError::MissingResponderLogic(name) if name == "Pong"));
    }

    struct Noop;

    #[parley_core::async_trait]
    impl parley_core::FlowLogic for Noop {
        async fn call(
            &mut self,
            _ctx: &mut parley_core::FlowContext,
        ) -> Result<parley_core::Payload, parley_core::FlowError> {
            Ok(parley_core::Payload::unit())
        }
    }
}
