use std::collections::HashMap;

use crate::model::Manifest;
use crate::validation::{error_codes, ValidationError, Validator};

/// Checks each flow entry on its own: names present, unique and not
/// responding to themselves
pub struct DeclarationValidator;

impl Validator for DeclarationValidator {
    fn validate(&self, manifest: &Manifest) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        for (idx, flow) in manifest.flows.iter().enumerate() {
            let path = format!("flows[{}]", idx);

            if flow.name.trim().is_empty() {
                errors.push(ValidationError {
                    code: error_codes::MISSING_REQUIRED_FIELD,
                    message: "Flow name must not be empty".to_string(),
                    path: Some(format!("{}.name", path)),
                });
                continue;
            }

            if let Some(first) = first_seen.get(flow.name.as_str()) {
                errors.push(ValidationError {
                    code: error_codes::DUPLICATE_NAME,
                    message: format!(
                        "Flow '{}' is already declared at flows[{}]",
                        flow.name, first
                    ),
                    path: Some(format!("{}.name", path)),
                });
            } else {
                first_seen.insert(flow.name.as_str(), idx);
            }

            if flow.initiated_by.as_deref() == Some(flow.name.as_str()) {
                errors.push(ValidationError {
                    code: error_codes::SELF_INITIATION,
                    message: format!("Flow '{}' cannot respond to itself", flow.name),
                    path: Some(format!("{}.initiated_by", path)),
                });
            }
        }

        errors
    }
}
