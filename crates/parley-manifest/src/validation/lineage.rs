use std::collections::{HashMap, HashSet};

use crate::model::Manifest;
use crate::validation::{error_codes, ValidationError, Validator};

/// Validates references between flows:
/// - `extends` and `initiated_by` name declared flows
/// - `extends` chains terminate
pub struct LineageValidator;

impl LineageValidator {
    fn validate_references(
        &self,
        manifest: &Manifest,
        declared: &HashSet<&str>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (idx, flow) in manifest.flows.iter().enumerate() {
            let references = [
                ("extends", "extends", flow.extends.as_deref()),
                ("initiated_by", "is initiated by", flow.initiated_by.as_deref()),
            ];
            for (field, verb, target) in references {
                let Some(target) = target else { continue };
                if !declared.contains(target) {
                    errors.push(ValidationError {
                        code: error_codes::INVALID_REFERENCE,
                        message: format!(
                            "Flow '{}' {} undeclared flow '{}'",
                            flow.name, verb, target
                        ),
                        path: Some(format!("flows[{}].{}", idx, field)),
                    });
                }
            }
        }

        errors
    }

    /// Report each `extends` cycle once, at the flow where it is first entered
    fn validate_cycles(&self, manifest: &Manifest) -> Vec<ValidationError> {
        let parents: HashMap<&str, &str> = manifest
            .flows
            .iter()
            .filter_map(|flow| Some((flow.name.as_str(), flow.extends.as_deref()?)))
            .collect();
        let index: HashMap<&str, usize> = manifest
            .flows
            .iter()
            .enumerate()
            .map(|(idx, flow)| (flow.name.as_str(), idx))
            .collect();

        let mut errors = Vec::new();
        let mut reported: HashSet<&str> = HashSet::new();

        for flow in &manifest.flows {
            let mut path = vec![flow.name.as_str()];
            let mut current = flow.name.as_str();

            while let Some(&parent) = parents.get(current) {
                if let Some(start) = path.iter().position(|name| *name == parent) {
                    let cycle = &path[start..];
                    if cycle.iter().all(|name| !reported.contains(name)) {
                        reported.extend(cycle.iter().copied());
                        let mut members: Vec<&str> = cycle.to_vec();
                        members.push(parent);
                        errors.push(ValidationError {
                            code: error_codes::CYCLIC_EXTENDS,
                            message: format!("Cyclic extends chain: {}", members.join(" -> ")),
                            path: index
                                .get(parent)
                                .map(|idx| format!("flows[{}].extends", idx)),
                        });
                    }
                    break;
                }
                path.push(parent);
                current = parent;
            }
        }

        errors
    }
}

impl Validator for LineageValidator {
    fn validate(&self, manifest: &Manifest) -> Vec<ValidationError> {
        let declared: HashSet<&str> = manifest.flows.iter().map(|f| f.name.as_str()).collect();

        let mut errors = self.validate_references(manifest, &declared);
        errors.extend(self.validate_cycles(manifest));
        errors
    }
}
