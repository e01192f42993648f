use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use parley_core::{FlowBundle, FlowDeclaration, FlowIdentity, FlowName, ResponderFactory};

use crate::error::ManifestError;

/// A deployment manifest: the flows one application ships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The manifest version (e.g., "1.0")
    pub manifest_version: String,

    /// Declared flows
    #[serde(default)]
    pub flows: Vec<FlowEntry>,
}

/// One flow declared in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowEntry {
    /// Unique name of the flow
    pub name: String,

    /// Flow this one specialises
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Initiating flow this flow responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,

    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FlowEntry {
    /// Whether this flow answers session-opens
    pub fn is_responder(&self) -> bool {
        self.initiated_by.is_some()
    }
}

/// A flow with its `extends` chain expanded into a lineage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFlow {
    /// Identity carrying the full lineage
    pub identity: FlowIdentity,
    /// Initiator this flow responds to
    pub initiated_by: Option<FlowName>,
}

impl Manifest {
    /// Look up a flow entry by name
    pub fn flow(&self, name: &str) -> Option<&FlowEntry> {
        self.flows.iter().find(|flow| flow.name == name)
    }

    /// Expand every `extends` chain, in declaration order.
    ///
    /// Expects a validated manifest; an unknown parent or a cycle is reported
    /// as an internal error.
    pub fn resolve(&self) -> Result<Vec<ResolvedFlow>, ManifestError> {
        let by_name: HashMap<&str, &FlowEntry> = self
            .flows
            .iter()
            .map(|flow| (flow.name.as_str(), flow))
            .collect();

        self.flows
            .iter()
            .map(|flow| {
                let identity = lineage_of(flow, &by_name)?;
                Ok(ResolvedFlow {
                    identity,
                    initiated_by: flow.initiated_by.as_deref().map(FlowName::from),
                })
            })
            .collect()
    }

    /// Build a node bundle, asking `factories` for each responder's logic
    pub fn bundle_with<F>(&self, mut factories: F) -> Result<FlowBundle, ManifestError>
    where
        F: FnMut(&FlowName) -> Option<ResponderFactory>,
    {
        let mut bundle = FlowBundle::new();
        for resolved in self.resolve()? {
            let ResolvedFlow {
                identity,
                initiated_by,
            } = resolved;

            let declaration = match initiated_by {
                Some(initiator) => {
                    let factory = factories(identity.name()).ok_or_else(|| {
                        ManifestError::MissingResponderLogic(identity.name().to_string())
                    })?;
                    FlowDeclaration::new(identity, Some(initiator)).with_factory(factory)
                }
                None => FlowDeclaration::initiating(identity),
            };
            bundle.push(declaration);
        }
        debug!(flows = bundle.len(), "Built flow bundle from manifest");
        Ok(bundle)
    }
}

fn lineage_of(
    flow: &FlowEntry,
    by_name: &HashMap<&str, &FlowEntry>,
) -> Result<FlowIdentity, ManifestError> {
    let mut chain = vec![FlowName::from(flow.name.as_str())];
    let mut current = flow;
    while let Some(parent) = current.extends.as_deref() {
        if chain.len() > by_name.len() {
            return Err(ManifestError::InternalError(format!(
                "Cyclic extends chain at flow {}",
                flow.name
            )));
        }
        current = by_name.get(parent).copied().ok_or_else(|| {
            ManifestError::InternalError(format!(
                "Flow {} extends unknown flow {}",
                current.name, parent
            ))
        })?;
        chain.push(FlowName::from(current.name.as_str()));
    }
    chain.reverse();

    FlowIdentity::from_lineage(chain).ok_or_else(|| {
        ManifestError::InternalError(format!("Invalid lineage for flow {}", flow.name))
    })
}
