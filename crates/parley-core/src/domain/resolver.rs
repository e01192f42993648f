use std::sync::Arc;
use tracing::{debug, trace};

use crate::domain::identity::{FlowIdentity, FlowName};
use crate::domain::overrides::OverrideTable;
use crate::domain::registry::Registry;
use crate::error::ResolutionError;

/// Chooses the responder that services a session-open for an initiator.
///
/// Resolution is stateless: an installed override wins outright, otherwise
/// the deepest candidate does. Ties at the deepest level are a deployment
/// defect and are reported, never broken arbitrarily.
#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
    overrides: Arc<OverrideTable>,
}

impl Resolver {
    /// Create a resolver over a registry and override table
    pub fn new(registry: Arc<Registry>, overrides: Arc<OverrideTable>) -> Self {
        Self {
            registry,
            overrides,
        }
    }

    /// Resolve the responder identity for `initiator`
    pub fn resolve(&self, initiator: &FlowName) -> Result<FlowIdentity, ResolutionError> {
        if let Some(responder) = self.overrides.get(initiator) {
            debug!(%initiator, %responder, "Resolved responder from override");
            return Ok(responder);
        }

        let responder = most_specific(initiator, self.registry.candidates_for(initiator))?;
        debug!(
            %initiator,
            %responder,
            depth = responder.depth(),
            "Resolved most specific responder"
        );
        Ok(responder)
    }

    /// The registry this resolver reads
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The override table this resolver consults first
    pub fn overrides(&self) -> &Arc<OverrideTable> {
        &self.overrides
    }
}

/// Pick the unique deepest candidate.
///
/// Independent of iteration order: the result depends only on the set of
/// candidates.
pub fn most_specific(
    initiator: &FlowName,
    candidates: impl IntoIterator<Item = FlowIdentity>,
) -> Result<FlowIdentity, ResolutionError> {
    let mut deepest: Vec<FlowIdentity> = Vec::new();
    for candidate in candidates {
        trace!(%initiator, %candidate, depth = candidate.depth(), "Considering responder");
        match deepest.first().map(FlowIdentity::depth) {
            Some(max) if candidate.depth() < max => {}
            Some(max) if candidate.depth() == max => deepest.push(candidate),
            _ => deepest = vec![candidate],
        }
    }

    match deepest.len() {
        0 => Err(ResolutionError::NoResponderRegistered {
            initiator: initiator.clone(),
        }),
        1 => Ok(deepest.remove(0)),
        _ => {
            let mut candidates: Vec<FlowName> =
                deepest.into_iter().map(|c| c.name().clone()).collect();
            candidates.sort();
            Err(ResolutionError::AmbiguousResponder {
                initiator: initiator.clone(),
                candidates,
            })
        }
    }
}
