//! Process-wide table of declared flows and responder bindings.
//!
//! Built once at node start from the deployment bundle and shared by
//! reference with the resolver. Reads are concurrent; writes are serialized
//! behind the lock and only happen on deployment.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::domain::identity::{FlowIdentity, FlowName};
use crate::error::ConfigurationError;

/// A responder's declaration that it answers sessions opened by `initiator`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitiationBinding {
    /// The initiating flow being answered
    pub initiator: FlowName,

    /// The responder declaring the binding
    pub responder: FlowIdentity,
}

impl InitiationBinding {
    /// Create a new binding
    pub fn new(initiator: impl Into<FlowName>, responder: FlowIdentity) -> Self {
        Self {
            initiator: initiator.into(),
            responder,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    flows: HashMap<FlowName, FlowIdentity>,
    bindings: HashMap<FlowName, HashSet<FlowIdentity>>,
}

impl RegistryState {
    fn declare(&mut self, identity: &FlowIdentity) -> Result<(), ConfigurationError> {
        match self.flows.get(identity.name()) {
            Some(existing) if existing != identity => Err(
                ConfigurationError::ConflictingDeclaration(identity.name().clone()),
            ),
            Some(_) => Ok(()),
            None => {
                self.flows.insert(identity.name().clone(), identity.clone());
                Ok(())
            }
        }
    }
}

/// Registry of flow identities and initiation bindings
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a flow identity.
    ///
    /// Declaring the same identity twice is a no-op; declaring a name again
    /// with a different lineage is a configuration error.
    pub fn declare(&self, identity: FlowIdentity) -> Result<(), ConfigurationError> {
        self.state.write().declare(&identity)
    }

    /// Add a responder candidate for an initiator. Idempotent.
    pub fn register(&self, binding: InitiationBinding) -> Result<(), ConfigurationError> {
        let mut state = self.state.write();
        state.declare(&binding.responder)?;

        let inserted = state
            .bindings
            .entry(binding.initiator.clone())
            .or_default()
            .insert(binding.responder.clone());

        if inserted {
            debug!(
                initiator = %binding.initiator,
                responder = %binding.responder,
                depth = binding.responder.depth(),
                "Registered responder binding"
            );
        }
        Ok(())
    }

    /// Every responder ever bound to `initiator`, in no particular order
    pub fn candidates_for(&self, initiator: &FlowName) -> HashSet<FlowIdentity> {
        self.state
            .read()
            .bindings
            .get(initiator)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether `responder` is bound to `initiator`
    pub fn is_candidate(&self, initiator: &FlowName, responder: &FlowName) -> bool {
        self.state
            .read()
            .bindings
            .get(initiator)
            .map(|candidates| candidates.iter().any(|c| c.name() == responder))
            .unwrap_or(false)
    }

    /// Look up a declared identity by name
    pub fn identity(&self, name: &FlowName) -> Option<FlowIdentity> {
        self.state.read().flows.get(name).cloned()
    }

    /// Initiators with at least one bound responder, sorted by name
    pub fn initiators(&self) -> Vec<FlowName> {
        let mut initiators: Vec<FlowName> = self.state.read().bindings.keys().cloned().collect();
        initiators.sort();
        initiators
    }

    /// Number of declared flows
    pub fn len(&self) -> usize {
        self.state.read().flows.len()
    }

    /// Whether no flow has been declared
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
