use std::fmt;
use tracing::{debug, warn};

use crate::application::flow_runtime::{
    responder_factory, FlowCatalog, FlowLogic, ResponderFactory,
};
use crate::domain::identity::{FlowIdentity, FlowName};
use crate::domain::registry::{InitiationBinding, Registry};
use crate::domain::session::FlowSession;
use crate::error::ConfigurationError;

/// One flow installed on a node
#[derive(Clone)]
pub struct FlowDeclaration {
    identity: FlowIdentity,
    initiated_by: Option<FlowName>,
    factory: Option<ResponderFactory>,
}

impl FlowDeclaration {
    /// Declare a flow without responder logic
    pub fn new(identity: FlowIdentity, initiated_by: Option<FlowName>) -> Self {
        Self {
            identity,
            initiated_by,
            factory: None,
        }
    }

    /// Declare a flow that can only be started locally
    pub fn initiating(identity: FlowIdentity) -> Self {
        Self::new(identity, None)
    }

    /// Declare a responder to `initiated_by` with the logic it runs
    pub fn responder<F, L>(
        identity: FlowIdentity,
        initiated_by: impl Into<FlowName>,
        factory: F,
    ) -> Self
    where
        F: Fn(FlowSession) -> L + Send + Sync + 'static,
        L: FlowLogic + 'static,
    {
        Self::new(identity, Some(initiated_by.into())).with_factory(responder_factory(factory))
    }

    /// Attach responder logic
    pub fn with_factory(mut self, factory: ResponderFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Identity of the declared flow
    pub fn identity(&self) -> &FlowIdentity {
        &self.identity
    }

    /// Initiator this flow responds to, if any
    pub fn initiated_by(&self) -> Option<&FlowName> {
        self.initiated_by.as_ref()
    }

    /// Whether responder logic is attached
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }
}

impl fmt::Debug for FlowDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowDeclaration")
            .field("identity", &self.identity)
            .field("initiated_by", &self.initiated_by)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// The set of flows deployed to a node
#[derive(Debug, Clone, Default)]
pub struct FlowBundle {
    declarations: Vec<FlowDeclaration>,
}

impl FlowBundle {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration
    pub fn with(mut self, declaration: FlowDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Add a declaration
    pub fn push(&mut self, declaration: FlowDeclaration) {
        self.declarations.push(declaration);
    }

    /// Declarations in installation order
    pub fn declarations(&self) -> &[FlowDeclaration] {
        &self.declarations
    }

    /// Number of declarations
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Whether the bundle is empty
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Declare every flow and binding in `registry` and collect responder logic
    pub fn install(&self, registry: &Registry) -> Result<FlowCatalog, ConfigurationError> {
        let mut catalog = FlowCatalog::new();
        for declaration in &self.declarations {
            let identity = &declaration.identity;
            registry.declare(identity.clone())?;

            match (&declaration.initiated_by, &declaration.factory) {
                (Some(initiator), Some(factory)) => {
                    registry.register(InitiationBinding::new(initiator.clone(), identity.clone()))?;
                    catalog.insert(identity.name().clone(), factory.clone());
                }
                (Some(_), None) => {
                    return Err(ConfigurationError::MissingResponderLogic(
                        identity.name().clone(),
                    ));
                }
                (None, Some(_)) => {
                    warn!(
                        flow = %identity,
                        "Ignoring responder logic for flow that responds to nothing"
                    );
                }
                (None, None) => {}
            }
            debug!(flow = %identity, initiated_by = ?declaration.initiated_by, "Installed flow");
        }
        Ok(catalog)
    }
}
