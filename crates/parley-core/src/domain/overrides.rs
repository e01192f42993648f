use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::domain::identity::{FlowIdentity, FlowName};
use crate::domain::registry::Registry;
use crate::error::ConfigurationError;

/// Explicit initiator → responder mapping supplied by node configuration.
///
/// An entry short-circuits default resolution for its initiator. Entries are
/// validated against the registry when installed, so the table never holds a
/// responder that cannot answer its initiator.
#[derive(Debug, Default)]
pub struct OverrideTable {
    entries: RwLock<HashMap<FlowName, FlowIdentity>>,
}

impl OverrideTable {
    /// Create an empty override table
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the override for `initiator`
    pub fn set(
        &self,
        registry: &Registry,
        initiator: FlowName,
        responder: &FlowName,
    ) -> Result<(), ConfigurationError> {
        let identity = Self::validate(registry, &initiator, responder)?;
        info!(%initiator, responder = %identity, "Installing flow override");
        self.entries.write().insert(initiator, identity);
        Ok(())
    }

    /// Validate and install a whole mapping.
    ///
    /// Nothing is installed unless every entry is valid.
    pub fn load(
        &self,
        registry: &Registry,
        overrides: &BTreeMap<FlowName, FlowName>,
    ) -> Result<(), ConfigurationError> {
        let validated = overrides
            .iter()
            .map(|(initiator, responder)| {
                Self::validate(registry, initiator, responder)
                    .map(|identity| (initiator.clone(), identity))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = self.entries.write();
        for (initiator, identity) in validated {
            info!(%initiator, responder = %identity, "Installing flow override");
            entries.insert(initiator, identity);
        }
        Ok(())
    }

    /// The override for `initiator`, if one is installed
    pub fn get(&self, initiator: &FlowName) -> Option<FlowIdentity> {
        self.entries.read().get(initiator).cloned()
    }

    /// Remove the override for `initiator`
    pub fn remove(&self, initiator: &FlowName) -> Option<FlowIdentity> {
        self.entries.write().remove(initiator)
    }

    /// Snapshot of all installed overrides, by initiator name
    pub fn entries(&self) -> BTreeMap<FlowName, FlowName> {
        self.entries
            .read()
            .iter()
            .map(|(initiator, responder)| (initiator.clone(), responder.name().clone()))
            .collect()
    }

    /// Number of installed overrides
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no override is installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(
        registry: &Registry,
        initiator: &FlowName,
        responder: &FlowName,
    ) -> Result<FlowIdentity, ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidOverride {
            initiator: initiator.clone(),
            responder: responder.clone(),
            reason: reason.to_string(),
        };

        let candidates = registry.candidates_for(initiator);
        if candidates.is_empty() {
            return Err(invalid("initiator has no registered responders"));
        }
        candidates
            .into_iter()
            .find(|candidate| candidate.name() == responder)
            .ok_or_else(|| invalid("responder is not registered for this initiator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::InitiationBinding;

    fn registry() -> Registry {
        let registry = Registry::new();
        let pong = FlowIdentity::root("Pong");
        registry
            .register(InitiationBinding::new("Ping", pong.clone()))
            .unwrap();
        registry
            .register(InitiationBinding::new(
                "Ping",
                FlowIdentity::extending("Pongiest", &pong),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_set_and_get() {
        let registry = registry();
        let table = OverrideTable::new();
        assert!(table.get(&"Ping".into()).is_none());

        table.set(&registry, "Ping".into(), &"Pong".into()).unwrap();
        assert_eq!(table.get(&"Ping".into()), Some(FlowIdentity::root("Pong")));

        table
            .set(&registry, "Ping".into(), &"Pongiest".into())
            .unwrap();
        assert_eq!(table.get(&"Ping".into()).unwrap().name().as_str(), "Pongiest");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_override_for_initiator_without_candidates_fails() {
        let registry = registry();
        let table = OverrideTable::new();
        let err = table
            .set(&registry, "Unknown".into(), &"Pong".into())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidOverride { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_override_naming_unbound_responder_fails() {
        let registry = registry();
        registry.declare(FlowIdentity::root("Stranger")).unwrap();
        let table = OverrideTable::new();

        let err = table
            .set(&registry, "Ping".into(), &"Stranger".into())
            .unwrap_err();
        match err {
            ConfigurationError::InvalidOverride {
                initiator,
                responder,
                ..
            } => {
                assert_eq!(initiator.as_str(), "Ping");
                assert_eq!(responder.as_str(), "Stranger");
            }
            other => panic!("Expected InvalidOverride, got {:?}", other),
        }
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let registry = registry();
        let table = OverrideTable::new();
        let mut overrides = BTreeMap::new();
        overrides.insert(FlowName::from("Ping"), FlowName::from("Pong"));
        overrides.insert(FlowName::from("Other"), FlowName::from("Pong"));

        assert!(table.load(&registry, &overrides).is_err());
        assert!(table.is_empty());

        overrides.remove(&FlowName::from("Other"));
        table.load(&registry, &overrides).unwrap();
        assert_eq!(table.entries(), overrides);
    }

    #[test]
    fn test_remove() {
        let registry = registry();
        let table = OverrideTable::new();
        table.set(&registry, "Ping".into(), &"Pong".into()).unwrap();
        assert!(table.remove(&"Ping".into()).is_some());
        assert!(table.get(&"Ping".into()).is_none());
    }
}
