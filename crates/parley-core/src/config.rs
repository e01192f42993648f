//! Node configuration
//!
//! Loaded from YAML and overlaid from `PARLEY_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::identity::FlowName;
use crate::domain::session::PeerId;
use crate::error::ConfigurationError;

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name this node is known by on the network
    pub peer_name: PeerId,

    /// Explicit initiator -> responder overrides
    #[serde(default)]
    pub flow_overrides: BTreeMap<FlowName, FlowName>,

    /// Flows allowed to run at once; suspended flows do not count
    #[serde(default = "default_max_concurrent_flows")]
    pub max_concurrent_flows: usize,

    /// Kill flows that run longer than this
    #[serde(default)]
    pub flow_timeout_secs: Option<u64>,

    /// Log level used when no filter is set in the environment
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_concurrent_flows() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Configuration with defaults for the given peer
    pub fn new(peer_name: impl Into<PeerId>) -> Self {
        Self {
            peer_name: peer_name.into(),
            flow_overrides: BTreeMap::new(),
            max_concurrent_flows: default_max_concurrent_flows(),
            flow_timeout_secs: None,
            log_level: default_log_level(),
        }
    }

    /// Add a flow override
    pub fn with_override(
        mut self,
        initiator: impl Into<FlowName>,
        responder: impl Into<FlowName>,
    ) -> Self {
        self.flow_overrides.insert(initiator.into(), responder.into());
        self
    }

    /// Set the worker pool size
    pub fn with_max_concurrent_flows(mut self, max: usize) -> Self {
        self.max_concurrent_flows = max;
        self
    }

    /// Set the flow timeout
    pub fn with_flow_timeout_secs(mut self, secs: u64) -> Self {
        self.flow_timeout_secs = Some(secs);
        self
    }

    /// Parse a YAML document and validate it
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document, overlay the environment and validate
    pub fn load(yaml: &str) -> Result<Self, ConfigurationError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.apply_env()?;
        config.validate()?;
        info!(
            peer = %config.peer_name,
            overrides = config.flow_overrides.len(),
            "Loaded node configuration"
        );
        Ok(config)
    }

    /// Overlay values from `PARLEY_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigurationError> {
        self.apply_vars(|key| env::var(key).ok())
    }

    /// Overlay values looked up by `PARLEY_*` key. A malformed value fails
    /// the whole overlay and leaves the configuration untouched.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut next = self.clone();

        if let Some(peer_name) = lookup("PARLEY_PEER_NAME") {
            next.peer_name = PeerId::new(peer_name);
        }
        if let Some(max) = lookup("PARLEY_MAX_CONCURRENT_FLOWS") {
            next.max_concurrent_flows = parse_var("max_concurrent_flows", &max)?;
        }
        if let Some(timeout) = lookup("PARLEY_FLOW_TIMEOUT_SECS") {
            next.flow_timeout_secs = Some(parse_var("flow_timeout_secs", &timeout)?);
        }
        if let Some(log_level) = lookup("PARLEY_LOG_LEVEL") {
            next.log_level = log_level;
        }
        if let Some(overrides) = lookup("PARLEY_FLOW_OVERRIDES") {
            next.flow_overrides.extend(parse_overrides(&overrides)?);
        }

        debug!(peer = %next.peer_name, "Applied environment overlay");
        *self = next;
        Ok(())
    }

    /// Check value ranges. Overrides are checked against the registry at node build.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.peer_name.as_str().trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                key: "peer_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.max_concurrent_flows == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "max_concurrent_flows".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.flow_timeout_secs == Some(0) {
            return Err(ConfigurationError::InvalidValue {
                key: "flow_timeout_secs".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    /// The flow timeout as a duration
    pub fn flow_timeout(&self) -> Option<Duration> {
        self.flow_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigurationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigurationError::InvalidValue {
            key: key.to_string(),
            message: format!("not a valid number: '{}'", value),
        })
}

/// Parse `Initiator=Responder` pairs separated by commas
pub fn parse_overrides(value: &str) -> Result<BTreeMap<FlowName, FlowName>, ConfigurationError> {
    let mut overrides = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (initiator, responder) = pair
            .split_once('=')
            .map(|(i, r)| (i.trim(), r.trim()))
            .filter(|(i, r)| !i.is_empty() && !r.is_empty())
            .ok_or_else(|| ConfigurationError::InvalidValue {
                key: "flow_overrides".to_string(),
                message: format!("expected Initiator=Responder, got '{}'", pair),
            })?;
        overrides.insert(FlowName::from(initiator), FlowName::from(responder));
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_with_defaults() {
        let config = NodeConfig::from_yaml_str("peer_name: alice\n").unwrap();
        assert_eq!(config, NodeConfig::new("alice"));
        assert_eq!(config.max_concurrent_flows, 64);
        assert!(config.flow_timeout().is_none());
    }

    #[test]
    fn test_yaml_with_overrides() {
        let yaml = r#"
peer_name: bob
max_concurrent_flows: 4
flow_timeout_secs: 30
flow_overrides:
  Ping: Pong
"#;
        let config = NodeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_concurrent_flows, 4);
        assert_eq!(config.flow_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.flow_overrides.get(&FlowName::from("Ping")),
            Some(&FlowName::from("Pong"))
        );
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = NodeConfig::from_yaml_str("peer_name: a\nmax_concurrent_flows: 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { key, .. } if key == "max_concurrent_flows"
        ));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        assert!(matches!(
            NodeConfig::from_yaml_str("peer_name: [").unwrap_err(),
            ConfigurationError::Parse(_)
        ));
    }

    #[test]
    fn test_parse_overrides() {
        let parsed = parse_overrides("Ping=Pong, Other = Resp ,").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&FlowName::from("Other")], FlowName::from("Resp"));

        assert!(parse_overrides("Ping").is_err());
        assert!(parse_overrides("=Pong").is_err());
        assert!(parse_overrides("").unwrap().is_empty());
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_env_overlay() {
        let mut config = NodeConfig::new("alice");
        config
            .apply_vars(vars(&[
                ("PARLEY_PEER_NAME", "bob"),
                ("PARLEY_MAX_CONCURRENT_FLOWS", "8"),
                ("PARLEY_FLOW_TIMEOUT_SECS", "30"),
                ("PARLEY_FLOW_OVERRIDES", "Ping=Pong"),
            ]))
            .unwrap();
        assert_eq!(config.peer_name, PeerId::from("bob"));
        assert_eq!(config.max_concurrent_flows, 8);
        assert_eq!(config.flow_timeout_secs, Some(30));
        assert_eq!(
            config.flow_overrides.get(&FlowName::from("Ping")),
            Some(&FlowName::from("Pong"))
        );
    }

    #[test]
    fn test_malformed_env_overrides_fail() {
        let mut config = NodeConfig::new("bob").with_override("Other", "Resp");
        let before = config.clone();

        let err = config
            .apply_vars(vars(&[("PARLEY_FLOW_OVERRIDES", "Ping")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { key, .. } if key == "flow_overrides"
        ));
        assert_eq!(config, before);
    }

    #[test]
    fn test_malformed_env_numbers_fail() {
        let mut config = NodeConfig::new("bob");
        let err = config
            .apply_vars(vars(&[("PARLEY_MAX_CONCURRENT_FLOWS", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { key, .. } if key == "max_concurrent_flows"
        ));

        let err = config
            .apply_vars(vars(&[("PARLEY_FLOW_TIMEOUT_SECS", "-1")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { key, .. } if key == "flow_timeout_secs"
        ));
        assert_eq!(config, NodeConfig::new("bob"));
    }

    #[test]
    fn test_builder_helpers() {
        let config = NodeConfig::new("alice")
            .with_override("Ping", "Pong")
            .with_max_concurrent_flows(2)
            .with_flow_timeout_secs(5);
        assert_eq!(config.flow_overrides.len(), 1);
        assert_eq!(config.max_concurrent_flows, 2);
        assert_eq!(config.flow_timeout_secs, Some(5));
        assert!(config.validate().is_ok());
    }
}
