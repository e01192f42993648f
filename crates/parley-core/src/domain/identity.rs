use serde::{Deserialize, Serialize};
use std::fmt;

/// Value object: name of a flow definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowName(pub String);

impl FlowName {
    /// Create a new flow name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for FlowName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Stable identity of a flow definition together with its ancestry.
///
/// The lineage runs from the outermost ancestor down to the flow itself and
/// never contains the implicit flow base. A flow that extends nothing has a
/// lineage of one element, so its specificity depth is 1; every level of
/// extension adds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowIdentity {
    name: FlowName,
    lineage: Vec<FlowName>,
}

impl FlowIdentity {
    /// Identity of a flow that extends only the flow base
    pub fn root(name: impl Into<FlowName>) -> Self {
        let name = name.into();
        Self {
            lineage: vec![name.clone()],
            name,
        }
    }

    /// Identity of a flow that extends `parent`
    pub fn extending(name: impl Into<FlowName>, parent: &FlowIdentity) -> Self {
        let name = name.into();
        let mut lineage = parent.lineage.clone();
        lineage.push(name.clone());
        Self { name, lineage }
    }

    /// Build an identity from an explicit root-to-self lineage.
    ///
    /// Returns `None` for an empty lineage or one that names a flow twice.
    pub fn from_lineage(lineage: Vec<FlowName>) -> Option<Self> {
        let name = lineage.last()?.clone();
        let mut seen = std::collections::HashSet::with_capacity(lineage.len());
        if !lineage.iter().all(|flow| seen.insert(flow)) {
            return None;
        }
        Some(Self { name, lineage })
    }

    /// The flow's own name
    #[inline]
    pub fn name(&self) -> &FlowName {
        &self.name
    }

    /// Ancestors from the outermost down to this flow, inclusive
    #[inline]
    pub fn lineage(&self) -> &[FlowName] {
        &self.lineage
    }

    /// Specificity depth used when several responders compete
    #[inline]
    pub fn depth(&self) -> usize {
        self.lineage.len()
    }

    /// The flow this one directly extends, if any
    pub fn parent(&self) -> Option<&FlowName> {
        self.lineage.iter().rev().nth(1)
    }

    /// Whether `ancestor` appears in this identity's lineage (itself included)
    pub fn is_subflow_of(&self, ancestor: &FlowName) -> bool {
        self.lineage.contains(ancestor)
    }
}

impl fmt::Display for FlowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}
