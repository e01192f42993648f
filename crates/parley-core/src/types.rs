use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Opaque application payload carried on a session.
///
/// This is a thin wrapper around a JSON value. Flows encode typed values into
/// it on `send` and decode them back on `receive`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Payload {
    value: serde_json::Value,
}

impl Payload {
    /// Create a new payload from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// The payload returned by flows that produce no value
    #[inline]
    pub fn unit() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }

    /// Encode a typed value
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            value: serde_json::to_value(value)?,
        })
    }

    /// Decode into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }

    /// Get the inner JSON value
    #[inline]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Take ownership of the inner JSON value
    #[inline]
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Check if the payload is the unit payload
    #[inline]
    pub fn is_unit(&self) -> bool {
        self.value.is_null()
    }

    /// Try to view the payload as a string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::unit()
    }
}
