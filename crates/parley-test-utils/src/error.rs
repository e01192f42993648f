use thiserror::Error;

use parley_core::NodeError;
use parley_transport_inmemory::NetworkError;

/// Error types for the test utilities
#[derive(Debug, Error)]
pub enum TestError {
    /// Node assembly or operation failed
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    /// Network membership failed
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Test setup failed
    #[error("Test setup failed: {0}")]
    TestSetupFailed(String),
}
