//! Engine error type.

use lumen_config::ConfigError;
use lumen_core::{GraphError, RegistryError};
use lumen_platform::{RouteError, SignalError};
use lumen_render::{BackendError, FrameError, ResourceError, Resolution};
use thiserror::Error;

/// Errors surfaced by [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A graph mutation was rejected.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The node registry is unusable.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A route could not be created.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// A signal key was rejected.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Render resources could not be set up.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The render backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A frame could not run.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Settings or project I/O failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The engine stopped after an unrecoverable backend loss.
    #[error("engine stopped after unrecoverable backend loss")]
    Stopped,

    /// A zero-sized output was requested.
    #[error("invalid output resolution {0}")]
    InvalidResolution(Resolution),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::NodeId;

    #[test]
    fn wrapped_errors_display_transparently() {
        let err: EngineError = GraphError::SelfConnection(NodeId::from_raw(3)).into();
        assert_eq!(
            err.to_string(),
            GraphError::SelfConnection(NodeId::from_raw(3)).to_string()
        );
        let err: EngineError = FrameError::DeviceUnavailable.into();
        assert_eq!(err.to_string(), "render device unavailable");
    }

    #[test]
    fn engine_specific_display() {
        assert_eq!(
            EngineError::Stopped.to_string(),
            "engine stopped after unrecoverable backend loss"
        );
        assert_eq!(
            EngineError::InvalidResolution(Resolution::new(0, 10)).to_string(),
            "invalid output resolution 0x10"
        );
    }
}
