//! Graphics error types.

use std::fmt;

use crate::graph::GraphError;

/// Errors that can occur in the material system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to create a GPU resource.
    ResourceCreationFailed(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// A handle did not refer to a live resource.
    InvalidHandle(String),
    /// A draw command referenced more textures than a command can carry.
    DrawCommandTextureOverflow {
        /// Name of the shader owning the stage.
        shader: String,
        /// Per-command texture limit.
        limit: usize,
    },
    /// A fixed-size GPU table would overflow.
    CapacityExceeded {
        /// What ran out.
        what: &'static str,
        /// Requested amount.
        requested: usize,
        /// Available amount.
        limit: usize,
    },
    /// A compute kernel failed naga validation.
    ShaderValidation(String),
    /// The pass graph could not be compiled.
    Graph(GraphError),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::InvalidHandle(msg) => write!(f, "invalid handle: {msg}"),
            Self::DrawCommandTextureOverflow { shader, limit } => write!(
                f,
                "exceeded max draw command textures ({limit}) in shader {shader}"
            ),
            Self::CapacityExceeded {
                what,
                requested,
                limit,
            } => write!(f, "too many {what}: {requested} (limit {limit})"),
            Self::ShaderValidation(msg) => write!(f, "shader validation failed: {msg}"),
            Self::Graph(err) => write!(f, "pass graph error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

impl From<GraphError> for GraphicsError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::DrawCommandTextureOverflow {
            shader: "textures/base/wall".to_string(),
            limit: 64,
        };
        assert_eq!(
            err.to_string(),
            "exceeded max draw command textures (64) in shader textures/base/wall"
        );

        let err = GraphicsError::CapacityExceeded {
            what: "materials",
            requested: 300,
            limit: 256,
        };
        assert_eq!(err.to_string(), "too many materials: 300 (limit 256)");
    }

    #[test]
    fn test_graph_error_conversion() {
        let err: GraphicsError = GraphError::CyclicDependency.into();
        assert!(matches!(err, GraphicsError::Graph(GraphError::CyclicDependency)));
    }
}
