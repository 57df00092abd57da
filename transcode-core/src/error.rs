//! Error types for the staged media pipeline.
//!
//! Flow-control outcomes (`Busy`, `NeedsInput`, `EndOfStream`) are not errors
//! and never appear here; see [`crate::stage::SubmitStatus`] and
//! [`crate::stage::RetrieveStatus`].

use thiserror::Error;

/// Main error type shared by every stage, graph and adapter.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol violated (e.g. submit after close, resubmit after `Busy`).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input submitted after end-of-stream was signalled.
    #[error("Stage closed: end of stream already signalled")]
    Closed,

    /// Bad configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unavailable codec, filter or format.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Storage allocation failed.
    #[error("Out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Bounded resource exhausted (pool slots, queue depth).
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Option key not recognised by the stage.
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// Option value could not be parsed or is out of range.
    #[error("Invalid value for option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    /// Malformed input unit. Recoverable by discarding the unit.
    #[error("Corrupt input: {0}")]
    Corrupt(String),

    /// Graph construction or configuration errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Graph construction and configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// No node kind registered under this name.
    #[error("Unknown node kind: {0}")]
    UnknownKind(String),

    /// Node arguments rejected at creation.
    #[error("Invalid arguments for node '{node}': {reason}")]
    InvalidArgs { node: String, reason: String },

    /// Pad index beyond the node's pad list.
    #[error("Pad {pad} out of range on node '{node}' ({count} {direction} pads)")]
    PadOutOfRange {
        node: String,
        pad: usize,
        count: usize,
        direction: PadDirection,
    },

    /// Linked pads carry different media types.
    #[error("Type mismatch linking '{src}' ({src_type}) to '{dst}' ({dst_type})")]
    TypeMismatch {
        src: String,
        dst: String,
        src_type: String,
        dst_type: String,
    },

    /// No common format across an edge, or the topology has a cycle.
    #[error("Unresolvable: {0}")]
    Unresolvable(String),

    /// A required pad is not linked.
    #[error("Incomplete graph: {direction} pad {pad} of '{node}' is not linked")]
    Incomplete {
        node: String,
        pad: usize,
        direction: PadDirection,
    },

    /// Node id or name does not exist in this graph.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Topology change after configuration, or use before it.
    #[error("Invalid graph state: {0}")]
    InvalidState(String),
}

/// Direction of a pad on a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Input pad.
    Input,
    /// Output pad.
    Output,
}

impl std::fmt::Display for PadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a corrupt input error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    /// Create an invalid option error.
    pub fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable (skip the unit and continue).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }

    /// Check if this is a protocol violation.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::InvalidState(_) | Error::Closed)
    }

    /// Get the graph error, if this is one.
    pub fn as_graph(&self) -> Option<&GraphError> {
        match self {
            Error::Graph(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidState("submit before open".into());
        assert_eq!(err.to_string(), "Invalid state: submit before open");

        let err = Error::OutOfMemory { requested: 64 };
        assert_eq!(err.to_string(), "Out of memory: failed to allocate 64 bytes");
    }

    #[test]
    fn test_graph_error_conversion() {
        let err: Error = GraphError::UnknownKind("bogus".into()).into();
        assert!(matches!(
            err.as_graph(),
            Some(GraphError::UnknownKind(name)) if name == "bogus"
        ));
    }

    #[test]
    fn test_incomplete_display() {
        let err = GraphError::Incomplete {
            node: "sink".into(),
            pad: 0,
            direction: PadDirection::Input,
        };
        assert_eq!(
            err.to_string(),
            "Incomplete graph: input pad 0 of 'sink' is not linked"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::corrupt("truncated NAL").is_recoverable());
        assert!(!Error::Closed.is_recoverable());
        assert!(Error::Closed.is_protocol_violation());
    }
}
