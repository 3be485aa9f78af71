//! Error types for meshscope-core.
//!
//! Per-cycle operations never fail: a node with no text, no identity or no
//! observed peers is a normal state. Errors only arise while building the
//! roster and pattern tables the monitor is configured with.

use thiserror::Error;

/// Result type for meshscope-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring a monitor.
#[derive(Debug, Error)]
pub enum Error {
    /// A string that was expected to be a peer identifier does not have the shape.
    #[error("invalid peer identifier: {0:?}")]
    InvalidPeerId(String),

    /// The same node name appears twice in a roster.
    #[error("duplicate node in roster: {0}")]
    DuplicateNode(String),

    /// A roster must name at least one node.
    #[error("roster has no nodes")]
    EmptyRoster,

    /// A hint maps an identifier to a node the roster does not contain.
    #[error("hint for {id} names unknown node {node}")]
    UnknownHintTarget { id: String, node: String },

    /// Text was supplied for a node the roster does not contain.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A configured pattern failed to compile.
    #[error("invalid pattern {name:?}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// Roster configuration could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
