//! Errors raised while decoding the textual state encodings.

use thiserror::Error;

/// Failure to parse a serialized state, node identity or node type.
///
/// Parsing never attempts partial recovery: the first malformed token
/// aborts the whole parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A token did not have the `key:value` shape.
    #[error("token '{0}' is not a key:value pair")]
    MissingColon(String),

    /// The state letter is not one of `-mdsiru`.
    #[error("unknown state '{0}'")]
    UnknownState(String),

    /// The node type is neither `storage` nor `distributor`.
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    /// A value could not be converted to the expected numeric type.
    #[error("invalid value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },

    /// A node key was given before any `distributor:`/`storage:` section.
    #[error("node key '{0}' appears before any node type section")]
    MissingNodeType(String),

    /// A node index at or beyond the declared node count.
    #[error("cannot index {node_type} node {index} of {count}")]
    IndexOutOfRange {
        node_type: String,
        index: u16,
        count: u16,
    },

    /// Disk-level keys belong to a legacy encoding that is no longer read.
    #[error("disk-level state key '{0}' is not supported")]
    DiskStatesUnsupported(String),

    /// A node index too large to be covered by a node count.
    #[error("node {0} is beyond the largest countable index")]
    NodeIndexTooLarge(String),

    /// An escape sequence in a description was truncated or malformed.
    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),

    /// A node identity was not of the form `<type>.<index>`.
    #[error("invalid node identity '{0}'")]
    InvalidNode(String),

    /// The decoded state is not permitted where it was used.
    #[error("{0}")]
    NotValidHere(String),
}

/// Result type for parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;
