//! Snapshot parse errors

/// Errors raised while reading a snapshot into a [`crate::Topology`]
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Snapshot is not a valid YAML/JSON document
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_yaml::Error),

    /// Resource id does not have 3 or 4 non-empty `:`-separated tokens
    #[error("invalid resource id '{0}': expected provider:type[:namespace]:name")]
    InvalidResourceId(String),

    /// Edge key is not of the form `<source> -> <target>`
    #[error("invalid edge '{0}': expected '<source> -> <target>'")]
    InvalidEdge(String),

    /// Resource properties are neither a mapping nor null
    #[error("properties of '{0}' must be a mapping")]
    InvalidProperties(String),

    /// A top-level section has the wrong shape
    #[error("section '{0}' must be a mapping")]
    InvalidSection(&'static str),
}
