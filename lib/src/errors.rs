//! Error type shared by every layer of the store.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A named graph that no registered file backs.
    #[error("unknown graph <{0}>: no registered file backs it")]
    UnknownGraph(String),

    /// A graph term that cannot address a file (e.g. a blank node).
    #[error("invalid graph term {0}: only named nodes and the default graph address a file")]
    InvalidGraphTerm(String),

    #[error("graph id {0} is registered more than once")]
    DuplicateGraph(String),

    #[error("no graph file could be loaded")]
    NoFilesLoaded,

    #[error("default graph id {0} is not among the loaded files")]
    MissingDefaultGraph(String),

    #[error("graph id {0} is not an absolute IRI and cannot name a graph")]
    InvalidGraphId(String),

    #[error("unsupported RDF format {0}")]
    UnsupportedFormat(String),

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The store failed to initialize; every operation reports the original cause.
    #[error("store initialization failed: {0}")]
    Init(Arc<StoreError>),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
