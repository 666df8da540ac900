//! Notifications published on the store's broadcast channel.

use chrono::prelude::*;
use oxigraph::model::{GraphName, Quad};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A quad became a member of its graph. Emitted before the mutating call returns.
    QuadAdded(Quad),
    /// A quad stopped being a member of its graph. Emitted before the mutating call returns.
    QuadRemoved(Quad),
    /// A write-back finished and the file holds the serialized graph.
    Persisted {
        graph: GraphName,
        path: PathBuf,
        bytes: usize,
        at: DateTime<Utc>,
    },
    /// A write-back settled without touching the file: the serialization
    /// equals what is already on disk.
    Unchanged { graph: GraphName, path: PathBuf },
    /// Opening, serializing or writing failed. The file stays stale until the
    /// next mutation of its graph schedules another write-back.
    WriteFailed {
        graph: GraphName,
        path: PathBuf,
        error: String,
    },
}

impl StoreEvent {
    /// Returns the graph the event is about.
    pub fn graph(&self) -> &GraphName {
        match self {
            StoreEvent::QuadAdded(quad) | StoreEvent::QuadRemoved(quad) => &quad.graph_name,
            StoreEvent::Persisted { graph, .. }
            | StoreEvent::Unchanged { graph, .. }
            | StoreEvent::WriteFailed { graph, .. } => graph,
        }
    }

    pub fn is_write_back(&self) -> bool {
        matches!(
            self,
            StoreEvent::Persisted { .. }
                | StoreEvent::Unchanged { .. }
                | StoreEvent::WriteFailed { .. }
        )
    }
}
