//! Defaults shared by the configuration, the write-back scheduler and the store.

/// Quiet time required after the last mutation of a file before it is written back.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Capacity of the broadcast channel carrying [`crate::events::StoreEvent`]s.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Id conventionally given to the file that backs the default graph.
pub const DEFAULT_GRAPH_ID: &str = "default";

/// Environment variable that overrides `RUST_LOG` for this library.
pub const LOG_ENV_VAR: &str = "GRAPHFILES_LOG";
