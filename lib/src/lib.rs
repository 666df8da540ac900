//! Keeps in-memory RDF graphs synchronized with the files they were loaded from.
//!
//! A [`Store`] holds one graph per file. Quads are routed to the file backing
//! their graph term; the file backing the default graph is chosen in the
//! [`StoreConfig`]. Every change is written back asynchronously after a quiet
//! period, coalescing bursts of mutations into a single write per file.

pub mod collection;
pub mod config;
pub mod consts;
pub mod errors;
pub mod events;
pub mod io;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod store;
mod util;

pub use collection::{TripleCollection, TriplePattern};
pub use config::{FileSpec, StoreConfig, StoreConfigBuilder};
pub use errors::{Result, StoreError};
pub use events::StoreEvent;
pub use store::Store;

use crate::consts::LOG_ENV_VAR;

/// Initializes logging for the library.
///
/// If `GRAPHFILES_LOG` is set, its value replaces `RUST_LOG`. Then installs
/// `env_logger`; calling this more than once is harmless.
pub fn init_logging() {
    if let Ok(log_level) = std::env::var(LOG_ENV_VAR) {
        std::env::set_var("RUST_LOG", log_level);
    }
    let _ = env_logger::try_init();
}
