//! The set of backing files, fixed once the store has loaded.
//!
//! A [`FileEntry`] binds a graph id to its path, its format and the in-memory
//! triples mirrored from the file. Entries never join or leave the
//! [`FileRegistry`] after construction; only their triples change.

use crate::collection::{TripleCollection, TriplePattern};
use crate::config::{FileSpec, StoreConfig};
use crate::errors::{Result, StoreError};
use crate::io::{parse_graph, resolve_format, serialize_triples};
use crate::util::lock;
use chrono::prelude::*;
use log::{error, info, warn};
use oxigraph::io::RdfFormat;
use oxigraph::model::{Graph, GraphName, NamedNode, Quad, Triple};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// What is known about the file's on-disk content.
#[derive(Debug, Default, Clone, Copy)]
struct DiskState {
    hash: Option<blake3::Hash>,
    persisted_at: Option<DateTime<Utc>>,
}

pub struct FileEntry {
    id: String,
    name: Option<NamedNode>,
    is_default: bool,
    path: PathBuf,
    format: RdfFormat,
    triples: Mutex<Box<dyn TripleCollection>>,
    disk: Mutex<DiskState>,
}

impl std::fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FileEntry")
            .field("id", &self.id)
            .field("is_default", &self.is_default)
            .field("path", &self.path)
            .field("format", &self.format)
            .finish()
    }
}

impl FileEntry {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        format: RdfFormat,
        triples: Box<dyn TripleCollection>,
    ) -> Self {
        let id = id.into();
        Self {
            name: NamedNode::new(id.as_str()).ok(),
            id,
            is_default: false,
            path: path.into(),
            format,
            triples: Mutex::new(triples),
            disk: Mutex::new(DiskState::default()),
        }
    }

    /// Remembers the content the file held when it was loaded.
    pub fn with_disk_content(self, bytes: &[u8]) -> Self {
        lock(&self.disk).hash = Some(blake3::hash(bytes));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> RdfFormat {
        self.format
    }

    /// The graph term quads of this file carry: the default graph sentinel for
    /// the default file, the id as a named node otherwise.
    pub fn graph_name(&self) -> GraphName {
        match (&self.name, self.is_default) {
            (Some(name), false) => GraphName::NamedNode(name.clone()),
            _ => GraphName::DefaultGraph,
        }
    }

    /// Exclusive access to the triples. Never hold the guard across an `.await`.
    pub fn triples(&self) -> MutexGuard<'_, Box<dyn TripleCollection>> {
        lock(&self.triples)
    }

    pub fn len(&self) -> usize {
        self.triples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the matching triples as quads tagged with this file's graph term.
    pub fn quads_matching(&self, pattern: &TriplePattern) -> Vec<Quad> {
        let graph_name = self.graph_name();
        self.triples()
            .matching(pattern)
            .into_iter()
            .map(|t: Triple| t.in_graph(graph_name.clone()))
            .collect()
    }

    /// Serializes the current triples in the file's format.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let triples = self.triples();
        serialize_triples(&**triples, self.format)
    }

    /// True if `bytes` is what the file is known to hold already.
    pub fn matches_disk(&self, bytes: &[u8]) -> bool {
        lock(&self.disk).hash == Some(blake3::hash(bytes))
    }

    /// Drops the record of what the file holds. Called before the file is
    /// truncated, so an interrupted write is never mistaken for known content.
    pub fn forget_disk(&self) {
        lock(&self.disk).hash = None;
    }

    pub fn mark_persisted(&self, bytes: &[u8]) -> DateTime<Utc> {
        let now = Utc::now();
        let mut disk = lock(&self.disk);
        disk.hash = Some(blake3::hash(bytes));
        disk.persisted_at = Some(now);
        now
    }

    /// When this store last wrote the file, if ever.
    pub fn last_persisted(&self) -> Option<DateTime<Utc>> {
        lock(&self.disk).persisted_at
    }

    fn load(spec: &FileSpec) -> Result<Self> {
        let path = absolute(&spec.path)?;
        let format = resolve_format(spec.format.as_deref(), &path)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                let graph = parse_graph(&bytes, format, &path)?;
                info!(
                    "Loaded graph {} from {} ({} triples)",
                    spec.id,
                    path.display(),
                    graph.len()
                );
                let entry = Self::new(spec.id.as_str(), path, format, Box::new(graph));
                Ok(entry.with_disk_content(&bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Graph file {} does not exist yet, starting {} empty",
                    path.display(),
                    spec.id
                );
                Ok(Self::new(spec.id.as_str(), path, format, Box::new(Graph::new())))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Loads every configured file. Files that cannot be read or parsed are logged
/// and left out; the others still load.
pub fn load_entries(specs: &[FileSpec]) -> Vec<FileEntry> {
    specs
        .iter()
        .filter_map(|spec| match FileEntry::load(spec) {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Failed to load graph {} from {}: {}", spec.id, spec.path.display(), e);
                None
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct FileRegistry {
    entries: Vec<Arc<FileEntry>>,
    by_id: HashMap<String, usize>,
    default_index: usize,
}

impl FileRegistry {
    /// Builds the registry, marking `default_id` as the file behind the default graph.
    pub fn new(entries: Vec<FileEntry>, default_id: &str) -> Result<Self> {
        if entries.is_empty() {
            return Err(StoreError::NoFilesLoaded);
        }
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut default_index = None;
        let mut registered = Vec::with_capacity(entries.len());
        for (index, mut entry) in entries.into_iter().enumerate() {
            if by_id.insert(entry.id.clone(), index).is_some() {
                return Err(StoreError::DuplicateGraph(entry.id));
            }
            if entry.id == default_id {
                entry.is_default = true;
                default_index = Some(index);
            } else if entry.name.is_none() {
                return Err(StoreError::InvalidGraphId(entry.id));
            }
            registered.push(Arc::new(entry));
        }
        let default_index =
            default_index.ok_or_else(|| StoreError::MissingDefaultGraph(default_id.to_string()))?;
        Ok(Self {
            entries: registered,
            by_id,
            default_index,
        })
    }

    /// Loads the configured files and validates the result.
    pub fn load(config: &StoreConfig) -> Result<Self> {
        let entries = load_entries(&config.files);
        if entries.len() < config.files.len() {
            warn!(
                "Only {} of {} graph files loaded",
                entries.len(),
                config.files.len()
            );
        }
        Self::new(entries, &config.default_graph)
    }

    pub fn lookup(&self, id: &str) -> Option<&Arc<FileEntry>> {
        self.by_id.get(id).map(|&index| &self.entries[index])
    }

    /// Every entry, in configuration order.
    pub fn all(&self) -> &[Arc<FileEntry>] {
        &self.entries
    }

    pub fn default_entry(&self) -> &Arc<FileEntry> {
        &self.entries[self.default_index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
