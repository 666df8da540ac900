//! Configuration of a store: which files back which graphs, which one is the
//! default graph, and how long the write-back debounce window is.

use crate::consts::{DEFAULT_DEBOUNCE_MS, DEFAULT_EVENT_CAPACITY, DEFAULT_GRAPH_ID};
use anyhow::{anyhow, Result};
use derive_builder::Builder;
use globset::{Glob, GlobSetBuilder};
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One backing file and the graph it holds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    /// Graph name (an IRI), or any string for the file backing the default graph.
    pub id: String,
    pub path: PathBuf,
    /// Media type (`text/turtle`) or extension (`ttl`). Inferred from `path` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FileSpec {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Makes a relative path absolute against `root`.
    pub fn anchored(mut self, root: &Path) -> Self {
        if self.path.is_relative() {
            self.path = root.join(&self.path);
        }
        self
    }

    /// Walks `root` and returns one [`FileSpec`] per file matching any of `includes`.
    /// Each id is `base_iri` followed by the file's path relative to `root`,
    /// without its extension.
    pub fn discover<I>(root: &Path, includes: I, base_iri: &str) -> Result<Vec<FileSpec>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for include in includes {
            builder.add(Glob::new(include.as_ref())?);
        }
        let globs = builder.build()?;

        let mut specs = Vec::new();
        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root)?;
            if !globs.is_match(relative) && !globs.is_match(entry.file_name()) {
                continue;
            }
            let stem = relative.with_extension("");
            let stem = stem
                .to_str()
                .ok_or_else(|| anyhow!("Non UTF-8 path: {}", entry.path().display()))?
                .replace('\\', "/");
            debug!("Discovered graph file {}", entry.path().display());
            specs.push(FileSpec::new(
                format!("{}{}", base_iri, stem),
                entry.path().to_path_buf(),
            ));
        }
        Ok(specs)
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

#[derive(Builder, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct StoreConfig {
    pub files: Vec<FileSpec>,
    /// Id of the file backing the default graph.
    #[builder(default = "DEFAULT_GRAPH_ID.to_string()")]
    #[serde(default = "default_graph_id")]
    pub default_graph: String,
    /// Quiet time after the last mutation of a file before it is written back.
    #[builder(default = "DEFAULT_DEBOUNCE_MS")]
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[builder(default = "DEFAULT_EVENT_CAPACITY")]
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_graph_id() -> String {
    DEFAULT_GRAPH_ID.to_string()
}

impl StoreConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(0) = self.event_capacity {
            return Err("event_capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// A store made of a single file that backs the default graph.
    pub fn single_file(path: impl Into<PathBuf>) -> Self {
        Self {
            files: vec![FileSpec::new(DEFAULT_GRAPH_ID, path)],
            default_graph: DEFAULT_GRAPH_ID.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    /// Loads a JSON config. Relative file paths are resolved against the
    /// directory containing the config file.
    pub fn from_file(file: &Path) -> Result<Self> {
        let reader = BufReader::new(std::fs::File::open(file)?);
        let mut config: StoreConfig = serde_json::from_reader(reader)?;
        let root = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        config.files = config
            .files
            .into_iter()
            .map(|spec| spec.anchored(&root))
            .collect();
        Ok(config)
    }
}
