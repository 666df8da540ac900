//! Reading, serializing and writing the files that back each graph.
//!
//! Parsing and serialization are delegated to Oxigraph; this module only decides
//! which format applies to a file and owns the exclusive write handle the
//! scheduler holds while a write-back is pending.

use crate::collection::TripleCollection;
use crate::errors::{Result, StoreError};
use fs2::FileExt;
use log::debug;
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{Graph, Triple};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Picks the RDF format for a file: an explicit media type or extension wins,
/// otherwise the path's extension decides, falling back to Turtle.
pub fn resolve_format(format: Option<&str>, path: &Path) -> Result<RdfFormat> {
    if let Some(name) = format {
        return RdfFormat::from_media_type(name)
            .or_else(|| RdfFormat::from_extension(name.trim_start_matches('.')))
            .ok_or_else(|| StoreError::UnsupportedFormat(name.to_string()));
    }
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(RdfFormat::from_extension);
    Ok(format.unwrap_or_else(|| {
        debug!(
            "No known RDF extension on {}, assuming Turtle",
            path.display()
        );
        RdfFormat::Turtle
    }))
}

/// Parses `bytes` into a graph. Named graphs are rejected: one file holds one graph.
pub fn parse_graph(bytes: &[u8], format: RdfFormat, path: &Path) -> Result<Graph> {
    let parser = RdfParser::from_format(format)
        .without_named_graphs()
        .for_reader(bytes);
    let mut graph = Graph::new();
    for quad in parser {
        let quad = quad.map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let triple = Triple::new(quad.subject, quad.predicate, quad.object);
        graph.insert(&triple);
    }
    Ok(graph)
}

pub fn read_graph(path: &Path, format: RdfFormat) -> Result<Graph> {
    debug!("Reading file: {}", path.display());
    let bytes = std::fs::read(path)?;
    parse_graph(&bytes, format, path)
}

/// Serializes every triple of the collection in the given format.
pub fn serialize_triples(triples: &dyn TripleCollection, format: RdfFormat) -> Result<Vec<u8>> {
    let mut serializer = RdfSerializer::from_format(format).for_writer(Vec::new());
    for triple in triples.iter() {
        serializer.serialize_triple(triple)?;
    }
    Ok(serializer.finish()?)
}

/// An open, exclusively locked write handle on a backing file.
///
/// The lock is released when the handle is closed or dropped.
#[derive(Debug)]
pub struct ExclusiveFile {
    file: Option<File>,
    path: PathBuf,
}

impl ExclusiveFile {
    /// Opens (creating if needed, never truncating) and locks the file.
    /// Fails immediately if another handle holds the lock.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(path)).await?
    }

    fn open_blocking(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        if let Err(e) = file.try_lock_exclusive() {
            return Err(StoreError::Io(io::Error::new(
                e.kind(),
                format!(
                    "could not acquire exclusive lock on {}: {}",
                    path.display(),
                    e
                ),
            )));
        }
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the whole file content with `bytes` and syncs it to disk.
    pub async fn replace_contents(&mut self, bytes: Vec<u8>) -> Result<()> {
        let mut file = self.file.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "write handle is already closed")
        })?;
        let (file, result) = tokio::task::spawn_blocking(move || {
            let result = write_truncated(&mut file, &bytes);
            (file, result)
        })
        .await?;
        self.file = Some(file);
        Ok(result?)
    }

    pub fn close(self) {
        drop(self)
    }
}

impl Drop for ExclusiveFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            // Best-effort unlock; closing the descriptor releases it anyway
            let _ = FileExt::unlock(&file);
        }
    }
}

fn write_truncated(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytes)?;
    file.sync_data()
}
