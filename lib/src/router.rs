//! Maps graph terms onto registered files.
//!
//! Writes are strict: a graph must be backed by a registered file. Reads are
//! lenient about named graphs only: one nobody ever wrote simply has no quads.

use crate::errors::{Result, StoreError};
use crate::registry::{FileEntry, FileRegistry};
use log::warn;
use oxigraph::model::GraphNameRef;
use std::sync::Arc;

/// The files an operation touches.
#[derive(Debug, Clone, Copy)]
pub enum GraphTarget<'a> {
    /// No graph term was given: every file.
    All(&'a [Arc<FileEntry>]),
    One(&'a Arc<FileEntry>),
    /// The graph is not backed by any file (reads only).
    Nothing,
}

impl<'a> GraphTarget<'a> {
    pub fn entries(&self) -> &'a [Arc<FileEntry>] {
        match *self {
            GraphTarget::All(entries) => entries,
            GraphTarget::One(entry) => std::slice::from_ref(entry),
            GraphTarget::Nothing => &[],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphRouter<'a> {
    registry: &'a FileRegistry,
}

impl<'a> GraphRouter<'a> {
    pub fn new(registry: &'a FileRegistry) -> Self {
        Self { registry }
    }

    /// Resolves a graph term to the file backing it.
    ///
    /// The default graph sentinel is checked before any id lookup, so it always
    /// means the default file even if some id spells like a reserved name.
    pub fn resolve(&self, graph: GraphNameRef<'_>) -> Result<&'a Arc<FileEntry>> {
        match graph {
            GraphNameRef::DefaultGraph => Ok(self.registry.default_entry()),
            GraphNameRef::NamedNode(name) => {
                let entry = self
                    .registry
                    .lookup(name.as_str())
                    .ok_or_else(|| StoreError::UnknownGraph(name.as_str().to_string()))?;
                if entry.is_default() {
                    warn!(
                        "Graph <{}> names the default graph file; its quads are tagged as the default graph",
                        name.as_str()
                    );
                }
                Ok(entry)
            }
            GraphNameRef::BlankNode(node) => Err(StoreError::InvalidGraphTerm(node.to_string())),
        }
    }

    /// Target of a mutating operation: `None` means every file, anything else
    /// must resolve.
    pub fn target(&self, graph: Option<GraphNameRef<'_>>) -> Result<GraphTarget<'a>> {
        match graph {
            None => Ok(GraphTarget::All(self.registry.all())),
            Some(graph) => self.resolve(graph).map(GraphTarget::One),
        }
    }

    /// Target of a read: like [`GraphRouter::target`] but a named graph that no
    /// file backs yields [`GraphTarget::Nothing`] instead of an error. Other
    /// term shapes are still rejected.
    pub fn read_target(&self, graph: Option<GraphNameRef<'_>>) -> Result<GraphTarget<'a>> {
        match self.target(graph) {
            Err(StoreError::UnknownGraph(_)) => Ok(GraphTarget::Nothing),
            target => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{BlankNode, Graph, NamedNode};
    use oxigraph::io::RdfFormat;

    fn registry() -> FileRegistry {
        let entry = |id: &str| FileEntry::new(id, "/tmp/g.ttl", RdfFormat::Turtle, Box::new(Graph::new()));
        FileRegistry::new(
            vec![
                entry("default"),
                entry("http://example.org/a"),
                entry("http://example.org/b"),
            ],
            "default",
        )
        .unwrap()
    }

    #[test]
    fn test_resolve() {
        let registry = registry();
        let router = GraphRouter::new(&registry);

        let default = router.resolve(GraphNameRef::DefaultGraph).unwrap();
        assert!(default.is_default());

        let a = NamedNode::new("http://example.org/a").unwrap();
        assert_eq!(router.resolve(a.as_ref().into()).unwrap().id(), "http://example.org/a");

        let unknown = NamedNode::new("urn:nonexistent").unwrap();
        assert!(matches!(
            router.resolve(unknown.as_ref().into()),
            Err(StoreError::UnknownGraph(id)) if id == "urn:nonexistent"
        ));

        let blank = BlankNode::default();
        assert!(matches!(
            router.resolve(blank.as_ref().into()),
            Err(StoreError::InvalidGraphTerm(_))
        ));
    }

    #[test]
    fn test_wildcard_is_not_the_default_graph() {
        let registry = registry();
        let router = GraphRouter::new(&registry);

        assert_eq!(router.target(None).unwrap().entries().len(), 3);
        let default = router.target(Some(GraphNameRef::DefaultGraph)).unwrap();
        assert_eq!(default.entries().len(), 1);
        assert!(default.entries()[0].is_default());
    }

    #[test]
    fn test_reads_are_lenient() {
        let registry = registry();
        let router = GraphRouter::new(&registry);
        let unknown = NamedNode::new("urn:nonexistent").unwrap();

        assert!(router.target(Some(unknown.as_ref().into())).is_err());
        assert!(router
            .read_target(Some(unknown.as_ref().into()))
            .unwrap()
            .entries()
            .is_empty());
        assert_eq!(router.read_target(None).unwrap().entries().len(), 3);
    }

    #[test]
    fn test_reads_still_reject_blank_node_graphs() {
        let registry = registry();
        let router = GraphRouter::new(&registry);
        let blank = BlankNode::default();
        assert!(matches!(
            router.read_target(Some(blank.as_ref().into())),
            Err(StoreError::InvalidGraphTerm(_))
        ));
    }

    #[test]
    fn test_default_file_id_resolves_to_default_entry() {
        let registry = FileRegistry::new(
            vec![FileEntry::new(
                "http://example.org/main",
                "/tmp/main.ttl",
                RdfFormat::Turtle,
                Box::new(Graph::new()),
            )],
            "http://example.org/main",
        )
        .unwrap();
        let router = GraphRouter::new(&registry);
        let main = NamedNode::new("http://example.org/main").unwrap();

        let by_id = router.resolve(main.as_ref().into()).unwrap();
        let by_sentinel = router.resolve(GraphNameRef::DefaultGraph).unwrap();
        assert!(Arc::ptr_eq(by_id, by_sentinel));
        assert_eq!(by_id.graph_name(), oxigraph::model::GraphName::DefaultGraph);
    }
}
