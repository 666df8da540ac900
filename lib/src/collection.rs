//! The capability a backing file needs from its in-memory triples.
//!
//! The registry, router and scheduler only ever talk to a [`TripleCollection`];
//! how the triples are stored and indexed is left to the implementation. The
//! stock implementation is Oxigraph's in-memory [`Graph`].

use oxigraph::model::{
    Graph, NamedNode, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef, Term, TermRef, Triple,
    TripleRef,
};

/// A mutable, de-duplicating set of triples.
pub trait TripleCollection: Send {
    /// Inserts a triple. Returns `false` if it was already present.
    fn insert(&mut self, triple: TripleRef<'_>) -> bool;

    /// Removes a triple. Returns `false` if it was absent.
    fn remove(&mut self, triple: TripleRef<'_>) -> bool;

    fn contains(&self, triple: TripleRef<'_>) -> bool;

    /// Returns the triples matching `pattern`, owned so no borrow outlives the call.
    fn matching(&self, pattern: &TriplePattern) -> Vec<Triple>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every triple; used to serialize the collection.
    fn iter(&self) -> Box<dyn Iterator<Item = TripleRef<'_>> + '_>;
}

/// A triple pattern where `None` matches any term in that position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Option<NamedOrBlankNode>,
    pub predicate: Option<NamedNode>,
    pub object: Option<Term>,
}

impl TriplePattern {
    pub fn new(
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> Self {
        Self {
            subject: subject.map(NamedOrBlankNodeRef::into_owned),
            predicate: predicate.map(NamedNodeRef::into_owned),
            object: object.map(TermRef::into_owned),
        }
    }

    pub fn matches(&self, triple: TripleRef<'_>) -> bool {
        self.subject
            .as_ref()
            .map_or(true, |s| s.as_ref() == triple.subject)
            && self
                .predicate
                .as_ref()
                .map_or(true, |p| p.as_ref() == triple.predicate)
            && self
                .object
                .as_ref()
                .map_or(true, |o| o.as_ref() == triple.object)
    }
}

impl TripleCollection for Graph {
    fn insert(&mut self, triple: TripleRef<'_>) -> bool {
        Graph::insert(self, triple)
    }

    fn remove(&mut self, triple: TripleRef<'_>) -> bool {
        Graph::remove(self, triple)
    }

    fn contains(&self, triple: TripleRef<'_>) -> bool {
        Graph::contains(self, triple)
    }

    fn matching(&self, pattern: &TriplePattern) -> Vec<Triple> {
        // start from the most selective index the pattern allows, then filter
        let candidates: Box<dyn Iterator<Item = TripleRef<'_>> + '_> =
            if let Some(subject) = &pattern.subject {
                Box::new(self.triples_for_subject(subject.as_ref()))
            } else if let Some(object) = &pattern.object {
                Box::new(self.triples_for_object(object.as_ref()))
            } else if let Some(predicate) = &pattern.predicate {
                Box::new(self.triples_for_predicate(predicate.as_ref()))
            } else {
                Box::new(Graph::iter(self))
            };
        candidates
            .filter(|triple| pattern.matches(*triple))
            .map(TripleRef::into_owned)
            .collect()
    }

    fn len(&self) -> usize {
        Graph::len(self)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TripleRef<'_>> + '_> {
        Box::new(Graph::iter(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::Literal;

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    fn sample() -> Graph {
        let mut graph = Graph::new();
        let alice = node("http://example.org/alice");
        let bob = node("http://example.org/bob");
        let knows = node("http://xmlns.com/foaf/0.1/knows");
        let name = node("http://xmlns.com/foaf/0.1/name");
        graph.insert(TripleRef::new(&alice, &knows, &bob));
        graph.insert(TripleRef::new(&bob, &knows, &alice));
        graph.insert(TripleRef::new(&alice, &name, &Literal::new_simple_literal("Alice")));
        graph
    }

    #[test]
    fn test_insert_and_remove_report_membership_changes() {
        let mut graph: Box<dyn TripleCollection> = Box::new(Graph::new());
        let s = node("http://example.org/s");
        let p = node("http://example.org/p");
        let o = node("http://example.org/o");
        let triple = TripleRef::new(&s, &p, &o);

        assert!(graph.insert(triple));
        assert!(!graph.insert(triple));
        assert!(graph.contains(triple));
        assert_eq!(graph.len(), 1);
        assert!(graph.remove(triple));
        assert!(!graph.remove(triple));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_matching_by_position() {
        let graph = sample();
        let alice = node("http://example.org/alice");
        let knows = node("http://xmlns.com/foaf/0.1/knows");

        assert_eq!(graph.matching(&TriplePattern::default()).len(), 3);

        let by_subject = TriplePattern::new(Some(alice.as_ref().into()), None, None);
        assert_eq!(graph.matching(&by_subject).len(), 2);

        let by_predicate = TriplePattern::new(None, Some(knows.as_ref()), None);
        assert_eq!(graph.matching(&by_predicate).len(), 2);

        let by_object = TriplePattern::new(None, None, Some(alice.as_ref().into()));
        let found = graph.matching(&by_object);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].subject,
            NamedOrBlankNode::from(node("http://example.org/bob"))
        );

        let subject_and_predicate =
            TriplePattern::new(Some(alice.as_ref().into()), Some(knows.as_ref()), None);
        assert_eq!(graph.matching(&subject_and_predicate).len(), 1);
    }

    #[test]
    fn test_matching_nothing() {
        let graph = sample();
        let missing = node("http://example.org/nobody");
        let pattern = TriplePattern::new(Some(missing.as_ref().into()), None, None);
        assert!(graph.matching(&pattern).is_empty());
    }
}
