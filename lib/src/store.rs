//! The store facade: quad reads and writes over every backing file.
//!
//! Writes are routed to the file backing each quad's graph, applied to that
//! file's triples and handed to the [`WriteBackScheduler`]; the call returns
//! as soon as memory is updated. Reads run against memory only.

use crate::collection::TriplePattern;
use crate::config::StoreConfig;
use crate::errors::{Result, StoreError};
use crate::events::StoreEvent;
use crate::registry::{FileEntry, FileRegistry};
use crate::router::GraphRouter;
use crate::scheduler::WriteBackScheduler;
use crate::util::lock;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::{Stream, StreamExt};
use log::{debug, error, info, trace};
use oxigraph::model::{
    GraphName, GraphNameRef, NamedNodeRef, NamedOrBlankNodeRef, Quad, TermRef, Triple,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::broadcast;

type Loaded = std::result::Result<Arc<FileRegistry>, Arc<StoreError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Add,
    Delete,
}

impl Mutation {
    fn apply(self, entry: &FileEntry, triples: &[Triple]) -> Vec<Quad> {
        let graph_name = entry.graph_name();
        let mut collection = entry.triples();
        let mut applied = Vec::new();
        for triple in triples {
            let changed = match self {
                Mutation::Add => collection.insert(triple.as_ref()),
                Mutation::Delete => collection.remove(triple.as_ref()),
            };
            if changed {
                applied.push(triple.clone().in_graph(graph_name.clone()));
            }
        }
        applied
    }

    fn event(self, quad: Quad) -> StoreEvent {
        match self {
            Mutation::Add => StoreEvent::QuadAdded(quad),
            Mutation::Delete => StoreEvent::QuadRemoved(quad),
        }
    }
}

struct StoreInner {
    loaded: OnceLock<Loaded>,
    /// The initial load while it runs; dropped once `loaded` is set.
    loading: Mutex<Option<Shared<BoxFuture<'static, Loaded>>>>,
    scheduler: Arc<WriteBackScheduler>,
    events: broadcast::Sender<StoreEvent>,
}

/// A set of in-memory graphs, each mirrored to its own file.
///
/// Cloning is cheap and every clone addresses the same store.
///
/// ```no_run
/// use graphfiles::{Store, StoreConfig};
/// use oxigraph::model::{GraphName, NamedNode, Quad};
///
/// # async fn run() -> graphfiles::Result<()> {
/// let store = Store::open_ready(StoreConfig::single_file("/tmp/people.ttl")).await?;
/// let alice = NamedNode::new("http://example.org/alice").unwrap();
/// let knows = NamedNode::new("http://xmlns.com/foaf/0.1/knows").unwrap();
/// let bob = NamedNode::new("http://example.org/bob").unwrap();
/// store
///     .add([Quad::new(alice, knows, bob, GraphName::DefaultGraph)])
///     .await?;
/// store.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("ready", &self.is_ready())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl Store {
    /// Starts loading the configured files and returns right away. Every
    /// operation waits for the load to finish. Must be called from within a
    /// Tokio runtime.
    pub fn open(config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let scheduler = Arc::new(WriteBackScheduler::new(config.debounce(), events.clone()));
        let load = tokio::task::spawn_blocking(move || FileRegistry::load(&config));
        let loading = async move {
            let loaded = match load.await {
                Ok(loaded) => loaded,
                Err(e) => Err(StoreError::from(e)),
            };
            match loaded {
                Ok(registry) => {
                    info!("Store ready with {} graph files", registry.len());
                    Ok(Arc::new(registry))
                }
                Err(e) => {
                    error!("Failed to open store: {}", e);
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();
        Self {
            inner: Arc::new(StoreInner {
                loaded: OnceLock::new(),
                loading: Mutex::new(Some(loading)),
                scheduler,
                events,
            }),
        }
    }

    /// Opens the store and waits until it is ready.
    pub async fn open_ready(config: StoreConfig) -> Result<Self> {
        let store = Self::open(config);
        store.ready().await?;
        Ok(store)
    }

    /// Waits for the initial load. Fails with [`StoreError::Init`] if it failed.
    pub async fn ready(&self) -> Result<()> {
        self.registry().await.map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.inner.loaded.get(), Some(Ok(_)))
    }

    /// Receives change notifications and write-back outcomes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    async fn registry(&self) -> Result<Arc<FileRegistry>> {
        loop {
            if let Some(loaded) = self.inner.loaded.get() {
                return loaded.clone().map_err(StoreError::Init);
            }
            let loading = lock(&self.inner.loading).clone();
            if let Some(loading) = loading {
                let loaded = loading.await;
                let _ = self.inner.loaded.set(loaded);
                lock(&self.inner.loading).take();
            }
        }
    }

    /// The graph term of every backing file, in configuration order.
    pub async fn graphs(&self) -> Result<Vec<GraphName>> {
        let registry = self.registry().await?;
        Ok(registry.all().iter().map(|entry| entry.graph_name()).collect())
    }

    /// Number of quads in `graph`, or in every graph when `None`. A named graph
    /// no file backs is empty; a blank node graph is an error.
    pub async fn size(&self, graph: Option<GraphNameRef<'_>>) -> Result<usize> {
        let registry = self.registry().await?;
        let target = GraphRouter::new(&registry).read_target(graph)?;
        Ok(target.entries().iter().map(|entry| entry.len()).sum())
    }

    /// Returns the quads matching the pattern. `None` matches anything; with
    /// no graph every file is searched and each quad carries its file's
    /// graph term. A named graph no file backs has no quads.
    pub async fn quads_for_pattern(
        &self,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
        graph: Option<GraphNameRef<'_>>,
    ) -> Result<Vec<Quad>> {
        let registry = self.registry().await?;
        let pattern = TriplePattern::new(subject, predicate, object);
        let target = GraphRouter::new(&registry).read_target(graph)?;
        Ok(target
            .entries()
            .iter()
            .flat_map(|entry| entry.quads_matching(&pattern))
            .collect())
    }

    /// True if every quad is present in the file backing its graph. A quad
    /// whose graph no file backs makes the answer `false`.
    pub async fn contains(&self, quads: &[Quad]) -> Result<bool> {
        let registry = self.registry().await?;
        let router = GraphRouter::new(&registry);
        for quad in quads {
            let Ok(entry) = router.resolve(quad.graph_name.as_ref()) else {
                return Ok(false);
            };
            let triple = Triple::new(
                quad.subject.clone(),
                quad.predicate.clone(),
                quad.object.clone(),
            );
            if !entry.triples().contains(triple.as_ref()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Adds the quads and returns how many were not present yet.
    ///
    /// Every graph is resolved before anything is applied: one quad addressed
    /// to an unknown graph fails the whole call and nothing changes.
    pub async fn add(&self, quads: impl IntoIterator<Item = Quad>) -> Result<usize> {
        self.apply_batch(quads, Mutation::Add).await
    }

    /// Removes the quads and returns how many were present. Same all-or-nothing
    /// routing as [`Store::add`].
    pub async fn delete(&self, quads: impl IntoIterator<Item = Quad>) -> Result<usize> {
        self.apply_batch(quads, Mutation::Delete).await
    }

    /// Removes every quad matching the pattern. With no graph every file is
    /// searched; a graph no file backs is an error.
    pub async fn delete_matches(
        &self,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
        graph: Option<GraphNameRef<'_>>,
    ) -> Result<usize> {
        let registry = self.registry().await?;
        let pattern = TriplePattern::new(subject, predicate, object);
        let target = GraphRouter::new(&registry).target(graph)?;
        let batches = target
            .entries()
            .iter()
            .map(|entry| {
                let matched = entry.triples().matching(&pattern);
                (entry, matched)
            })
            .collect::<Vec<_>>();
        Ok(self.apply(batches, Mutation::Delete))
    }

    /// Adds quads as the stream yields them and returns how many were new.
    ///
    /// Each quad is applied and scheduled for write-back on its own. A quad
    /// addressed to an unknown graph ends the stream with an error; quads
    /// before it stay added.
    pub async fn add_stream<S>(&self, quads: S) -> Result<usize>
    where
        S: Stream<Item = Quad>,
    {
        self.apply_stream(quads, Mutation::Add).await
    }

    /// Streaming counterpart of [`Store::delete`], with the semantics of
    /// [`Store::add_stream`].
    pub async fn delete_stream<S>(&self, quads: S) -> Result<usize>
    where
        S: Stream<Item = Quad>,
    {
        self.apply_stream(quads, Mutation::Delete).await
    }

    /// Waits until every pending write-back has settled, written or failed.
    pub async fn flush_all(&self) {
        self.inner.scheduler.flush_all().await
    }

    /// Flushes pending write-backs, then drops this handle.
    pub async fn close(self) {
        self.flush_all().await;
        debug!("Store closed");
    }

    /// Number of files whose write-back is still pending.
    pub fn pending_writes(&self) -> usize {
        self.inner.scheduler.pending_writes()
    }

    /// Whether the file backing `graph` has a write-back pending.
    pub async fn is_pending(&self, graph: GraphNameRef<'_>) -> Result<bool> {
        let registry = self.registry().await?;
        let entry = GraphRouter::new(&registry).resolve(graph)?;
        Ok(self.inner.scheduler.is_pending(entry.id()))
    }

    async fn apply_batch(
        &self,
        quads: impl IntoIterator<Item = Quad>,
        mutation: Mutation,
    ) -> Result<usize> {
        let registry = self.registry().await?;
        let router = GraphRouter::new(&registry);
        let mut batches: Vec<(&Arc<FileEntry>, Vec<Triple>)> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for quad in quads {
            let entry = router.resolve(quad.graph_name.as_ref())?;
            let position = *positions.entry(entry.id()).or_insert_with(|| {
                batches.push((entry, Vec::new()));
                batches.len() - 1
            });
            batches[position]
                .1
                .push(Triple::new(quad.subject, quad.predicate, quad.object));
        }
        Ok(self.apply(batches, mutation))
    }

    async fn apply_stream<S>(&self, quads: S, mutation: Mutation) -> Result<usize>
    where
        S: Stream<Item = Quad>,
    {
        let registry = self.registry().await?;
        let mut quads = std::pin::pin!(quads);
        let mut changed = 0;
        while let Some(quad) = quads.next().await {
            let entry = GraphRouter::new(&registry).resolve(quad.graph_name.as_ref())?;
            let triple = Triple::new(quad.subject, quad.predicate, quad.object);
            changed += self.apply(vec![(entry, vec![triple])], mutation);
        }
        Ok(changed)
    }

    /// Applies each file's triples, schedules one write-back per changed file
    /// and publishes one event per changed quad, in order.
    fn apply(&self, batches: Vec<(&Arc<FileEntry>, Vec<Triple>)>, mutation: Mutation) -> usize {
        let mut changed = 0;
        for (entry, triples) in batches {
            let applied = mutation.apply(entry, &triples);
            trace!(
                "{:?}: {} of {} triples changed in {}",
                mutation,
                applied.len(),
                triples.len(),
                entry.id()
            );
            if applied.is_empty() {
                continue;
            }
            changed += applied.len();
            self.inner.scheduler.notify_mutated(entry);
            for quad in applied {
                let _ = self.inner.events.send(mutation.event(quad));
            }
        }
        changed
    }
}
