//! Deferred results
//!
//! A [`DeferredResult`] is a single-assignment future: it settles exactly once,
//! either with a JSON value or with an error. Nodes form a DAG:
//!
//! ```text
//! Read-0 posts ──▶ distinct('owner') ──▶ ReadByReference-1 (batched lookup)
//!      │                                          │
//!      └──────────▶ replaceReferences('owner', ◀──┘)
//! ```
//!
//! - *Operation* nodes are settled by the operation that owns them once the
//!   executor answers.
//! - *Static* nodes are settled at construction.
//! - *Derived* nodes hold their source node and a [`Transform`]. Each node
//!   keeps weak handles to the nodes derived from it; settling it settles
//!   every dependent whose inputs are now all settled, and so on down the
//!   graph. Awaiting a derived node early drives it as well. Whoever claims
//!   the node first computes it, so a derived node is computed at most once.
//!
//! Settling a node twice is reported as [`GraphexError::AlreadySettled`],
//! even when both values are equal.

mod transform;

pub use transform::{LookupProvider, MapFn, Transform, WILDCARD};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{OnceCell, watch};

use crate::core::error::{GraphexError, Result};
use crate::core::predicate::Predicate;

type Outcome = Result<Value>;

/// Where the value of a node comes from
#[derive(Debug)]
enum Origin {
    /// Settled by the operation with this identifier
    Operation(String),
    /// Settled at construction
    Static,
    /// Computed from another node
    Derived {
        source: DeferredResult,
        transform: Transform,
    },
}

struct Node {
    origin: Origin,
    state: watch::Sender<Option<Outcome>>,
    /// Claimed by whoever computes a derived node
    driver: OnceCell<()>,
    dependents: Mutex<Vec<Weak<Node>>>,
}

/// Handle to one node of the deferred-result graph
///
/// Cloning the handle shares the node; it does not copy it.
#[derive(Clone)]
pub struct DeferredResult {
    inner: Arc<Node>,
}

impl DeferredResult {
    fn with_origin(origin: Origin) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(Node {
                origin,
                state,
                driver: OnceCell::new(),
                dependents: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Unsettled node owned by an operation
    pub fn for_operation(identifier: impl Into<String>) -> Self {
        Self::with_origin(Origin::Operation(identifier.into()))
    }

    /// Node already settled with a constant
    pub fn from_value(value: Value) -> Self {
        let node = Self::with_origin(Origin::Static);
        node.inner.state.send_replace(Some(Ok(value)));
        node
    }

    fn derive(&self, transform: Transform) -> Self {
        let node = Self::with_origin(Origin::Derived {
            source: self.clone(),
            transform,
        });
        self.add_dependent(&node);
        node.drive_settled_inputs();
        node
    }

    fn dependents(&self) -> MutexGuard<'_, Vec<Weak<Node>>> {
        self.inner
            .dependents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_dependent(&self, dependent: &DeferredResult) {
        self.dependents().push(Arc::downgrade(&dependent.inner));
    }

    fn notify_dependents(&self) {
        let dependents = std::mem::take(&mut *self.dependents());
        for dependent in dependents.iter().filter_map(Weak::upgrade) {
            DeferredResult { inner: dependent }.drive_settled_inputs();
        }
    }

    /// Settle a derived node now if every input has settled
    ///
    /// Otherwise the node waits on the missing input and is driven again
    /// when that input settles.
    fn drive_settled_inputs(&self) {
        let Origin::Derived { source, transform } = &self.inner.origin else {
            return;
        };
        if self.is_settled() {
            return;
        }
        let value = match source.try_outcome() {
            None => return,
            Some(Err(err)) => return self.settle_once(|| Err(err)),
            Some(Ok(value)) => value,
        };
        let lookup_map = match transform.lookup() {
            None => None,
            Some(lookup) => match lookup.try_outcome() {
                Some(Ok(lookup_map)) => Some(lookup_map),
                Some(Err(err)) => return self.settle_once(|| Err(err)),
                None => {
                    lookup.add_dependent(self);
                    // The lookup may have settled before the registration
                    if lookup.is_settled() {
                        self.drive_settled_inputs();
                    }
                    return;
                }
            },
        };
        self.settle_once(|| transform.apply_settled(value, lookup_map.as_ref()));
    }

    fn settle_once(&self, compute: impl FnOnce() -> Outcome) {
        if self.inner.driver.set(()).is_ok() {
            // Only fails if someone settled the node by hand first
            let _ = self.settle(compute());
        }
    }

    /// Settle with a value
    pub fn resolve(&self, value: Value) -> Result<()> {
        self.settle(Ok(value))
    }

    /// Settle with an error
    pub fn reject(&self, error: GraphexError) -> Result<()> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Outcome) -> Result<()> {
        let ok = outcome.is_ok();
        let updated = self.inner.state.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = Some(outcome);
                true
            }
        });

        if updated {
            tracing::trace!(provenance = %self.provenance(), ok, "deferred result settled");
            self.notify_dependents();
            Ok(())
        } else {
            let provenance = self.provenance();
            tracing::warn!(provenance = %provenance, "deferred result settled twice");
            Err(GraphexError::AlreadySettled { provenance })
        }
    }

    /// Whether this node has settled already
    pub fn is_settled(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Outcome if the node has settled, without waiting
    pub fn try_outcome(&self) -> Option<Result<Value>> {
        self.inner.state.borrow().clone()
    }

    /// Wait for this node to settle
    ///
    /// For derived nodes this drives the computation: the source is awaited,
    /// the transform applied, and the node settled with the result. A
    /// rejected source rejects the derived node with the same error.
    pub fn settled(&self) -> BoxFuture<'_, Result<Value>> {
        async move {
            if let Origin::Derived { source, transform } = &self.inner.origin {
                self.inner
                    .driver
                    .get_or_init(|| async {
                        let outcome = match source.settled().await {
                            Ok(value) => transform.apply(value).await,
                            Err(err) => Err(err),
                        };
                        // Only fails if someone settled the node by hand first
                        let _ = self.settle(outcome);
                    })
                    .await;
            }
            self.wait().await
        }
        .boxed()
    }

    async fn wait(&self) -> Result<Value> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| GraphexError::Unsettled {
                provenance: self.provenance(),
            })?;

        match state.as_ref() {
            Some(outcome) => outcome.clone(),
            None => Err(GraphexError::Unsettled {
                provenance: self.provenance(),
            }),
        }
    }

    /// Node this one was derived from, if any
    pub fn source(&self) -> Option<&DeferredResult> {
        match &self.inner.origin {
            Origin::Derived { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether both handles point at the same node
    pub fn same_node(&self, other: &DeferredResult) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Human-readable chain of where this value comes from
    pub fn provenance(&self) -> String {
        match &self.inner.origin {
            Origin::Operation(identifier) => identifier.clone(),
            Origin::Static => "Static Data".to_string(),
            Origin::Derived { source, transform } => {
                format!("{} -> {}", source.provenance(), transform.describe())
            }
        }
    }

    // === Combinators ===

    /// Turn raw ids into references to `namespace`
    ///
    /// Arrays map item by item; `null` passes through.
    pub fn as_reference(&self, namespace: impl Into<String>) -> Self {
        self.derive(Transform::AsReference {
            namespace: namespace.into(),
        })
    }

    /// Replace references found at `path` with the documents they point to
    ///
    /// `lookup` is called lazily, once, when this node's source settles or
    /// the node is first awaited. The node it returns must settle with a
    /// namespace → id → document map. References missing from the map are
    /// left untouched.
    pub fn replace_references<F>(&self, path: impl Into<String>, lookup: F) -> Self
    where
        F: Fn() -> DeferredResult + Send + Sync + 'static,
    {
        self.derive(Transform::replace_references(path.into(), Arc::new(lookup)))
    }

    /// Filter the array embedded at `path` with a predicate specification
    ///
    /// The specification is compiled immediately; a malformed one is a
    /// build-time error.
    pub fn filter_embedded_array(&self, path: impl Into<String>, spec: Value) -> Result<Self> {
        let predicate = Predicate::compile(&spec)?;
        Ok(self.derive(Transform::FilterEmbeddedArray {
            path: path.into(),
            spec,
            predicate,
        }))
    }

    /// Every distinct value found at `path`, descending through arrays
    pub fn distinct(&self, path: impl Into<String>) -> Self {
        self.derive(Transform::Distinct { path: path.into() })
    }

    /// Arbitrary computation over the settled value
    pub fn map<F>(&self, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.derive(Transform::Map {
            description: description.into(),
            f: Arc::new(f),
        })
    }
}

impl fmt::Debug for DeferredResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeferredResult {{ {} }}", self.provenance())
    }
}

impl IntoFuture for DeferredResult {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.settled().await }.boxed()
    }
}
