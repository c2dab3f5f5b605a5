//! # Component Manager
//!
//! Drives discovered descriptors through `ready → init → enter`.
//!
//! ## Batches
//!
//! Every `scan`/`update` call produces one batch: the descriptors created by
//! a single scanner pass. Within a batch each phase is a barrier: all
//! eligible descriptors start the phase together and the next phase starts
//! only after every one of them settled (success, failure or timeout).
//! Failures mark the descriptor and drop it from later phases; siblings are
//! unaffected. Batches never wait on each other.
//!
//! ## Re-entrancy
//!
//! Components call [`ComponentContext::update`](crate::ComponentContext::update)
//! after injecting markers. The scan is deferred by one scheduler tick, and
//! calls for the same root made before it runs share a single [`BatchHandle`].
//!
//! ## Execution
//!
//! Every batch is spawned as a local task when it is scheduled, so it runs
//! to completion whether or not its handle is awaited. A manager must
//! therefore be driven inside a [`tokio::task::LocalSet`]. With a phase
//! timeout configured, each phase also runs as its own local task: a phase
//! that misses the deadline is reported as failed and left running.
//!
//! ## Borrowing
//!
//! All state sits behind `RefCell`s that are only borrowed between
//! suspension points, never across an `.await`.

use crate::component::{Component, ComponentContext};
use crate::descriptor::{DescriptorTable, DescriptorView, PhaseHandle, PhaseOutcome};
use crate::registry::Registry;
use crate::scanner::{Discovery, Scanner};
use crate::{
    BatchId, ComponentError, ComponentId, ConfigDirective, DescriptorId, Document, ManagerConfig,
    NodeId, Phase, TesseraError,
};
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared, join_all};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::Instrument;

/// Shared handle to a scheduled batch.
///
/// Resolves once every descriptor of the batch settled its last phase.
pub type BatchHandle = Shared<LocalBoxFuture<'static, Rc<BatchReport>>>;

// =============================================================================
// BATCH REPORT
// =============================================================================

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Batch sequence number.
    pub batch: BatchId,
    /// Root of the scan.
    pub root: NodeId,
    /// Newly discovered components, in document order.
    pub discovered: Vec<ComponentId>,
    /// Components of this batch that completed `enter`.
    pub entered: Vec<ComponentId>,
    /// Scan errors followed by phase errors.
    pub errors: Vec<TesseraError>,
}

impl BatchReport {
    fn new(batch: BatchId, root: NodeId) -> Self {
        Self {
            batch,
            root,
            discovered: Vec::new(),
            entered: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Check if the batch finished without any error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// MANAGER
// =============================================================================

struct ManagerInner {
    document: Rc<RefCell<Document>>,
    registry: RefCell<Registry>,
    table: RefCell<DescriptorTable>,
    config: ManagerConfig,
    /// Scheduled batches whose scan has not started yet, by root.
    in_flight: RefCell<BTreeMap<NodeId, BatchHandle>>,
    next_batch: Cell<BatchId>,
}

/// The component scheduler.
///
/// Cheap to clone; clones share all state. `scan` and `update` spawn local
/// tasks and panic outside a [`tokio::task::LocalSet`].
#[derive(Clone)]
pub struct Manager {
    inner: Rc<ManagerInner>,
}

/// Non-owning manager handle held by component contexts.
#[derive(Clone, Default)]
pub struct WeakManager {
    inner: Weak<ManagerInner>,
}

impl WeakManager {
    /// Upgrade to a manager if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Manager> {
        self.inner.upgrade().map(|inner| Manager { inner })
    }

    /// Schedule an update through the manager.
    pub fn update(&self, root: Option<NodeId>) -> Result<BatchHandle, TesseraError> {
        self.upgrade()
            .map(|manager| manager.update(root))
            .ok_or(TesseraError::ManagerUnavailable)
    }
}

impl Manager {
    /// Create a manager that takes ownership of a document.
    #[must_use]
    pub fn new(document: Document, registry: Registry, config: ManagerConfig) -> Self {
        Self::with_shared_document(Rc::new(RefCell::new(document)), registry, config)
    }

    /// Create a manager over a document shared with the host.
    #[must_use]
    pub fn with_shared_document(
        document: Rc<RefCell<Document>>,
        registry: Registry,
        config: ManagerConfig,
    ) -> Self {
        let table = DescriptorTable::new(config.id_prefix.clone());
        Self {
            inner: Rc::new(ManagerInner {
                document,
                registry: RefCell::new(registry),
                table: RefCell::new(table),
                config,
                in_flight: RefCell::new(BTreeMap::new()),
                next_batch: Cell::new(BatchId::default()),
            }),
        }
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakManager {
        WeakManager {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The shared document.
    #[must_use]
    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.inner.document)
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Register a component after construction.
    ///
    /// Markers that failed with `UnknownComponent` earlier are picked up by
    /// the next `update` covering them.
    pub fn register<F, C>(
        &self,
        name: impl Into<String>,
        factory: F,
        static_config: Option<Vec<ConfigDirective>>,
    ) -> Result<(), TesseraError>
    where
        F: Fn() -> C + 'static,
        C: Component + 'static,
    {
        self.inner
            .registry
            .borrow_mut()
            .register(name, factory, static_config)
    }

    /// Registered component names in sorted order.
    #[must_use]
    pub fn registered_names(&self) -> Vec<String> {
        self.inner
            .registry
            .borrow()
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Initial pass over `root`.
    pub fn scan(&self, root: NodeId) -> BatchHandle {
        self.schedule(root)
    }

    /// Incremental pass over `root`, or over the whole document.
    ///
    /// Already registered nodes are skipped, so descriptors from earlier
    /// batches never run a phase again.
    pub fn update(&self, root: Option<NodeId>) -> BatchHandle {
        let root = root.unwrap_or_else(|| self.inner.document.borrow().root());
        self.schedule(root)
    }

    /// Snapshot of the descriptor bound to `node`.
    #[must_use]
    pub fn describe(&self, node: NodeId) -> Option<DescriptorView> {
        let table = self.inner.table.borrow();
        table.view(table.by_node(node)?)
    }

    /// Snapshots of every descriptor in discovery order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<DescriptorView> {
        let table = self.inner.table.borrow();
        table.iter().filter_map(|(key, _)| table.view(key)).collect()
    }

    /// Number of tracked descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.table.borrow().len()
    }

    /// Check if no descriptor is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.table.borrow().is_empty()
    }

    /// The in-flight phase of the component bound to `node`.
    ///
    /// Awaiting the handle observes the phase outcome without invoking the
    /// phase a second time.
    #[must_use]
    pub fn settled(&self, node: NodeId) -> Option<PhaseHandle> {
        let table = self.inner.table.borrow();
        let descriptor = table.get(table.by_node(node)?)?;
        descriptor.pending().map(|(_, handle)| handle.clone())
    }

    /// Drop descriptors whose node is no longer attached to the document.
    ///
    /// Descriptors with a phase in flight are kept. Each pruned component's
    /// `dispose` hook runs after the table is updated. Returns the pruned ids.
    pub fn prune(&self) -> Vec<ComponentId> {
        let document = self.inner.document.borrow();
        let doomed: Vec<DescriptorId> = self
            .inner
            .table
            .borrow()
            .iter()
            .filter(|(_, d)| d.pending().is_none() && !document.is_attached(d.node()))
            .map(|(key, _)| key)
            .collect();
        let removed: Vec<_> = {
            let mut table = self.inner.table.borrow_mut();
            table.retain_rejections(|node| document.is_attached(node));
            doomed
                .into_iter()
                .filter_map(|key| table.remove(key))
                .collect()
        };
        drop(document);
        removed
            .into_iter()
            .map(|descriptor| {
                descriptor.component().dispose();
                tracing::debug!(component = %descriptor.id(), "pruned detached component");
                descriptor.id().clone()
            })
            .collect()
    }

    // =========================================================================
    // SCHEDULING
    // =========================================================================

    fn schedule(&self, root: NodeId) -> BatchHandle {
        if let Some(handle) = self.inner.in_flight.borrow().get(&root) {
            tracing::debug!(%root, "coalescing update with pending scan");
            return handle.clone();
        }

        let batch = self.inner.next_batch.get();
        self.inner.next_batch.set(batch.next());

        let weak = Rc::downgrade(&self.inner);
        let span = tracing::info_span!("batch", id = batch.0, %root);
        let handle: BatchHandle = async move {
            // Defer the scan one tick so sibling calls can coalesce.
            tokio::task::yield_now().await;
            let Some(inner) = weak.upgrade() else {
                let mut report = BatchReport::new(batch, root);
                report.errors.push(TesseraError::ManagerUnavailable);
                return Rc::new(report);
            };
            let manager = Manager { inner };
            manager.inner.in_flight.borrow_mut().remove(&root);
            Rc::new(manager.run_batch(batch, root).await)
        }
        .instrument(span)
        .boxed_local()
        .shared();

        self.inner
            .in_flight
            .borrow_mut()
            .insert(root, handle.clone());
        tokio::task::spawn_local(handle.clone().map(drop));
        handle
    }

    async fn run_batch(&self, batch: BatchId, root: NodeId) -> BatchReport {
        let mut report = BatchReport::new(batch, root);
        let discovery = self.discover(root, batch);

        {
            let table = self.inner.table.borrow();
            report.discovered = discovery
                .descriptors
                .iter()
                .filter_map(|&key| table.get(key).map(|d| d.id().clone()))
                .collect();
        }
        report.errors.extend(discovery.errors);

        for phase in Phase::ALL {
            let outcomes = self.run_phase(&discovery.descriptors, phase).await;
            report
                .errors
                .extend(outcomes.into_iter().filter_map(Result::err));
        }

        {
            let table = self.inner.table.borrow();
            report.entered = discovery
                .descriptors
                .iter()
                .filter_map(|&key| table.get(key))
                .filter(|d| d.entered())
                .map(|d| d.id().clone())
                .collect();
        }

        tracing::info!(
            discovered = report.discovered.len(),
            entered = report.entered.len(),
            errors = report.errors.len(),
            "batch settled"
        );
        report
    }

    fn discover(&self, root: NodeId, batch: BatchId) -> Discovery {
        let document = self.inner.document.borrow();
        if !document.contains(root) {
            return Discovery {
                descriptors: Vec::new(),
                errors: vec![TesseraError::NodeNotFound(root)],
            };
        }
        let registry = self.inner.registry.borrow();
        let mut table = self.inner.table.borrow_mut();
        Scanner::new(
            &document,
            root,
            &registry,
            &mut table,
            &self.inner.config,
            batch,
        )
        .into_discovery()
    }

    /// Start `phase` on every eligible descriptor and wait for all of them.
    async fn run_phase(&self, batch: &[DescriptorId], phase: Phase) -> Vec<PhaseOutcome> {
        let mut invocations = Vec::with_capacity(batch.len());
        for &key in batch {
            let Some(handle) = self.begin_phase(key, phase) else {
                continue;
            };
            let manager = self.clone();
            invocations.push(async move {
                let outcome = handle.await;
                manager.settle_phase(key, phase, &outcome);
                outcome
            });
        }
        join_all(invocations).await
    }

    fn begin_phase(&self, key: DescriptorId, phase: Phase) -> Option<PhaseHandle> {
        let mut table = self.inner.table.borrow_mut();
        let descriptor = table.get(key)?;
        if !descriptor.is_eligible(phase) {
            return None;
        }

        let context = ComponentContext {
            id: descriptor.id().clone(),
            name: descriptor.name().to_string(),
            node: descriptor.node(),
            depth: descriptor.depth(),
            parent: descriptor
                .parent()
                .and_then(|parent| table.get(parent))
                .map(|parent| parent.id().clone()),
            static_config: Rc::clone(descriptor.static_config()),
            dynamic_config: Rc::clone(descriptor.dynamic_config()),
            document: Rc::clone(&self.inner.document),
            manager: self.downgrade(),
        };
        let component = Rc::clone(descriptor.component());
        let handle = invoke(component, context, phase, self.inner.config.phase_timeout())
            .boxed_local()
            .shared();

        let descriptor = table.get_mut(key)?;
        if let Err(err) = descriptor.begin(phase, handle.clone()) {
            tracing::warn!(error = %err, "refused to start phase");
            return None;
        }
        tracing::debug!(component = %descriptor.id(), %phase, "phase started");
        Some(handle)
    }

    fn settle_phase(&self, key: DescriptorId, phase: Phase, outcome: &PhaseOutcome) {
        let mut table = self.inner.table.borrow_mut();
        let Some(descriptor) = table.get_mut(key) else {
            return;
        };
        descriptor.settle(phase, outcome);
        match outcome {
            Ok(()) => tracing::debug!(component = %descriptor.id(), %phase, "phase settled"),
            Err(err) => tracing::warn!(component = %descriptor.id(), %phase, error = %err, "phase failed"),
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.inner.config)
            .field("descriptors", &self.inner.table.borrow().len())
            .field("next_batch", &self.inner.next_batch.get())
            .finish_non_exhaustive()
    }
}

/// Run one phase of one component, applying the timeout policy.
///
/// A timed-out phase is detached, not cancelled: its task keeps running and
/// its eventual result is discarded.
async fn invoke(
    component: Rc<dyn Component>,
    cx: ComponentContext,
    phase: Phase,
    timeout: Option<Duration>,
) -> PhaseOutcome {
    let id = cx.id.clone();
    let call = async move {
        match phase {
            Phase::Ready => component.ready(&cx).await,
            Phase::Init => component.init(&cx).await,
            Phase::Enter => component.enter(&cx).await,
        }
    };
    let result = match timeout {
        None => call.await,
        Some(limit) => {
            let task = tokio::task::spawn_local(call);
            match tokio::time::timeout(limit, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => Err(ComponentError::new(format!("phase task failed: {err}"))),
                Err(_) => {
                    tracing::warn!(component = %id, %phase, "phase missed its deadline, detaching");
                    return Err(TesseraError::PhaseTimeout {
                        id,
                        phase,
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            }
        }
    };
    result.map_err(|err| TesseraError::Lifecycle {
        id,
        phase,
        message: err.0,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::PhaseResult;
    use async_trait::async_trait;
    use std::future::Future;
    use tokio::task::LocalSet;

    async fn local<F: Future>(test: F) -> F::Output {
        LocalSet::new().run_until(test).await
    }

    #[derive(Default)]
    struct Counting {
        calls: Rc<Cell<usize>>,
    }

    #[async_trait(?Send)]
    impl Component for Counting {
        async fn ready(&self, _cx: &ComponentContext) -> PhaseResult {
            self.calls.set(self.calls.get() + 1);
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    /// Holds `ready` open until released.
    struct Gated {
        started: Rc<Cell<bool>>,
        released: Rc<Cell<bool>>,
    }

    #[async_trait(?Send)]
    impl Component for Gated {
        async fn ready(&self, _cx: &ComponentContext) -> PhaseResult {
            self.started.set(true);
            while !self.released.get() {
                tokio::task::yield_now().await;
            }
            Ok(())
        }
    }

    fn manager_with(html: &str, calls: &Rc<Cell<usize>>) -> Manager {
        let mut registry = Registry::new();
        let calls = Rc::clone(calls);
        registry
            .register(
                "count",
                move || Counting {
                    calls: Rc::clone(&calls),
                },
                None,
            )
            .expect("register");
        Manager::new(
            Document::parse_html(html),
            registry,
            ManagerConfig::default(),
        )
    }

    #[tokio::test]
    async fn concurrent_updates_for_same_root_coalesce() {
        local(async {
            let calls = Rc::new(Cell::new(0));
            let manager = manager_with(r#"<div data-component="count"></div>"#, &calls);

            let first = manager.update(None);
            let second = manager.update(None);
            let (a, b) = futures::join!(first, second);

            assert!(Rc::ptr_eq(&a, &b));
            assert_eq!(a.discovered.len(), 1);
            assert_eq!(calls.get(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn update_after_settle_starts_new_batch() {
        local(async {
            let calls = Rc::new(Cell::new(0));
            let manager = manager_with(r#"<div data-component="count"></div>"#, &calls);

            let first = manager.update(None).await;
            let second = manager.update(None).await;

            assert_ne!(first.batch, second.batch);
            assert!(second.discovered.is_empty());
            assert_eq!(calls.get(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn unawaited_batch_still_runs() {
        local(async {
            let calls = Rc::new(Cell::new(0));
            let manager = manager_with(r#"<div data-component="count" id="x"></div>"#, &calls);
            let node = manager
                .document()
                .borrow()
                .find_by_attribute("id", "x")
                .expect("node");

            drop(manager.update(None));
            for _ in 0..50 {
                if manager.describe(node).is_some_and(|view| view.entered) {
                    break;
                }
                tokio::task::yield_now().await;
            }

            assert!(manager.describe(node).expect("view").entered);
            assert_eq!(calls.get(), 1);
            assert!(manager.inner.in_flight.borrow().is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn settled_exposes_in_flight_phase() {
        local(async {
            let started = Rc::new(Cell::new(false));
            let released = Rc::new(Cell::new(false));
            let mut registry = Registry::new();
            let (s, r) = (Rc::clone(&started), Rc::clone(&released));
            registry
                .register(
                    "gate",
                    move || Gated {
                        started: Rc::clone(&s),
                        released: Rc::clone(&r),
                    },
                    None,
                )
                .expect("register");
            let manager = Manager::new(
                Document::parse_html(r#"<div data-component="gate" id="x"></div>"#),
                registry,
                ManagerConfig::default(),
            );
            let node = manager
                .document()
                .borrow()
                .find_by_attribute("id", "x")
                .expect("node");
            assert!(manager.settled(node).is_none());

            let batch = manager.update(None);
            while !started.get() {
                tokio::task::yield_now().await;
            }

            let handle = manager.settled(node).expect("ready should be in flight");
            released.set(true);
            assert_eq!(handle.await, Ok(()));
            assert!(batch.await.is_clean());
            assert!(manager.settled(node).is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn scan_of_missing_root_reports_error() {
        local(async {
            let calls = Rc::new(Cell::new(0));
            let manager = manager_with("<p></p>", &calls);

            let report = manager.scan(NodeId(9999)).await;

            assert_eq!(report.errors, vec![TesseraError::NodeNotFound(NodeId(9999))]);
        })
        .await;
    }

    #[tokio::test]
    async fn prune_removes_only_detached_descriptors() {
        local(async {
            let calls = Rc::new(Cell::new(0));
            let manager = manager_with(
                r#"<div data-component="count" id="keep"></div><div data-component="count" id="drop"></div>"#,
                &calls,
            );
            manager.update(None).await;
            assert_eq!(manager.len(), 2);

            let document = manager.document();
            let drop_node = document
                .borrow()
                .find_by_attribute("id", "drop")
                .expect("drop");
            document.borrow_mut().detach(drop_node).expect("detach");

            let pruned = manager.prune();

            assert_eq!(pruned, vec![ComponentId::new("cmp-1")]);
            assert_eq!(manager.len(), 1);
            assert!(manager.describe(drop_node).is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn weak_manager_reports_unavailable() {
        local(async {
            let calls = Rc::new(Cell::new(0));
            let manager = manager_with("<p></p>", &calls);
            let weak = manager.downgrade();
            let pending = weak.update(None).expect("manager alive");

            drop(manager);

            assert!(matches!(
                weak.update(None),
                Err(TesseraError::ManagerUnavailable)
            ));
            assert_eq!(pending.await.errors, vec![TesseraError::ManagerUnavailable]);
        })
        .await;
    }
}
