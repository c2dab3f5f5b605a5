//! # Instance Descriptors
//!
//! Bookkeeping for every discovered component instance.
//!
//! Descriptors live in an arena ([`DescriptorTable`]) keyed by
//! [`DescriptorId`], with a `NodeId → DescriptorId` index that doubles as the
//! dedup set for scanning. Parent links and bound nodes are keys, never
//! owning references.
//!
//! ## Invariants
//!
//! - At most one descriptor per node
//! - `ready_done`, `init_done`, `entered` only ever go false → true
//! - `init_done` implies `ready_done`, `entered` implies `init_done`
//! - At most one phase in flight per descriptor

use crate::component::Component;
use crate::{
    BatchId, ComponentId, ConfigDirective, ConfigMap, DescriptorId, NodeId, Phase, TesseraError,
};
use futures::future::{LocalBoxFuture, Shared};
use serde::Serialize;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Outcome of one phase invocation, as recorded by the scheduler.
pub type PhaseOutcome = Result<(), TesseraError>;

/// Shared handle to an in-flight phase.
///
/// Cloning it never re-invokes the phase; every clone observes the same outcome.
pub type PhaseHandle = Shared<LocalBoxFuture<'static, PhaseOutcome>>;

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Everything needed to create a descriptor. Produced by the scanner.
pub struct DescriptorSeed {
    /// Registry name.
    pub name: String,
    /// Bound marker node.
    pub node: NodeId,
    /// The freshly constructed component.
    pub component: Rc<dyn Component>,
    /// Nearest ancestor descriptor.
    pub parent: Option<DescriptorId>,
    /// Nesting depth.
    pub depth: usize,
    /// Registry directives.
    pub static_config: Rc<[ConfigDirective]>,
    /// Parsed node configuration.
    pub dynamic_config: ConfigMap,
    /// Discovery batch.
    pub batch: BatchId,
}

/// One component instance and its lifecycle state.
pub struct Descriptor {
    id: ComponentId,
    name: String,
    node: NodeId,
    component: Rc<dyn Component>,
    ready_done: bool,
    init_done: bool,
    entered: bool,
    failed: Option<Phase>,
    pending: Option<(Phase, PhaseHandle)>,
    parent: Option<DescriptorId>,
    depth: usize,
    static_config: Rc<[ConfigDirective]>,
    dynamic_config: Rc<ConfigMap>,
    batch: BatchId,
}

impl Descriptor {
    /// The component id.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// The registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound node.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The component instance.
    #[must_use]
    pub fn component(&self) -> &Rc<dyn Component> {
        &self.component
    }

    /// Whether `ready` settled successfully.
    #[must_use]
    pub fn ready_done(&self) -> bool {
        self.ready_done
    }

    /// Whether `init` settled successfully.
    #[must_use]
    pub fn init_done(&self) -> bool {
        self.init_done
    }

    /// Whether `enter` settled successfully.
    #[must_use]
    pub fn entered(&self) -> bool {
        self.entered
    }

    /// The phase that failed, if any.
    #[must_use]
    pub fn failed(&self) -> Option<Phase> {
        self.failed
    }

    /// The phase in flight and its shared handle.
    #[must_use]
    pub fn pending(&self) -> Option<&(Phase, PhaseHandle)> {
        self.pending.as_ref()
    }

    /// Nearest ancestor descriptor.
    #[must_use]
    pub fn parent(&self) -> Option<DescriptorId> {
        self.parent
    }

    /// Nesting depth, fixed at discovery.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Registry directives.
    #[must_use]
    pub fn static_config(&self) -> &Rc<[ConfigDirective]> {
        &self.static_config
    }

    /// Parsed node configuration.
    #[must_use]
    pub fn dynamic_config(&self) -> &Rc<ConfigMap> {
        &self.dynamic_config
    }

    /// The batch that discovered this descriptor.
    #[must_use]
    pub fn batch(&self) -> BatchId {
        self.batch
    }

    /// Check whether `phase` may start now.
    ///
    /// A phase is eligible when nothing is in flight, nothing failed, the
    /// phase itself is not done, and the previous phase is.
    #[must_use]
    pub fn is_eligible(&self, phase: Phase) -> bool {
        if self.pending.is_some() || self.failed.is_some() {
            return false;
        }
        match phase {
            Phase::Ready => !self.ready_done,
            Phase::Init => self.ready_done && !self.init_done,
            Phase::Enter => self.init_done && !self.entered,
        }
    }

    /// Record the start of a phase.
    ///
    /// Fails if the phase is not eligible, which also rules out a second
    /// in-flight phase.
    pub(crate) fn begin(&mut self, phase: Phase, handle: PhaseHandle) -> Result<(), TesseraError> {
        if !self.is_eligible(phase) {
            return Err(TesseraError::Lifecycle {
                id: self.id.clone(),
                phase,
                message: "phase is not eligible to start".to_string(),
            });
        }
        self.pending = Some((phase, handle));
        Ok(())
    }

    /// Record the settlement of the in-flight phase and clear the handle.
    ///
    /// Returns false if `phase` was not the one in flight.
    pub(crate) fn settle(&mut self, phase: Phase, outcome: &PhaseOutcome) -> bool {
        match self.pending.take() {
            Some((in_flight, _)) if in_flight == phase => {}
            other => {
                self.pending = other;
                return false;
            }
        }
        match (outcome, phase) {
            (Err(_), _) => self.failed = Some(phase),
            (Ok(()), Phase::Ready) => self.ready_done = true,
            (Ok(()), Phase::Init) => self.init_done = self.ready_done,
            (Ok(()), Phase::Enter) => self.entered = self.init_done,
        }
        true
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("node", &self.node)
            .field("ready_done", &self.ready_done)
            .field("init_done", &self.init_done)
            .field("entered", &self.entered)
            .field("failed", &self.failed)
            .field("pending", &self.pending.as_ref().map(|(phase, _)| *phase))
            .field("parent", &self.parent)
            .field("depth", &self.depth)
            .finish()
    }
}

// =============================================================================
// READ-ONLY VIEW
// =============================================================================

/// Serializable snapshot of a descriptor, returned by `Manager::describe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorView {
    /// Component id.
    pub id: ComponentId,
    /// Registry name.
    pub name: String,
    /// Bound node.
    pub node: NodeId,
    /// Nesting depth.
    pub depth: usize,
    /// Id of the nearest ancestor component.
    pub parent: Option<ComponentId>,
    /// `ready` settled successfully.
    pub ready_done: bool,
    /// `init` settled successfully.
    pub init_done: bool,
    /// `enter` settled successfully.
    pub entered: bool,
    /// Phase that failed.
    pub failed: Option<Phase>,
    /// Phase in flight.
    pub pending: Option<Phase>,
    /// Discovery batch.
    pub batch: BatchId,
    /// Registry directives.
    pub static_config: Vec<ConfigDirective>,
    /// Parsed node configuration.
    pub dynamic_config: ConfigMap,
}

// =============================================================================
// TABLE
// =============================================================================

/// Arena of descriptors with a node index.
#[derive(Debug)]
pub struct DescriptorTable {
    /// Descriptor storage: DescriptorId -> Descriptor
    descriptors: BTreeMap<DescriptorId, Descriptor>,

    /// Dedup index: NodeId -> DescriptorId
    node_index: BTreeMap<NodeId, DescriptorId>,

    /// Config payloads that failed to parse: NodeId -> raw payload
    rejected: BTreeMap<NodeId, String>,

    /// Next id; shared by the arena key and the public component id.
    next_id: u64,

    /// Prefix of generated component ids.
    id_prefix: String,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new(crate::primitives::ID_PREFIX)
    }
}

impl DescriptorTable {
    /// Create an empty table generating ids with `id_prefix`.
    #[must_use]
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            descriptors: BTreeMap::new(),
            node_index: BTreeMap::new(),
            rejected: BTreeMap::new(),
            next_id: 0,
            id_prefix: id_prefix.into(),
        }
    }

    /// Insert a descriptor for a node not yet in the table.
    ///
    /// Returns the existing id unchanged if the node is already registered.
    pub fn insert(&mut self, seed: DescriptorSeed) -> DescriptorId {
        if let Some(&existing) = self.node_index.get(&seed.node) {
            return existing;
        }
        let key = DescriptorId(self.next_id);
        let id = ComponentId(format!("{}{}", self.id_prefix, self.next_id));
        self.next_id = self.next_id.saturating_add(1);

        self.node_index.insert(seed.node, key);
        self.rejected.remove(&seed.node);
        self.descriptors.insert(
            key,
            Descriptor {
                id,
                name: seed.name,
                node: seed.node,
                component: seed.component,
                ready_done: false,
                init_done: false,
                entered: false,
                failed: None,
                pending: None,
                parent: seed.parent,
                depth: seed.depth,
                static_config: seed.static_config,
                dynamic_config: Rc::new(seed.dynamic_config),
                batch: seed.batch,
            },
        );
        key
    }

    /// Look up a descriptor.
    #[must_use]
    pub fn get(&self, key: DescriptorId) -> Option<&Descriptor> {
        self.descriptors.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: DescriptorId) -> Option<&mut Descriptor> {
        self.descriptors.get_mut(&key)
    }

    /// The descriptor bound to a node.
    #[must_use]
    pub fn by_node(&self, node: NodeId) -> Option<DescriptorId> {
        self.node_index.get(&node).copied()
    }

    /// Check if a node already has a descriptor.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.node_index.contains_key(&node)
    }

    /// Remember that `payload` on `node` failed to parse.
    pub fn reject(&mut self, node: NodeId, payload: &str) {
        self.rejected.insert(node, payload.to_string());
    }

    /// Check if `payload` is the one already rejected for `node`.
    ///
    /// A changed payload is not rejected, so it gets parsed again.
    #[must_use]
    pub fn is_rejected(&self, node: NodeId, payload: Option<&str>) -> bool {
        self.rejected
            .get(&node)
            .is_some_and(|raw| Some(raw.as_str()) == payload)
    }

    /// Forget rejections for nodes that fail `keep`.
    pub fn retain_rejections(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.rejected.retain(|&node, _| keep(node));
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (DescriptorId, &Descriptor)> {
        self.descriptors.iter().map(|(key, d)| (*key, d))
    }

    /// Remove a descriptor and its node index entry.
    pub fn remove(&mut self, key: DescriptorId) -> Option<Descriptor> {
        let descriptor = self.descriptors.remove(&key)?;
        self.node_index.remove(&descriptor.node);
        Some(descriptor)
    }

    /// Build a serializable snapshot.
    #[must_use]
    pub fn view(&self, key: DescriptorId) -> Option<DescriptorView> {
        let d = self.get(key)?;
        Some(DescriptorView {
            id: d.id.clone(),
            name: d.name.clone(),
            node: d.node,
            depth: d.depth,
            parent: d
                .parent
                .and_then(|parent| self.get(parent))
                .map(|parent| parent.id.clone()),
            ready_done: d.ready_done,
            init_done: d.init_done,
            entered: d.entered,
            failed: d.failed,
            pending: d.pending.as_ref().map(|(phase, _)| *phase),
            batch: d.batch,
            static_config: d.static_config.to_vec(),
            dynamic_config: (*d.dynamic_config).clone(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::FutureExt;

    struct Noop;

    #[async_trait(?Send)]
    impl Component for Noop {}

    fn seed(node: u64, parent: Option<DescriptorId>, depth: usize) -> DescriptorSeed {
        DescriptorSeed {
            name: "noop".to_string(),
            node: NodeId(node),
            component: Rc::new(Noop),
            parent,
            depth,
            static_config: Rc::from(Vec::new()),
            dynamic_config: ConfigMap::new(),
            batch: BatchId(0),
        }
    }

    fn ready_handle() -> PhaseHandle {
        async { Ok(()) }.boxed_local().shared()
    }

    #[test]
    fn insert_generates_sequential_ids() {
        let mut table = DescriptorTable::new("w-");
        let a = table.insert(seed(1, None, 0));
        let b = table.insert(seed(2, Some(a), 1));

        assert_eq!(table.get(a).expect("a").id().as_str(), "w-0");
        assert_eq!(table.get(b).expect("b").id().as_str(), "w-1");
        assert_eq!(table.by_node(NodeId(2)), Some(b));
    }

    #[test]
    fn rejection_tracks_exact_payload() {
        let mut table = DescriptorTable::default();
        table.reject(NodeId(3), "{oops");

        assert!(table.is_rejected(NodeId(3), Some("{oops")));
        assert!(!table.is_rejected(NodeId(3), Some("{}")));
        assert!(!table.is_rejected(NodeId(3), None));
        assert!(!table.is_rejected(NodeId(4), Some("{oops")));

        table.insert(seed(3, None, 0));
        assert!(!table.is_rejected(NodeId(3), Some("{oops")));

        table.reject(NodeId(9), "[]");
        table.retain_rejections(|node| node != NodeId(9));
        assert!(!table.is_rejected(NodeId(9), Some("[]")));
    }

    #[test]
    fn insert_is_idempotent_per_node() {
        let mut table = DescriptorTable::default();
        let first = table.insert(seed(5, None, 0));
        let second = table.insert(seed(5, None, 0));
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn phases_follow_order() {
        let mut table = DescriptorTable::default();
        let key = table.insert(seed(1, None, 0));
        let d = table.get_mut(key).expect("descriptor");

        assert!(d.is_eligible(Phase::Ready));
        assert!(!d.is_eligible(Phase::Init));
        assert!(d.begin(Phase::Init, ready_handle()).is_err());

        d.begin(Phase::Ready, ready_handle()).expect("begin ready");
        assert!(!d.is_eligible(Phase::Ready));
        assert!(d.begin(Phase::Ready, ready_handle()).is_err());
        assert!(d.settle(Phase::Ready, &Ok(())));
        assert!(d.ready_done());
        assert!(d.pending().is_none());

        d.begin(Phase::Init, ready_handle()).expect("begin init");
        assert!(d.settle(Phase::Init, &Ok(())));
        assert!(d.is_eligible(Phase::Enter));
    }

    #[test]
    fn settle_rejects_wrong_phase() {
        let mut table = DescriptorTable::default();
        let key = table.insert(seed(1, None, 0));
        let d = table.get_mut(key).expect("descriptor");

        assert!(!d.settle(Phase::Ready, &Ok(())));
        d.begin(Phase::Ready, ready_handle()).expect("begin");
        assert!(!d.settle(Phase::Init, &Ok(())));
        assert!(d.pending().is_some());
    }

    #[test]
    fn failure_blocks_later_phases() {
        let mut table = DescriptorTable::default();
        let key = table.insert(seed(1, None, 0));
        let d = table.get_mut(key).expect("descriptor");

        d.begin(Phase::Ready, ready_handle()).expect("begin");
        d.settle(Phase::Ready, &Err(TesseraError::ManagerUnavailable));

        assert_eq!(d.failed(), Some(Phase::Ready));
        assert!(!d.ready_done());
        for phase in Phase::ALL {
            assert!(!d.is_eligible(phase));
        }
    }

    #[test]
    fn view_resolves_parent_id() {
        let mut table = DescriptorTable::default();
        let a = table.insert(seed(1, None, 0));
        let b = table.insert(seed(2, Some(a), 1));

        let view = table.view(b).expect("view");
        assert_eq!(view.parent, Some(ComponentId::new("cmp-0")));
        assert_eq!(view.depth, 1);

        table.remove(a);
        assert!(!table.contains_node(NodeId(1)));
        assert_eq!(table.view(b).expect("view").parent, None);
    }
}
