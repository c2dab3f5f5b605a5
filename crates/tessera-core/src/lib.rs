//! # tessera-core
//!
//! The lifecycle scheduler for Tessera - THE LOGIC.
//!
//! Finds marker nodes in a document tree, binds each one to a registered
//! component, and drives every instance through `ready → init → enter`
//! exactly once, with barrier semantics inside each discovery batch.
//!
//! ## Architecture
//!
//! - `registry`: name → factory + static configuration
//! - `scanner`: lazy, document-order discovery of unregistered markers
//! - `descriptor`: per-instance lifecycle state in an id-keyed arena
//! - `manager`: batches, phase barriers, coalescing, pruning
//! - `document`: the arena-backed element tree the scanner walks
//!
//! ## Execution Model
//!
//! Single logical thread. Futures are `!Send`, state lives in `Rc`/`RefCell`,
//! and the only runtime facilities used are a one-tick yield and an optional
//! phase timeout.

// =============================================================================
// MODULES
// =============================================================================

pub mod component;
pub mod config;
pub mod descriptor;
pub mod document;
pub mod manager;
pub mod primitives;
pub mod registry;
pub mod scanner;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    BatchId, ComponentError, ComponentId, ConfigDirective, ConfigMap, DescriptorId, NodeId, Phase,
    TesseraError,
};

// =============================================================================
// RE-EXPORTS: Scheduler
// =============================================================================

pub use component::{Component, ComponentContext, ComponentFactory, PhaseResult};
pub use config::ManagerConfig;
pub use descriptor::{
    Descriptor, DescriptorTable, DescriptorView, PhaseHandle, PhaseOutcome,
};
pub use document::{Document, NodeKind};
pub use manager::{BatchHandle, BatchReport, Manager, WeakManager};
pub use registry::{Registration, Registry};
pub use scanner::{Discovery, Scanner, parse_config};

// =============================================================================
// RE-EXPORTS: Async Support
// =============================================================================

/// Attribute macro for implementing [`Component`].
pub use async_trait::async_trait;
