//! Per-node render resources.
//!
//! [`ResourceManager`] pairs every node with one render target and one bound
//! program, plus a single process-wide fallback target that is substituted
//! whenever a real input is missing, invalid, or unsafe to read.
//!
//! # Lifecycle
//!
//! - [`allocate`](ResourceManager::allocate) is all-or-nothing: if any step
//!   (storage, completeness check, program binding) fails, the partial
//!   resources are freed and the node stays unallocated.
//! - [`release`](ResourceManager::release) is idempotent and never frees a
//!   handle the backend already invalidated.
//! - [`resize`](ResourceManager::resize) swaps every target for a new one
//!   before destroying the old, so no node is ever observed without storage.
//! - On context loss, [`invalidate_all`](ResourceManager::invalidate_all)
//!   forgets every handle; [`restore`](ResourceManager::restore) rebuilds the
//!   fallback and reallocates every live node.
//!
//! Every successful allocation is matched by exactly one release (explicit,
//! or implicit through invalidation), which [`AllocationStats`] tracks.

use std::collections::BTreeMap;

use lumen_core::{GraphStore, Node, NodeId};
use thiserror::Error;

use crate::backend::{BackendError, ProgramId, RenderBackend, Resolution, TargetId};

/// Errors raised while allocating render resources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// The backend refused one of the allocation steps.
    #[error("resource allocation for {node} failed: {source}")]
    Allocation {
        /// Node being allocated.
        node: NodeId,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// The fallback target could not be created.
    #[error("fallback target unavailable: {0}")]
    Fallback(#[source] BackendError),

    /// The device context is lost; nothing can be allocated until restore.
    #[error("render context lost")]
    ContextLost,
}

/// Resources owned by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResources {
    /// Render target the node writes.
    pub target: TargetId,
    /// Program bound for the node's type.
    pub program: ProgramId,
    /// Canonical program key the program was bound from.
    pub program_key: String,
}

/// Allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Successful node allocations.
    pub allocations: u64,
    /// Node releases, explicit or through context loss.
    pub releases: u64,
    /// Failed allocation attempts (partial resources were freed).
    pub failures: u64,
}

/// Owns the mapping from nodes to render resources.
#[derive(Debug)]
pub struct ResourceManager {
    resolution: Resolution,
    fallback_color: [f32; 4],
    fallback: Option<TargetId>,
    nodes: BTreeMap<NodeId, NodeResources>,
    stats: AllocationStats,
}

impl ResourceManager {
    /// Creates a manager. Call [`init`](Self::init) before rendering.
    pub fn new(resolution: Resolution, fallback_color: [f32; 4]) -> Self {
        Self {
            resolution,
            fallback_color,
            fallback: None,
            nodes: BTreeMap::new(),
            stats: AllocationStats::default(),
        }
    }

    /// Current output resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Allocation counters.
    pub fn stats(&self) -> AllocationStats {
        self.stats
    }

    /// The fallback target, if created.
    pub fn fallback(&self) -> Option<TargetId> {
        self.fallback
    }

    /// Resources for a node.
    pub fn resources(&self, id: NodeId) -> Option<&NodeResources> {
        self.nodes.get(&id)
    }

    /// Render target of a node.
    pub fn target(&self, id: NodeId) -> Option<TargetId> {
        self.nodes.get(&id).map(|r| r.target)
    }

    /// Returns `true` if the node holds resources.
    pub fn is_allocated(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes holding resources.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node holds resources.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates (or recreates) the fallback target.
    ///
    /// The previous fallback, if any, is destroyed only once its replacement
    /// exists.
    pub fn init(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ResourceError> {
        let target = self
            .create_target(backend)
            .map_err(ResourceError::Fallback)?;
        if let Err(e) = backend.clear_target(target, self.fallback_color) {
            backend.destroy_target(target);
            return Err(ResourceError::Fallback(e));
        }
        if let Some(old) = self.fallback.replace(target)
            && backend.is_target_valid(old)
            && !self.shares_target(old)
        {
            backend.destroy_target(old);
        }
        tracing::debug!("resource_fallback: {target} at {}", self.resolution);
        Ok(())
    }

    fn create_target(&self, backend: &mut dyn RenderBackend) -> Result<TargetId, BackendError> {
        let target = backend.create_target(self.resolution)?;
        if let Err(e) = backend.check_complete(target) {
            backend.destroy_target(target);
            return Err(e);
        }
        Ok(target)
    }

    /// Allocates a target and program for `node`.
    ///
    /// A node that already holds valid resources is left alone. On failure
    /// nothing stays allocated for the node.
    pub fn allocate(
        &mut self,
        backend: &mut dyn RenderBackend,
        node: &Node,
    ) -> Result<(), ResourceError> {
        let id = node.id();
        if let Some(existing) = self.nodes.get(&id) {
            if backend.is_target_valid(existing.target) {
                return Ok(());
            }
            // Storage vanished underneath us; account for it as released.
            self.forget(id);
        }
        if backend.is_context_lost() {
            return Err(ResourceError::ContextLost);
        }

        let fail = |stats: &mut AllocationStats, source: BackendError| {
            stats.failures += 1;
            tracing::warn!("resource_alloc: {id} failed: {source}");
            ResourceError::Allocation { node: id, source }
        };

        let target = match self.create_target(backend) {
            Ok(t) => t,
            Err(e) => return Err(fail(&mut self.stats, e)),
        };
        let program_key = node.schema().program_key.clone();
        let program = match backend.bind_program(&program_key) {
            Ok(p) => p,
            Err(e) => {
                backend.destroy_target(target);
                return Err(fail(&mut self.stats, e));
            }
        };

        tracing::debug!("resource_alloc: {id} → {target} ({program_key})");
        self.nodes.insert(
            id,
            NodeResources {
                target,
                program,
                program_key,
            },
        );
        self.stats.allocations += 1;
        Ok(())
    }

    /// Releases a node's resources. Returns `false` if it held none.
    pub fn release(&mut self, backend: &mut dyn RenderBackend, id: NodeId) -> bool {
        let Some(res) = self.nodes.remove(&id) else {
            return false;
        };
        if backend.is_target_valid(res.target) && !self.shares_target(res.target) {
            backend.destroy_target(res.target);
        }
        backend.release_program(res.program);
        self.stats.releases += 1;
        tracing::debug!("resource_release: {id} ({})", res.target);
        true
    }

    /// Returns `true` if another node or the fallback still uses `target`.
    fn shares_target(&self, target: TargetId) -> bool {
        self.fallback == Some(target) || self.nodes.values().any(|r| r.target == target)
    }

    fn forget(&mut self, id: NodeId) {
        if self.nodes.remove(&id).is_some() {
            self.stats.releases += 1;
        }
    }

    /// Changes the output resolution, replacing every target synchronously.
    ///
    /// Each new target is created before the old one is destroyed. A node
    /// whose new target cannot be created keeps its old one and the failure
    /// is reported.
    pub fn resize(
        &mut self,
        backend: &mut dyn RenderBackend,
        resolution: Resolution,
    ) -> Vec<ResourceError> {
        if resolution == self.resolution {
            return Vec::new();
        }
        tracing::info!("resource_resize: {} → {resolution}", self.resolution);
        self.resolution = resolution;
        let mut errors = Vec::new();

        if let Err(e) = self.init(backend) {
            errors.push(e);
        }

        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            match self.create_target(backend) {
                Ok(new_target) => {
                    let old = self
                        .nodes
                        .get_mut(&id)
                        .map(|res| std::mem::replace(&mut res.target, new_target));
                    if let Some(old) = old
                        && backend.is_target_valid(old)
                        && !self.shares_target(old)
                    {
                        backend.destroy_target(old);
                    }
                }
                Err(source) => {
                    tracing::warn!("resource_resize: {id} kept old target: {source}");
                    errors.push(ResourceError::Allocation { node: id, source });
                }
            }
        }
        errors
    }

    /// Brings resources in line with the store.
    ///
    /// Releases resources of nodes that no longer exist and allocates every
    /// live node that has none. Returns the allocation failures.
    pub fn sync(
        &mut self,
        backend: &mut dyn RenderBackend,
        store: &GraphStore,
    ) -> Vec<ResourceError> {
        let stale: Vec<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|&id| !store.contains(id))
            .collect();
        for id in stale {
            self.release(backend, id);
        }

        let mut errors = Vec::new();
        for node in store.nodes() {
            let needs = self
                .nodes
                .get(&node.id())
                .is_none_or(|r| !backend.is_target_valid(r.target));
            if needs && let Err(e) = self.allocate(backend, node) {
                errors.push(e);
            }
        }
        errors
    }

    /// Forgets every handle after the backend lost its context.
    ///
    /// Nothing is destroyed: the handles are already dead. Each forgotten
    /// node counts as released.
    pub fn invalidate_all(&mut self) {
        let count = self.nodes.len();
        self.stats.releases += count as u64;
        self.nodes.clear();
        self.fallback = None;
        tracing::error!("resource_lost: {count} node resources invalidated");
    }

    /// Rebuilds the fallback and reallocates every node after context restore.
    ///
    /// The fallback is required; per-node failures are returned and those
    /// nodes render nothing until a later [`sync`](Self::sync) succeeds.
    pub fn restore(
        &mut self,
        backend: &mut dyn RenderBackend,
        store: &GraphStore,
    ) -> Result<Vec<ResourceError>, ResourceError> {
        if backend.is_context_lost() {
            return Err(ResourceError::ContextLost);
        }
        if !self.nodes.is_empty() {
            self.invalidate_all();
        }
        self.init(backend)?;
        let errors = self.sync(backend, store);
        tracing::info!(
            "resource_restore: {} nodes allocated, {} failed",
            self.nodes.len(),
            errors.len()
        );
        Ok(errors)
    }

    /// Releases everything, fallback included.
    pub fn release_all(&mut self, backend: &mut dyn RenderBackend) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            self.release(backend, id);
        }
        if let Some(fallback) = self.fallback.take()
            && backend.is_target_valid(fallback)
        {
            backend.destroy_target(fallback);
        }
    }
}
