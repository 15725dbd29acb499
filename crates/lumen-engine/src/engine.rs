//! The per-frame engine.

use std::path::Path;
use std::sync::Arc;

use lumen_config::{
    EngineSettings, LoadReport, ProjectFile, load_graph, serialize_graph,
};
use lumen_core::{Correction, GraphStore, NodeId, NodeRegistry, ParamValue, Position, SlotKind};
use lumen_platform::{ControlRoute, ControlRouter, RouteReport, SignalBank, SignalFeed};
use lumen_render::{
    FrameError, FrameRenderer, FrameReport, PixelBuffer, RenderBackend, Resolution,
    ResourceError, ResourceManager,
};

use crate::error::EngineError;

/// Device state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Frames run normally.
    #[default]
    Ready,
    /// The context is lost; ticks are suspended until it is restored.
    Lost,
    /// The backend failed for good; every tick is an error.
    Stopped,
}

/// What one [`Engine::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A frame ran.
    Rendered(FrameReport),
    /// No frame ran because the device is unavailable.
    Suspended,
}

impl TickOutcome {
    /// The frame report, if a frame ran.
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            Self::Rendered(report) => Some(report),
            Self::Suspended => None,
        }
    }
}

/// Running totals across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames rendered.
    pub frames: u64,
    /// Ticks that were suspended.
    pub suspended_ticks: u64,
    /// Node evaluations that failed.
    pub node_failures: u64,
    /// Consumer slots that read the fallback because of a feedback hazard.
    pub feedback_substitutions: u64,
    /// Edges dropped from evaluation because they closed a cycle.
    pub cycle_edges: u64,
    /// Resource allocations that failed during ticks.
    pub allocation_failures: u64,
    /// Routed values corrected by parameter constraints.
    pub route_corrections: u64,
    /// Context losses observed.
    pub context_losses: u64,
    /// Successful recoveries after context loss.
    pub recoveries: u64,
}

/// Ties the graph, the route table, signal sampling, resources and the
/// frame renderer to one backend.
///
/// Each [`tick`](Self::tick) runs the same sequence:
///
/// 1. sample signals (external feed plus timer and random sources)
/// 2. write routed values into parameters
/// 3. bring resources in line with the graph
/// 4. render one frame in dependency order
///
/// Graph edits go through the engine so resources follow them immediately;
/// edits made via [`store_mut`](Self::store_mut) are picked up by the next
/// tick.
pub struct Engine {
    store: GraphStore,
    router: ControlRouter,
    bank: SignalBank,
    resources: ResourceManager,
    renderer: FrameRenderer,
    backend: Box<dyn RenderBackend>,
    state: DeviceState,
    stats: EngineStats,
    last_routes: RouteReport,
}

impl Engine {
    /// Creates an engine over `backend`.
    ///
    /// Fails if the registry has no terminal type or the fallback target
    /// cannot be created.
    pub fn new(
        registry: Arc<NodeRegistry>,
        mut backend: Box<dyn RenderBackend>,
        settings: &EngineSettings,
    ) -> Result<Self, EngineError> {
        let resolution = Resolution::new(settings.resolution.width, settings.resolution.height);
        if resolution.is_empty() {
            return Err(EngineError::InvalidResolution(resolution));
        }
        let store = GraphStore::new(registry)?;

        let mut resources = ResourceManager::new(resolution, settings.fallback_color);
        resources.init(backend.as_mut())?;
        for error in resources.sync(backend.as_mut(), &store) {
            tracing::warn!("engine_init: {error}");
        }

        let mut bank = SignalBank::new(SignalFeed::new(), settings.signals.seed);
        bank.set_default_axis(settings.signals.default_axis());
        for (key, conditioning) in &settings.signals.axes {
            bank.set_conditioning(key, *conditioning);
        }

        tracing::info!(
            "engine_init: backend={} resolution={resolution}",
            backend.name()
        );
        Ok(Self {
            store,
            router: ControlRouter::new(),
            bank,
            resources,
            renderer: FrameRenderer::new(),
            backend,
            state: DeviceState::Ready,
            stats: EngineStats::default(),
            last_routes: RouteReport::default(),
        })
    }

    /// Creates an engine with the built-in node set.
    pub fn with_builtin(
        backend: Box<dyn RenderBackend>,
        settings: &EngineSettings,
    ) -> Result<Self, EngineError> {
        let registry = lumen_registry::builtin()?;
        Self::new(Arc::new(registry), backend, settings)
    }

    /// The graph.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Mutable access to the graph.
    pub fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    /// The route table.
    pub fn router(&self) -> &ControlRouter {
        &self.router
    }

    /// Node resources.
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// The backend.
    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    /// Handle for publishing signal values from any thread.
    pub fn feed(&self) -> SignalFeed {
        self.bank.feed().clone()
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Running totals.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Routing outcome of the most recent tick.
    pub fn last_routes(&self) -> &RouteReport {
        &self.last_routes
    }

    /// Seconds of signal time elapsed.
    pub fn elapsed(&self) -> f64 {
        self.bank.elapsed()
    }

    /// Output resolution.
    pub fn resolution(&self) -> Resolution {
        self.resources.resolution()
    }

    // --- graph ---

    /// Creates a node and allocates its resources.
    ///
    /// An allocation failure leaves the node in the graph; it renders
    /// nothing until a later tick allocates it.
    pub fn create_node(&mut self, type_tag: &str, position: Position) -> Result<NodeId, EngineError> {
        let id = self.store.create_node(type_tag, position)?;
        if self.state == DeviceState::Ready
            && let Some(node) = self.store.node(id)
            && let Err(e) = self.resources.allocate(self.backend.as_mut(), node)
        {
            tracing::warn!("engine_create: {id} unallocated: {e}");
        }
        Ok(id)
    }

    /// Deletes a node, its routes and its resources.
    pub fn delete_node(&mut self, id: NodeId) -> Result<bool, EngineError> {
        if !self.store.delete_node(id)? {
            return Ok(false);
        }
        let routes = self.router.remove_routes_for_node(id);
        self.resources.release(self.backend.as_mut(), id);
        tracing::debug!("engine_delete: {id} ({routes} routes dropped)");
        Ok(true)
    }

    /// Connects `producer` into slot `index` of `consumer`.
    pub fn connect(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        index: usize,
        kind: SlotKind,
    ) -> Result<Option<NodeId>, EngineError> {
        Ok(self.store.connect(producer, consumer, index, kind)?)
    }

    /// Empties slot `index` of `consumer`.
    pub fn disconnect(
        &mut self,
        consumer: NodeId,
        index: usize,
        kind: SlotKind,
    ) -> Result<Option<NodeId>, EngineError> {
        Ok(self.store.disconnect(consumer, index, kind)?)
    }

    /// Sets a parameter, returning the correction if the value was adjusted.
    pub fn set_param(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<Option<Correction>, EngineError> {
        Ok(self.store.set_param(id, name, value)?)
    }

    /// Enables or disables a node.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), EngineError> {
        Ok(self.store.set_enabled(id, enabled)?)
    }

    // --- routing ---

    /// Routes `source_key` to `param` on `node`, mapping the normalized
    /// signal into `[out_min, out_max]`. Returns routes it replaced.
    pub fn create_route(
        &mut self,
        source_key: &str,
        node: NodeId,
        param: &str,
        out_min: f32,
        out_max: f32,
    ) -> Result<Vec<ControlRoute>, EngineError> {
        Ok(self
            .router
            .create_route(&self.store, source_key, node, param, out_min, out_max)?)
    }

    /// Removes the route driving `param` on `node`.
    pub fn remove_route(&mut self, node: NodeId, param: &str) -> Option<ControlRoute> {
        self.router.remove_route(node, param)
    }

    // --- frames ---

    /// Advances signal time by `dt` seconds and renders one frame.
    ///
    /// Returns [`TickOutcome::Suspended`] while the context is lost and
    /// [`EngineError::Stopped`] once the backend has failed for good.
    pub fn tick(&mut self, dt: f32) -> Result<TickOutcome, EngineError> {
        if self.state == DeviceState::Stopped {
            return Err(EngineError::Stopped);
        }

        let snapshot = self.bank.sample(dt);
        let routes = self.router.apply(snapshot, &mut self.store);
        self.stats.route_corrections += routes.corrections.len() as u64;
        self.last_routes = routes;

        if self.backend.is_context_lost() {
            if self.state == DeviceState::Ready {
                self.notify_context_lost();
            }
            return Ok(self.suspend());
        }
        if self.state == DeviceState::Lost && self.recover().is_err() {
            return Ok(self.suspend());
        }

        let failures = self.resources.sync(self.backend.as_mut(), &self.store);
        self.stats.allocation_failures += failures.len() as u64;

        let time = self.bank.elapsed() as f32;
        match self
            .renderer
            .render(&self.store, &self.resources, self.backend.as_mut(), time)
        {
            Ok(report) => {
                self.stats.frames += 1;
                self.stats.node_failures += report.failed.len() as u64;
                self.stats.feedback_substitutions += report.feedback.len() as u64;
                self.stats.cycle_edges += report.cycles.len() as u64;
                Ok(TickOutcome::Rendered(report))
            }
            Err(FrameError::DeviceUnavailable) => {
                self.notify_context_lost();
                Ok(self.suspend())
            }
            Err(FrameError::MissingFallback) => {
                if let Err(e) = self.resources.init(self.backend.as_mut()) {
                    tracing::warn!("engine_tick: fallback unavailable: {e}");
                }
                Ok(self.suspend())
            }
        }
    }

    fn suspend(&mut self) -> TickOutcome {
        self.stats.suspended_ticks += 1;
        TickOutcome::Suspended
    }

    /// Marks the context as lost and drops every handle.
    ///
    /// No frame runs until the context is restored.
    pub fn notify_context_lost(&mut self) {
        if self.state == DeviceState::Stopped {
            return;
        }
        if self.state == DeviceState::Ready {
            self.stats.context_losses += 1;
        }
        self.state = DeviceState::Lost;
        self.resources.invalidate_all();
        self.renderer.invalidate();
        tracing::error!("engine_device: context lost, frames suspended");
    }

    /// Rebuilds resources after the context came back.
    ///
    /// Per-node allocation failures are returned; those nodes render
    /// nothing until a later tick allocates them.
    pub fn notify_context_restored(&mut self) -> Result<Vec<ResourceError>, EngineError> {
        match self.state {
            DeviceState::Stopped => Err(EngineError::Stopped),
            DeviceState::Ready => Ok(Vec::new()),
            DeviceState::Lost => self.recover(),
        }
    }

    fn recover(&mut self) -> Result<Vec<ResourceError>, EngineError> {
        let errors = self.resources.restore(self.backend.as_mut(), &self.store)?;
        self.renderer.invalidate();
        self.state = DeviceState::Ready;
        self.stats.recoveries += 1;
        tracing::info!(
            "engine_device: context restored, {} nodes reallocated",
            self.resources.len()
        );
        Ok(errors)
    }

    /// Stops the engine after an unrecoverable backend failure.
    pub fn notify_backend_failed(&mut self) {
        if self.state == DeviceState::Stopped {
            return;
        }
        self.state = DeviceState::Stopped;
        self.resources.invalidate_all();
        tracing::error!("engine_device: backend failed, engine stopped");
    }

    /// Changes the output resolution.
    ///
    /// Nodes whose new target could not be created keep rendering at the
    /// old size; their failures are returned.
    pub fn resize(&mut self, resolution: Resolution) -> Result<Vec<ResourceError>, EngineError> {
        if resolution.is_empty() {
            return Err(EngineError::InvalidResolution(resolution));
        }
        if self.state == DeviceState::Stopped {
            return Err(EngineError::Stopped);
        }
        Ok(self.resources.resize(self.backend.as_mut(), resolution))
    }

    /// Reads back the terminal's output from the last frame.
    pub fn read_frame(&self) -> Result<PixelBuffer, EngineError> {
        if self.state != DeviceState::Ready || self.backend.is_context_lost() {
            return Err(FrameError::DeviceUnavailable.into());
        }
        let target = self
            .resources
            .target(self.store.terminal())
            .or(self.resources.fallback())
            .ok_or(FrameError::MissingFallback)?;
        Ok(self.backend.read_pixels(target)?)
    }

    // --- persistence ---

    /// Captures the graph and routes as a project.
    pub fn project(&self) -> ProjectFile {
        serialize_graph(&self.store, &self.router)
    }

    /// Replaces the graph and routes with `project`.
    ///
    /// Resources of removed nodes are released before the new nodes are
    /// allocated.
    pub fn load(&mut self, project: &ProjectFile) -> LoadReport {
        let report = load_graph(project, &mut self.store, &mut self.router);
        for &id in &report.removed {
            self.resources.release(self.backend.as_mut(), id);
        }
        if self.state == DeviceState::Ready {
            let failures = self.resources.sync(self.backend.as_mut(), &self.store);
            for error in &failures {
                tracing::warn!("engine_load: {error}");
            }
        }
        tracing::info!(
            "engine_load: {} nodes, {} routes, {} issues",
            self.store.len(),
            self.router.len(),
            report.issues.len()
        );
        report
    }

    /// Saves the graph and routes to a project file.
    pub fn save_project(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        Ok(self.project().save(path)?)
    }

    /// Loads a project file, replacing the graph and routes.
    pub fn load_project(&mut self, path: impl AsRef<Path>) -> Result<LoadReport, EngineError> {
        let project = ProjectFile::load(path)?;
        Ok(self.load(&project))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.state == DeviceState::Ready {
            self.resources.release_all(self.backend.as_mut());
        }
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.backend.name())
            .field("nodes", &self.store.len())
            .field("routes", &self.router.len())
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}
