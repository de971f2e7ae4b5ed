//! # Engine assembly.
//!
//! [`BusBuilder`] collects the immutable configuration, the lineage graph
//! and the host collaborators, then spins up the execution contexts and
//! returns the [`Bus`] handle. Building requires a reachable Tokio runtime
//! (ambient via `Handle::try_current()`, or passed explicitly).

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::diag::{Diagnostics, LogSink};
use crate::dispatch::executors::Executors;
use crate::error::BusError;
use crate::registry::{Materialize, Track};
use crate::types::{TypeGraph, TypeResolver};

use super::bus::{Bus, BusCore, MainThreadProbe, TrackState};
use super::config::BusConfig;

/// Builder for constructing a [`Bus`] with optional collaborators.
pub struct BusBuilder {
    cfg: BusConfig,
    graph: TypeGraph,
    diag: Option<Arc<dyn Diagnostics>>,
    materializer: Option<Arc<dyn Materialize>>,
    probe: Option<MainThreadProbe>,
    runtime: Option<Handle>,
}

impl BusBuilder {
    pub(crate) fn new() -> Self {
        Self {
            cfg: BusConfig::default(),
            graph: TypeGraph::empty(),
            diag: None,
            materializer: None,
            probe: None,
            runtime: None,
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: BusConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the lineage graph polymorphic matching runs on. Without one,
    /// every type resolves to itself only.
    pub fn with_type_graph(mut self, graph: TypeGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Sets the diagnostics sink. Defaults to the `tracing`-backed
    /// [`LogSink`].
    pub fn with_diagnostics(mut self, diag: Arc<dyn Diagnostics>) -> Self {
        self.diag = Some(diag);
        self
    }

    /// Sets the deferred-consumer materializer, invoked fire-and-forget
    /// when a class's buffer transitions from empty to non-empty.
    pub fn with_materializer(mut self, materializer: Arc<dyn Materialize>) -> Self {
        self.materializer = Some(materializer);
        self
    }

    /// Claims an existing host thread (e.g. a UI thread) as the primary
    /// thread for routing decisions.
    pub fn with_main_thread_probe(
        mut self,
        probe: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// Uses an explicit runtime handle instead of the ambient one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the engine: spawns the ordered consumers and assembles the
    /// shared core.
    pub fn build(self) -> Result<Bus, BusError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BusError::NoRuntime)?,
        };
        let executors = Executors::start(runtime)?;
        let core = BusCore {
            id: BusCore::next_id(),
            resolver: TypeResolver::new(self.graph),
            tracks: [
                TrackState::new(&self.cfg, Track::Events),
                TrackState::new(&self.cfg, Track::Faults),
            ],
            executors,
            panic_policy: self.cfg.panic_policy,
            diag: self.diag.unwrap_or_else(|| Arc::new(LogSink)),
            materializer: self.materializer,
            probe: self.probe,
        };
        Ok(Bus {
            core: Arc::new(core),
        })
    }
}
