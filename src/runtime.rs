// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wiring of the shared services from a resolved configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{ReasonerKind, ResolvedConfig};
use crate::events::EventBus;
use crate::process::{ProcessManager, WorkerLauncher};
use crate::workflow::{
    AdapterRegistry, PlanReasoner, Reasoner, Router, Supervisor, WorkerReasoner,
};

/// The bus, process manager and router one server shares across sessions.
pub struct Runtime {
    pub bus: Arc<EventBus>,
    pub manager: Arc<ProcessManager>,
    pub router: Arc<Router>,
}

impl Runtime {
    /// Build with workers started as child processes.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let bus = Arc::new(EventBus::with_capacity(config.bus_capacity));
        let manager = Arc::new(ProcessManager::new(config.process.clone(), Arc::clone(&bus)));
        Self::assemble(config, bus, manager)
    }

    /// Build with a custom launcher.
    pub fn with_launcher(config: &ResolvedConfig, launcher: Arc<dyn WorkerLauncher>) -> Self {
        let bus = Arc::new(EventBus::with_capacity(config.bus_capacity));
        let manager = Arc::new(ProcessManager::with_launcher(
            config.process.clone(),
            Arc::clone(&bus),
            launcher,
        ));
        Self::assemble(config, bus, manager)
    }

    fn assemble(config: &ResolvedConfig, bus: Arc<EventBus>, manager: Arc<ProcessManager>) -> Self {
        let reasoner: Arc<dyn Reasoner> = match config.reasoner.kind {
            ReasonerKind::Plan => Arc::new(PlanReasoner),
            ReasonerKind::Worker => Arc::new(
                WorkerReasoner::new(
                    Arc::clone(&manager),
                    Duration::from_millis(config.reasoner.timeout_ms),
                )
                .with_tool(&config.reasoner.tool, &config.reasoner.operation),
            ),
        };
        info!(reasoner = reasoner.name(), "Supervisor configured");

        let supervisor = Supervisor::new(config.supervisor.clone(), reasoner);
        let adapters = AdapterRegistry::workers(Arc::clone(&manager), &config.agents, &config.timeouts);
        let router = Arc::new(Router::new(supervisor, adapters, Arc::clone(&bus)));

        Self { bus, manager, router }
    }

    /// Stop every worker.
    pub async fn shutdown(&self) {
        self.manager.shutdown_all().await;
    }
}
