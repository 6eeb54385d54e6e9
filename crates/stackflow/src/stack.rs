//! The stack pipeline: configuration in, provisioned inventory out

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use stackflow_cloud::{Plan, ProviderRegistry};
use stackflow_core::{
    DependencyGraph, HostVariableSet, ScopeResolver, StackConfig, load, load_documents, load_str,
};
use stackflow_engine::{CancellationHandle, EngineConfig, ProvisioningEngine, RunReport};
use stackflow_inventory::{Inventory, InventoryGenerator};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Outcome of a deploy or inventory gathering run
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub report: RunReport,
    pub inventory: Inventory,
}

impl DeployOutcome {
    /// Every node provisioned and every server made it into the inventory
    pub fn is_success(&self) -> bool {
        self.report.is_success() && self.inventory.is_complete()
    }
}

/// Static overview of a stack, without contacting any provider
#[derive(Debug, Clone, Serialize)]
pub struct StackDescription {
    pub name: String,
    pub version: String,
    pub resources: usize,
    pub dependencies: usize,
    /// Provisioning stages; nodes within a stage are independent
    pub stages: Vec<Vec<String>>,
    pub scopes: Vec<String>,
    pub playbooks: Vec<String>,
}

/// A loaded, validated stack ready to plan or deploy
pub struct Stack {
    config: StackConfig,
    graph: DependencyGraph,
    engine: ProvisioningEngine,
}

impl Stack {
    /// Build a stack from an already parsed configuration tree
    #[instrument(skip_all)]
    pub fn from_tree(tree: &Value) -> Result<Self> {
        let config = load(tree).context("Failed to load stack configuration")?;
        Self::from_config(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let config = load_str(source).context("Failed to load stack document")?;
        Self::from_config(config)
    }

    /// Layer several YAML documents, later ones overriding earlier ones
    pub fn from_documents(sources: &[&str]) -> Result<Self> {
        let config = load_documents(sources).context("Failed to load stack documents")?;
        Self::from_config(config)
    }

    pub fn from_config(config: StackConfig) -> Result<Self> {
        let graph = DependencyGraph::build(&config).with_context(|| {
            format!("Failed to build dependency graph of stack '{}'", config.name)
        })?;
        let engine_config = EngineConfig::from_settings(config.settings.provisioning.as_ref())
            .with_context(|| format!("Invalid provisioning settings in stack '{}'", config.name))?;

        info!(
            stack = %config.name,
            resources = graph.len(),
            dependencies = graph.edge_count(),
            "Stack loaded"
        );
        Ok(Self {
            config,
            graph,
            engine: ProvisioningEngine::new(engine_config),
        })
    }

    /// Replace the engine settings taken from the `provisioning` section
    pub fn with_engine_config(mut self, engine_config: EngineConfig) -> Result<Self> {
        engine_config
            .validate()
            .context("Invalid engine configuration")?;
        let cancel = self.engine.cancellation_handle();
        self.engine = ProvisioningEngine::new(engine_config).with_cancellation(cancel);
        Ok(self)
    }

    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.engine = self.engine.with_cancellation(cancel);
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.engine.cancellation_handle()
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn engine_config(&self) -> &EngineConfig {
        self.engine.config()
    }

    pub fn describe(&self) -> StackDescription {
        StackDescription {
            name: self.config.name.clone(),
            version: self.config.version.clone(),
            resources: self.graph.len(),
            dependencies: self.graph.edge_count(),
            stages: self
                .graph
                .stages()
                .into_iter()
                .map(|stage| stage.iter().map(ToString::to_string).collect())
                .collect(),
            scopes: self.config.scopes.keys().cloned().collect(),
            playbooks: self.config.playbooks.clone(),
        }
    }

    /// Resolve every server's config scopes
    pub fn resolve_hosts(&self) -> BTreeMap<String, stackflow_core::Result<HostVariableSet>> {
        ScopeResolver::new(&self.config).resolve_all()
    }

    /// What `deploy` would do, using existence checks only
    pub async fn plan(&self, registry: &ProviderRegistry) -> Result<Plan> {
        self.engine
            .plan(&self.graph, registry)
            .await
            .with_context(|| format!("Failed to plan stack '{}'", self.config.name))
    }

    /// Provision the stack, then build the inventory from what came up
    #[instrument(skip_all, fields(stack = %self.config.name))]
    pub async fn deploy(&self, registry: &ProviderRegistry) -> Result<DeployOutcome> {
        let report = self
            .engine
            .run(&self.graph, registry)
            .await
            .with_context(|| format!("Failed to provision stack '{}'", self.config.name))?;
        Ok(self.finish(report))
    }

    /// Build the inventory of an already provisioned stack without creating
    /// anything
    #[instrument(skip_all, fields(stack = %self.config.name))]
    pub async fn gather_inventory(&self, registry: &ProviderRegistry) -> Result<DeployOutcome> {
        let report = self
            .engine
            .gather(&self.graph, registry)
            .await
            .with_context(|| format!("Failed to gather stack '{}'", self.config.name))?;
        Ok(self.finish(report))
    }

    fn finish(&self, report: RunReport) -> DeployOutcome {
        let resolved = self.resolve_hosts();
        let inventory = InventoryGenerator::new(&self.config).generate(&report, &resolved);

        let summary = report.summary();
        if report.is_success() && inventory.is_complete() {
            info!(%summary, hosts = inventory.payload.len(), "Stack deployed");
        } else {
            warn!(
                %summary,
                hosts = inventory.payload.len(),
                host_errors = inventory.errors.len(),
                "Stack deployed with failures"
            );
        }
        DeployOutcome { report, inventory }
    }
}
