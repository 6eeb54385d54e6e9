//! Provisioning engine
//!
//! One scheduler loop drives the whole run:
//!
//! ```text
//!   ready ──► (worker slot + provider permit) ──► JoinSet of attempts
//!     ▲                                                │
//!     │  dependents released            outcome        │
//!     └──────────── RunContext ◄───────────────────────┘
//!                       │ retryable error
//!                       ▼
//!                retry heap (next eligible instant)
//! ```
//!
//! Workers exist only while a provider call is running. A node waiting out a
//! backoff holds no worker, only an entry in the retry heap.

use crate::cancel::CancellationHandle;
use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::error::{EngineError, Result};
use crate::result::{FailureReason, RunReport};
use chrono::Utc;
use futures_util::FutureExt;
use stackflow_cloud::{
    Action, ActionType, CloudError, CloudProvider, Plan, ProviderAttributes, ProviderRegistry,
    ResourceConfig, ResourceIdentity,
};
use stackflow_core::{DependencyGraph, DependencyNode, NodeId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Whether missing resources are created or reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Provision,
    Gather,
}

/// What a single attempt produced
#[derive(Debug)]
enum AttemptOutcome {
    Provisioned {
        attributes: ProviderAttributes,
        reused: bool,
    },
    Absent,
    Failed(CloudError),
}

type AttemptResult = (NodeId, u32, AttemptOutcome);

pub struct ProvisioningEngine {
    config: EngineConfig,
    cancel: CancellationHandle,
}

impl ProvisioningEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancellationHandle::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle that cancels runs of this engine
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    /// Provision every node in dependency order
    #[instrument(skip_all, fields(stack = %graph.stack_name(), nodes = graph.len()))]
    pub async fn run(
        &self,
        graph: &DependencyGraph,
        registry: &ProviderRegistry,
    ) -> Result<RunReport> {
        self.execute(graph, registry, Mode::Provision).await
    }

    /// Look up existing resources without creating anything. Resources that
    /// do not exist fail with [`FailureReason::Absent`].
    #[instrument(skip_all, fields(stack = %graph.stack_name(), nodes = graph.len()))]
    pub async fn gather(
        &self,
        graph: &DependencyGraph,
        registry: &ProviderRegistry,
    ) -> Result<RunReport> {
        self.execute(graph, registry, Mode::Gather).await
    }

    /// Dry run: report what `run` would do, using only existence checks
    #[instrument(skip_all, fields(stack = %graph.stack_name()))]
    pub async fn plan(&self, graph: &DependencyGraph, registry: &ProviderRegistry) -> Result<Plan> {
        self.config.validate()?;
        preflight(graph, registry)?;

        let mut actions = Vec::with_capacity(graph.len());
        for (stage, ids) in graph.stages().into_iter().enumerate() {
            for id in ids {
                let Some(node) = graph.node(&id) else {
                    return Err(EngineError::UnknownNode(id));
                };
                let (action_type, description) = match node.provider() {
                    None => (
                        ActionType::External,
                        format!(
                            "use pre-provisioned host {}",
                            node.definition.hostname.as_deref().unwrap_or(&node.id.name)
                        ),
                    ),
                    Some(provider_name) => {
                        let provider = resolve_provider(registry, node, provider_name)?;
                        let identity =
                            ResourceIdentity::from_definition(graph.stack_name(), &node.definition);
                        let exists = provider.exists(&identity).await.map_err(|source| {
                            EngineError::Provider {
                                node: id.clone(),
                                source,
                            }
                        })?;
                        if exists {
                            (ActionType::Reuse, format!("reuse existing {}", identity))
                        } else {
                            (
                                ActionType::Create,
                                format!("create {} via {}", identity, provider.display_name()),
                            )
                        }
                    }
                };
                actions.push(Action {
                    node: id,
                    action_type,
                    provider: node.provider().map(str::to_string),
                    stage,
                    description,
                });
            }
        }

        let plan = Plan::new(actions);
        info!(summary = %plan.summary(), "Plan ready");
        Ok(plan)
    }

    async fn execute(
        &self,
        graph: &DependencyGraph,
        registry: &ProviderRegistry,
        mode: Mode,
    ) -> Result<RunReport> {
        self.config.validate()?;
        preflight(graph, registry)?;

        let started_at = Utc::now();
        let ctx = RunContext::new(graph);
        let limits: HashMap<&str, Arc<Semaphore>> = self
            .config
            .provider_limits
            .iter()
            .map(|(name, limit)| (name.as_str(), Arc::new(Semaphore::new(*limit))))
            .collect();

        let mut ready: VecDeque<NodeId> = ctx.initially_ready().into();
        let mut retries: BinaryHeap<Reverse<(Instant, NodeId)>> = BinaryHeap::new();
        let mut in_flight: JoinSet<AttemptResult> = JoinSet::new();
        let mut cancelled = self.cancel.is_cancelled();

        info!(
            workers = self.config.workers,
            ready = ready.len(),
            gather = (mode == Mode::Gather),
            "Run started"
        );

        loop {
            cancelled = cancelled || self.cancel.is_cancelled();

            if !cancelled {
                let now = Instant::now();
                while let Some(Reverse((at, _))) = retries.peek() {
                    if *at > now {
                        break;
                    }
                    if let Some(Reverse((_, id))) = retries.pop() {
                        ready.push_back(id);
                    }
                }

                let mut blocked = VecDeque::new();
                while in_flight.len() < self.config.workers {
                    let Some(id) = ready.pop_front() else {
                        break;
                    };
                    let Some(node) = graph.node(&id) else {
                        return Err(EngineError::UnknownNode(id));
                    };

                    let Some(provider_name) = node.provider() else {
                        let released = ctx.complete_external(&id)?;
                        info!(node = %id, "Pre-provisioned host, nothing to do");
                        ready.extend(released);
                        continue;
                    };

                    let permit = match limits.get(provider_name) {
                        None => None,
                        Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                blocked.push_back(id);
                                continue;
                            }
                        },
                    };

                    let provider = Arc::clone(resolve_provider(registry, node, provider_name)?);
                    let attempt = ctx.begin_attempt(&id)?;
                    self.spawn_attempt(&mut in_flight, graph, node, provider, permit, attempt, mode);
                }
                // nodes held back by a provider limit keep their place in line
                blocked.extend(ready.drain(..));
                ready = blocked;
            }

            if in_flight.is_empty() && (cancelled || (ready.is_empty() && retries.is_empty())) {
                break;
            }

            let next_retry = retries.peek().map(|Reverse((at, _))| *at);
            tokio::select! {
                Some(joined) = in_flight.join_next() => match joined {
                    Ok((id, attempt, outcome)) => {
                        let released =
                            self.handle_outcome(graph, &ctx, &mut retries, id, attempt, outcome, cancelled)?;
                        if !cancelled {
                            ready.extend(released);
                        }
                    }
                    Err(err) => error!(error = %err, "Provisioning task did not finish"),
                },
                _ = sleep_until(next_retry.unwrap_or_else(Instant::now)), if next_retry.is_some() && !cancelled => {}
                _ = self.cancel.cancelled(), if !cancelled => {
                    warn!(in_flight = in_flight.len(), "Run cancelled, waiting for in-flight calls");
                    cancelled = true;
                }
                else => break,
            }
        }

        let reason = if cancelled {
            FailureReason::Cancelled
        } else {
            FailureReason::Provider {
                message: "provisioning task aborted".to_string(),
            }
        };
        let abandoned = ctx.abandon_undecided(reason);
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Nodes left undecided");
        }

        let report = RunReport {
            results: ctx.into_results(),
            started_at,
            finished_at: Utc::now(),
            cancelled,
        };
        info!(
            success = report.is_success(),
            summary = %report.summary(),
            "Run finished"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_attempt(
        &self,
        in_flight: &mut JoinSet<AttemptResult>,
        graph: &DependencyGraph,
        node: &DependencyNode,
        provider: Arc<dyn CloudProvider>,
        permit: Option<OwnedSemaphorePermit>,
        attempt: u32,
        mode: Mode,
    ) {
        let id = node.id.clone();
        let resource = ResourceConfig::from_definition(graph.stack_name(), &node.definition);
        let span = info_span!(
            "provision",
            node = %id,
            provider = %provider.name(),
            attempt
        );

        in_flight.spawn(
            async move {
                let _permit = permit;
                debug!("Attempt started");
                let outcome = AssertUnwindSafe(attempt_once(provider.as_ref(), &resource, mode))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        AttemptOutcome::Failed(CloudError::ApiError(format!(
                            "provider panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    });
                (id, attempt, outcome)
            }
            .instrument(span),
        );
    }

    /// Record an attempt's outcome; returns the nodes it made ready
    #[allow(clippy::too_many_arguments)]
    fn handle_outcome(
        &self,
        graph: &DependencyGraph,
        ctx: &RunContext,
        retries: &mut BinaryHeap<Reverse<(Instant, NodeId)>>,
        id: NodeId,
        attempt: u32,
        outcome: AttemptOutcome,
        cancelled: bool,
    ) -> Result<Vec<NodeId>> {
        let reason = match outcome {
            AttemptOutcome::Provisioned { attributes, reused } => {
                info!(node = %id, attempt, reused, "Provisioned");
                return ctx.complete(&id, Some(attributes), reused);
            }
            AttemptOutcome::Absent => {
                warn!(node = %id, "Resource does not exist");
                FailureReason::Absent
            }
            AttemptOutcome::Failed(err) if err.is_retryable() => {
                if self.config.retry.allows_retry(attempt) {
                    if cancelled {
                        // left Provisioning; abandoned as cancelled once the run drains
                        return Ok(Vec::new());
                    }
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(node = %id, attempt, ?delay, error = %err, "Retryable failure, backing off");
                    retries.push(Reverse((Instant::now() + delay, id)));
                    return Ok(Vec::new());
                }
                FailureReason::RetriesExhausted {
                    attempts: attempt,
                    message: err.to_string(),
                }
            }
            AttemptOutcome::Failed(err) => FailureReason::Provider {
                message: err.to_string(),
            },
        };

        error!(node = %id, attempt, reason = %reason, "Node failed");
        ctx.fail(&id, reason)?;
        for dependent in graph.transitive_dependents(&id) {
            if ctx.skip(&dependent, &id)? {
                warn!(node = %dependent, upstream = %id, "Skipped, dependency failed");
            }
        }
        Ok(Vec::new())
    }
}

impl Default for ProvisioningEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Every node that needs a provider must name a registered one
fn preflight(graph: &DependencyGraph, registry: &ProviderRegistry) -> Result<()> {
    for node in graph.nodes() {
        if let Some(provider) = node.provider() {
            resolve_provider(registry, node, provider)?;
        }
    }
    Ok(())
}

fn resolve_provider<'r>(
    registry: &'r ProviderRegistry,
    node: &DependencyNode,
    provider: &str,
) -> Result<&'r Arc<dyn CloudProvider>> {
    registry
        .get(provider)
        .ok_or_else(|| EngineError::UnknownProvider {
            node: node.id.clone(),
            provider: provider.to_string(),
        })
}

/// Idempotent attempt: adopt an existing resource, otherwise create it
/// (or report it absent when gathering).
async fn attempt_once(
    provider: &dyn CloudProvider,
    resource: &ResourceConfig,
    mode: Mode,
) -> AttemptOutcome {
    let identity = &resource.identity;
    let exists = match provider.exists(identity).await {
        Ok(exists) => exists,
        Err(err) => return AttemptOutcome::Failed(err),
    };

    let result = match (exists, mode) {
        (true, _) => provider.describe(identity).await.map(|attributes| (attributes, true)),
        (false, Mode::Gather) => return AttemptOutcome::Absent,
        (false, Mode::Provision) => provider.create(resource).await.map(|attributes| (attributes, false)),
    };
    match result {
        Ok((attributes, reused)) => AttemptOutcome::Provisioned { attributes, reused },
        Err(err) => AttemptOutcome::Failed(err),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
