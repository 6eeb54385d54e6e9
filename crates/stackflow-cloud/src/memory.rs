//! In-memory provider
//!
//! A provider that keeps resources in a map instead of calling a cloud API.
//! Latency, pre-existing resources and failures can be scripted, and every
//! call is recorded, which makes it the standard test double for the engine.

use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, ResourceConfig, ResourceIdentity};
use crate::state::{ProviderAttributes, ResourceStatus};
use async_trait::async_trait;
use stackflow_core::ResourceCategory;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Exists,
    Create,
    Describe,
    Destroy,
}

/// One completed provider call
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Order in which the call started
    pub seq: u64,
    pub kind: CallKind,
    /// Declared resource name
    pub resource: String,
    pub category: ResourceCategory,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub succeeded: bool,
}

#[derive(Default)]
struct Inner {
    resources: HashMap<String, ProviderAttributes>,
    failures: HashMap<(CallKind, String), VecDeque<CloudError>>,
    calls: Vec<CallRecord>,
}

pub struct InMemoryProvider {
    name: String,
    latency: Duration,
    inner: Mutex<Inner>,
    seq: AtomicU64,
    created: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            inner: Mutex::new(Inner::default()),
            seq: AtomicU64::new(0),
            created: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Simulated duration of every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a resource as already existing
    pub fn seed(
        &self,
        category: ResourceCategory,
        qualified_name: &str,
        attributes: ProviderAttributes,
    ) {
        self.lock()
            .resources
            .insert(store_key(category, qualified_name), attributes);
    }

    /// Make the next call of `kind` for resource `name` fail with `error`.
    /// Scripted failures queue up and are consumed in order.
    pub fn fail_next(&self, kind: CallKind, name: &str, error: CloudError) {
        self.lock()
            .failures
            .entry((kind, name.to_string()))
            .or_default()
            .push_back(error);
    }

    /// Make the next `times` creates of `name` fail with `error`
    pub fn fail_create(&self, name: &str, times: usize, error: CloudError) {
        for _ in 0..times {
            self.fail_next(CallKind::Create, name, error.clone());
        }
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        let mut calls = self.lock().calls.clone();
        calls.sort_by_key(|c| c.seq);
        calls
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind == kind).count()
    }

    pub fn count_for(&self, kind: CallKind, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind && c.resource == name)
            .count()
    }

    /// Highest number of calls observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wrap one call: track concurrency, apply latency, consume scripted
    /// failures and record the outcome.
    async fn call<T>(
        &self,
        kind: CallKind,
        identity: &ResourceIdentity,
        op: impl FnOnce(&mut Inner) -> Result<T>,
    ) -> Result<T> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let started_at = Instant::now();
        let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = {
            let mut inner = self.lock();
            let scripted = inner
                .failures
                .get_mut(&(kind, identity.name.clone()))
                .and_then(VecDeque::pop_front);
            let result = match scripted {
                Some(error) => Err(error),
                None => op(&mut inner),
            };
            inner.calls.push(CallRecord {
                seq,
                kind,
                resource: identity.name.clone(),
                category: identity.category,
                started_at,
                finished_at: Instant::now(),
                succeeded: result.is_ok(),
            });
            result
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug!(provider = %self.name, ?kind, resource = %identity, ok = result.is_ok(), "In-memory call");
        result
    }
}

fn store_key(category: ResourceCategory, qualified_name: &str) -> String {
    format!("{}:{}", category, qualified_name)
}

fn identity_key(identity: &ResourceIdentity) -> String {
    store_key(identity.category, &identity.qualified_name)
}

#[async_trait]
impl CloudProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, identity: &ResourceIdentity) -> Result<bool> {
        self.call(CallKind::Exists, identity, |inner| {
            Ok(inner.resources.contains_key(&identity_key(identity)))
        })
        .await
    }

    async fn create(&self, resource: &ResourceConfig) -> Result<ProviderAttributes> {
        let identity = &resource.identity;
        let serial = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        self.call(CallKind::Create, identity, |inner| {
            let key = identity_key(identity);
            if inner.resources.contains_key(&key) {
                return Err(CloudError::Rejected(format!("{} already exists", identity)));
            }

            let mut attributes = ProviderAttributes::new()
                .with_instance_id(format!("{}-{:04}", identity.qualified_name, serial))
                .with_status(ResourceStatus::Running);
            if identity.category == ResourceCategory::Servers {
                let host = serial % 250 + 1;
                attributes = attributes
                    .with_address(format!("203.0.113.{}", host))
                    .with_private_address(format!("10.0.0.{}", host));
            }
            for (key, value) in &resource.tags {
                attributes = attributes.with_extra(format!("tag:{}", key), value.clone().into());
            }

            inner.resources.insert(key, attributes.clone());
            Ok(attributes)
        })
        .await
    }

    async fn describe(&self, identity: &ResourceIdentity) -> Result<ProviderAttributes> {
        self.call(CallKind::Describe, identity, |inner| {
            inner
                .resources
                .get(&identity_key(identity))
                .cloned()
                .ok_or_else(|| CloudError::ResourceNotFound(identity.to_string()))
        })
        .await
    }

    async fn destroy(&self, identity: &ResourceIdentity) -> Result<()> {
        self.call(CallKind::Destroy, identity, |inner| {
            inner
                .resources
                .remove(&identity_key(identity))
                .map(|_| ())
                .ok_or_else(|| CloudError::ResourceNotFound(identity.to_string()))
        })
        .await
    }
}
