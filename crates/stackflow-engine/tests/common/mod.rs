use serde_json::Value;
use stackflow_cloud::{InMemoryProvider, ProviderRegistry, RetryConfig};
use stackflow_core::{DependencyGraph, NodeId, ResourceCategory, load};
use std::sync::Arc;
use std::time::Duration;

pub fn graph(tree: Value) -> DependencyGraph {
    let stack = load(&tree).unwrap();
    DependencyGraph::build(&stack).unwrap()
}

pub fn registry(providers: &[&Arc<InMemoryProvider>]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(Arc::clone(*provider) as Arc<dyn stackflow_cloud::CloudProvider>);
    }
    registry
}

#[allow(dead_code)]
pub fn provider(name: &str) -> Arc<InMemoryProvider> {
    Arc::new(InMemoryProvider::new(name))
}

#[allow(dead_code)]
pub fn slow_provider(name: &str, latency_ms: u64) -> Arc<InMemoryProvider> {
    Arc::new(InMemoryProvider::new(name).with_latency(Duration::from_millis(latency_ms)))
}

#[allow(dead_code)]
pub fn retry(max_attempts: u32, initial_ms: u64) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(initial_ms),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
    }
}

pub fn id(category: ResourceCategory, name: &str) -> NodeId {
    NodeId::new(category, name)
}

#[allow(dead_code)]
pub fn server(name: &str) -> NodeId {
    id(ResourceCategory::Servers, name)
}
