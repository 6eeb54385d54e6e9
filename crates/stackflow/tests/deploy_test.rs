use serde_json::json;
use stackflow::Stack;
use stackflow_cloud::{CallKind, CloudError, InMemoryProvider, ProviderRegistry};
use stackflow_core::{NodeId, ResourceCategory};
use stackflow_inventory::HostError;
use std::sync::Arc;

const SHOP: &str = r#"
name: shop
version: 3
playbooks:
  - site.yml

common:
  ntp_server: pool.ntp.org
  log_level: info

web_tier:
  log_level: debug
  http_port: 8080

security_groups:
  web-sg:
    provider: mem
    rules:
      - port: 443
  db-sg:
    provider: mem
    rules:
      - port: 5432
        source: web-sg

databases:
  orders:
    provider: mem
    security_groups: [db-sg]

servers:
  web:
    provider: mem
    security_groups: [web-sg]
    databases: [orders]
    groups: [frontend]
    config_scopes:
      - common
      - web_tier
      - max_clients: 200
  legacy:
    hostname: legacy.example.com
    groups: [frontend, backoffice]
    config_scopes: [common]
"#;

fn setup() -> (Stack, Arc<InMemoryProvider>, ProviderRegistry) {
    let stack = Stack::from_yaml(SHOP).unwrap();
    let mem = Arc::new(InMemoryProvider::new("mem"));
    let registry = ProviderRegistry::new().with_provider(mem.clone());
    (stack, mem, registry)
}

#[tokio::test]
async fn test_deploy_builds_inventory() {
    let (stack, mem, registry) = setup();
    let outcome = stack.deploy(&registry).await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.inventory.errors);
    assert_eq!(mem.count(CallKind::Create), 4);

    let web = outcome.inventory.payload.by_server("web").unwrap();
    assert_eq!(web.get("log_level"), Some(&json!("debug")));
    assert_eq!(web.get("ntp_server"), Some(&json!("pool.ntp.org")));
    assert_eq!(web.get("max_clients"), Some(&json!(200)));
    assert_eq!(web.get("inventory_hostname"), Some(&json!(web.host)));
    assert!(web.get("instance_id").is_some());

    let legacy = outcome.inventory.payload.host("legacy.example.com").unwrap();
    assert_eq!(legacy.get("log_level"), Some(&json!("info")));
    assert!(legacy.get("instance_id").is_none());

    let executor = outcome.inventory.payload.to_executor_inventory();
    let mut frontend = vec![web.host.clone(), "legacy.example.com".to_string()];
    frontend.sort();
    assert_eq!(executor["frontend"], json!(frontend));
    assert_eq!(executor["backoffice"], json!(["legacy.example.com"]));
    assert_eq!(
        executor["_meta"]["hostvars"]["legacy.example.com"]["stack"],
        json!({"name": "shop", "version": "3"})
    );
}

#[tokio::test]
async fn test_redeploy_creates_nothing() {
    let (stack, mem, registry) = setup();
    let first = stack.deploy(&registry).await.unwrap();
    let second = stack.deploy(&registry).await.unwrap();

    assert!(second.is_success());
    assert_eq!(mem.count(CallKind::Create), 4);
    assert_eq!(second.report.summary().created, 0);
    assert_eq!(second.report.summary().reused, 4);
    assert_eq!(
        first.inventory.payload.by_server("web").map(|h| &h.host),
        second.inventory.payload.by_server("web").map(|h| &h.host)
    );
}

#[tokio::test]
async fn test_failed_dependency_drops_server_from_inventory() {
    let (stack, mem, registry) = setup();
    mem.fail_create("orders", 1, CloudError::Rejected("quota exceeded".into()));

    let outcome = stack.deploy(&registry).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(mem.count_for(CallKind::Exists, "web"), 0);
    assert!(matches!(
        outcome.inventory.error("web"),
        Some(HostError::NotProvisioned { .. })
    ));
    assert!(outcome.inventory.payload.host("legacy.example.com").is_some());
    let sg = NodeId::new(ResourceCategory::SecurityGroups, "web-sg");
    assert!(outcome.report.get(&sg).unwrap().is_provisioned());
}

#[tokio::test]
async fn test_gather_inventory_after_deploy() {
    let (stack, mem, registry) = setup();
    let deployed = stack.deploy(&registry).await.unwrap();
    let gathered = stack.gather_inventory(&registry).await.unwrap();

    assert!(gathered.is_success());
    assert_eq!(mem.count(CallKind::Create), 4);
    assert_eq!(
        deployed.inventory.payload.to_value(),
        gathered.inventory.payload.to_value()
    );
}

#[tokio::test]
async fn test_gather_without_deploy_reports_absent_servers() {
    let (stack, mem, registry) = setup();
    let gathered = stack.gather_inventory(&registry).await.unwrap();

    assert_eq!(mem.count(CallKind::Create), 0);
    assert!(gathered.inventory.error("web").is_some());
    assert_eq!(gathered.inventory.payload.len(), 1);
}

#[tokio::test]
async fn test_plan_before_and_after_deploy() {
    let (stack, _mem, registry) = setup();
    let before = stack.plan(&registry).await.unwrap();
    assert!(before.has_changes);
    assert_eq!(before.summary().create, 4);
    assert_eq!(before.summary().external, 1);

    stack.deploy(&registry).await.unwrap();
    let after = stack.plan(&registry).await.unwrap();
    assert!(!after.has_changes);
    assert_eq!(after.summary().reuse, 4);
}

#[tokio::test]
async fn test_unknown_provider_fails_before_any_call() {
    let stack = Stack::from_yaml(SHOP).unwrap();
    let other = Arc::new(InMemoryProvider::new("other"));
    let registry = ProviderRegistry::new().with_provider(other.clone());

    let err = stack.deploy(&registry).await.unwrap_err();
    assert!(err.to_string().contains("Failed to provision stack 'shop'"));
    assert!(other.calls().is_empty());
}

#[tokio::test]
async fn test_scope_defining_address_is_rejected_for_that_host() {
    let stack = Stack::from_yaml(
        r#"
name: shop
version: 1
servers:
  web:
    provider: mem
    config_scopes:
      - address: 192.0.2.1
  api:
    provider: mem
    config_scopes:
      - port: 9000
"#,
    )
    .unwrap();
    let mem = Arc::new(InMemoryProvider::new("mem"));
    let registry = ProviderRegistry::new().with_provider(mem.clone());

    let outcome = stack.deploy(&registry).await.unwrap();

    assert!(outcome.report.is_success());
    assert_eq!(
        outcome.inventory.error("web"),
        Some(&HostError::ReservedKeyCollision {
            host: "web".into(),
            key: "address".into()
        })
    );
    assert_eq!(outcome.inventory.errors.len(), 1);
    let api = outcome.inventory.payload.by_server("api").unwrap();
    assert_eq!(api.get("port"), Some(&json!(9000)));
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_instance_count_deploys_every_clone() {
    let stack = Stack::from_yaml(
        r#"
name: shop
version: 1
servers:
  web:
    provider: mem
    instance_count: 3
    groups: [frontend]
load_balancers:
  front:
    provider: mem
    members: [web]
"#,
    )
    .unwrap();
    let mem = Arc::new(InMemoryProvider::new("mem"));
    let registry = ProviderRegistry::new().with_provider(mem.clone());

    let outcome = stack.deploy(&registry).await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.inventory.errors);
    assert_eq!(mem.count(CallKind::Create), 4);
    assert_eq!(outcome.inventory.payload.len(), 3);
    assert_eq!(outcome.inventory.payload.groups()["frontend"].len(), 3);
    for n in 1..=3 {
        let host = outcome
            .inventory
            .payload
            .by_server(&format!("web-{n}"))
            .unwrap();
        assert_eq!(host.get("server_class"), Some(&json!("web")));
    }

    let front_started = mem
        .calls()
        .iter()
        .filter(|c| c.resource == "front")
        .map(|c| c.seq)
        .min()
        .unwrap();
    let last_web_create = mem
        .calls()
        .iter()
        .filter(|c| c.kind == CallKind::Create && c.resource.starts_with("web-"))
        .map(|c| c.seq)
        .max()
        .unwrap();
    assert!(front_started > last_web_create);
}
