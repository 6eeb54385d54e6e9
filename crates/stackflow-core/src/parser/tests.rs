use super::*;
use crate::model::{NodeId, ScopeRef};
use serde_json::json;

fn minimal() -> Value {
    json!({
        "name": "shop",
        "version": "1.4",
    })
}

#[test]
fn test_load_minimal_stack() {
    let stack = load(&minimal()).unwrap();
    assert_eq!(stack.name, "shop");
    assert_eq!(stack.version, "1.4");
    assert!(stack.playbooks.is_empty());
    assert_eq!(stack.resource_count(), 0);
    assert!(stack.scopes.is_empty());
    assert_eq!(stack.settings.name_tag_name, "Name");
}

#[test]
fn test_numeric_version_is_stringified() {
    let stack = load(&json!({"name": "shop", "version": 2.9})).unwrap();
    assert_eq!(stack.version, "2.9");
}

#[test]
fn test_missing_name_is_config_error() {
    let result = load(&json!({"version": "1"}));
    assert!(matches!(result, Err(StackError::Config(msg)) if msg.contains("'name'")));
}

#[test]
fn test_root_must_be_mapping() {
    assert!(matches!(load(&json!(["a"])), Err(StackError::Config(_))));
}

#[test]
fn test_parse_resources_and_scopes() {
    let tree = json!({
        "name": "shop",
        "version": "1",
        "playbooks": ["site.yml", "web.yml"],
        "security_groups": {
            "web-sg": {"provider": "aws", "region_name": "us-east-1", "rules": []}
        },
        "servers": {
            "web": {
                "provider": "aws",
                "region_name": "us-east-1",
                "security_groups": ["web-sg"],
                "groups": ["frontend"],
                "config_scopes": ["app", {"port": 8080}]
            },
            "legacy": {
                "hostname": "legacy.example.com",
                "config_scopes": ["app"]
            }
        },
        "app": {"log_level": "info"}
    });

    let stack = load(&tree).unwrap();
    assert_eq!(stack.playbooks, vec!["site.yml", "web.yml"]);
    assert_eq!(stack.resource_count(), 3);
    assert!(stack.scope("app").is_some());

    let web = stack
        .resource(&NodeId::new(ResourceCategory::Servers, "web"))
        .unwrap();
    assert_eq!(web.provider.as_deref(), Some("aws"));
    assert_eq!(web.groups, vec!["frontend"]);
    assert_eq!(web.config_scopes.len(), 2);
    assert_eq!(web.config_scopes[0], ScopeRef::Named("app".to_string()));
    assert!(matches!(&web.config_scopes[1], ScopeRef::Inline(s) if s.get("port") == Some(&json!(8080))));
    // structural keys are not attributes
    assert!(web.attribute("config_scopes").is_none());
    assert!(web.attribute("provider").is_none());
    assert_eq!(web.attribute("security_groups"), Some(&json!(["web-sg"])));

    let legacy = stack
        .resource(&NodeId::new(ResourceCategory::Servers, "legacy"))
        .unwrap();
    assert!(legacy.is_pre_provisioned());
    assert_eq!(legacy.hostname.as_deref(), Some("legacy.example.com"));
}

#[test]
fn test_category_value_must_be_mapping() {
    let mut tree = minimal();
    tree["servers"] = json!(["web"]);
    let err = load(&tree).unwrap_err();
    assert!(err.to_string().contains("servers"));
}

#[test]
fn test_reserved_category_is_never_a_scope() {
    // `queues` holding scope-like scalar data is rejected, not reinterpreted
    let mut tree = minimal();
    tree["queues"] = json!("not-a-mapping");
    assert!(matches!(load(&tree), Err(StackError::Config(_))));
}

#[test]
fn test_unreserved_non_mapping_key_is_rejected() {
    let mut tree = minimal();
    tree["feature_flags"] = json!(true);
    let err = load(&tree).unwrap_err();
    assert!(err.to_string().contains("feature_flags"));
}

#[test]
fn test_settings_keys_are_not_scopes() {
    let mut tree = minimal();
    tree["deployer_credentials"] = json!({"aws": {"access_key": "x"}});
    tree["logging"] = json!({"console_level": "DEBUG"});
    tree["ansible"] = json!({"verbosity": 2});
    let stack = load(&tree).unwrap();
    assert!(stack.scopes.is_empty());
    assert_eq!(stack.settings.ansible, Some(json!({"verbosity": 2})));
}

#[test]
fn test_server_without_identity_is_rejected() {
    let mut tree = minimal();
    tree["servers"] = json!({"web": {"instance_type": "t3.micro"}});
    let err = load(&tree).unwrap_err();
    assert!(err.to_string().contains("'web'"));
}

#[test]
fn test_cloud_resource_requires_provider() {
    let mut tree = minimal();
    tree["buckets"] = json!({"assets": {"region_name": "us-east-1"}});
    let err = load(&tree).unwrap_err();
    assert!(err.to_string().contains("provider"));
}

#[test]
fn test_bad_scope_entry_is_rejected() {
    let mut tree = minimal();
    tree["servers"] = json!({"web": {"hostname": "h", "config_scopes": [42]}});
    assert!(matches!(load(&tree), Err(StackError::Config(_))));
}

#[test]
fn test_server_common_attributes_are_distributed() {
    let mut tree = minimal();
    tree["server_common_attributes"] = json!({"instance_type": "t3.small", "ssh_key_name": "ops"});
    tree["servers"] = json!({
        "web": {"provider": "aws", "instance_type": "t3.large"},
        "worker": {"provider": "aws"}
    });
    let stack = load(&tree).unwrap();
    let web = stack.resource(&NodeId::new(ResourceCategory::Servers, "web")).unwrap();
    let worker = stack.resource(&NodeId::new(ResourceCategory::Servers, "worker")).unwrap();

    assert_eq!(web.attribute_str("instance_type"), Some("t3.large"));
    assert_eq!(web.attribute_str("ssh_key_name"), Some("ops"));
    assert_eq!(worker.attribute_str("instance_type"), Some("t3.small"));
}

#[test]
fn test_common_attributes_cannot_set_provider() {
    let mut tree = minimal();
    tree["server_common_attributes"] = json!({"provider": "aws"});
    tree["servers"] = json!({"web": {"hostname": "web.local"}});
    assert!(matches!(load(&tree), Err(StackError::Config(_))));
}

#[test]
fn test_availability_zone_defaults_to_region() {
    let mut tree = minimal();
    tree["servers"] = json!({
        "web": {"provider": "aws", "region_name": "us-west-2"},
        "api": {"provider": "aws", "region_name": "us-west-2", "availability_zone": "us-west-2b"}
    });
    let stack = load(&tree).unwrap();
    let web = stack.resource(&NodeId::new(ResourceCategory::Servers, "web")).unwrap();
    let api = stack.resource(&NodeId::new(ResourceCategory::Servers, "api")).unwrap();
    assert_eq!(web.attribute_str("availability_zone"), Some("us-west-2"));
    assert_eq!(api.attribute_str("availability_zone"), Some("us-west-2b"));
}

#[test]
fn test_server_tags() {
    let mut tree = minimal();
    tree["servers"] = json!({"web": {"provider": "aws", "tags": {"team": "storefront"}}});
    let stack = load(&tree).unwrap();
    let web = stack.resource(&NodeId::new(ResourceCategory::Servers, "web")).unwrap();
    assert_eq!(web.tags["stack"], "shop");
    assert_eq!(web.tags["role"], "web");
    assert_eq!(web.tags["Name"], "shop-web");
    assert_eq!(web.tags["team"], "storefront");
}

#[test]
fn test_custom_and_disabled_name_tag() {
    let mut tree = minimal();
    tree["name_tag_name"] = json!("descriptor");
    tree["servers"] = json!({"web": {"provider": "aws"}});
    let stack = load(&tree).unwrap();
    let web = stack.resource(&NodeId::new(ResourceCategory::Servers, "web")).unwrap();
    assert_eq!(web.tags["descriptor"], "shop-web");
    assert!(!web.tags.contains_key("Name"));

    tree["name_tag_name"] = json!("");
    let stack = load(&tree).unwrap();
    let web = stack.resource(&NodeId::new(ResourceCategory::Servers, "web")).unwrap();
    assert_eq!(web.tags.len(), 2);
}

#[test]
fn test_database_defaults_and_credentials() {
    let mut tree = minimal();
    tree["databases"] = json!({
        "orders": {"provider": "aws", "instance_type": "db.t3.micro"},
        "reports": {"provider": "aws", "db_name": "analytics"}
    });
    tree["database_credentials"] = json!({
        "orders": {"admin_username": "root", "admin_password": "hunter2"}
    });
    let stack = load(&tree).unwrap();
    let orders = stack.resource(&NodeId::new(ResourceCategory::Databases, "orders")).unwrap();
    let reports = stack.resource(&NodeId::new(ResourceCategory::Databases, "reports")).unwrap();

    assert_eq!(orders.attribute_str("db_name"), Some("orders"));
    assert_eq!(orders.attribute_str("admin_username"), Some("root"));
    assert_eq!(orders.attribute_str("admin_password"), Some("hunter2"));
    assert_eq!(reports.attribute_str("db_name"), Some("analytics"));
    assert!(reports.attribute("admin_username").is_none());
}

#[test]
fn test_incomplete_database_credentials() {
    let mut tree = minimal();
    tree["databases"] = json!({"orders": {"provider": "aws"}});
    tree["database_credentials"] = json!({"orders": {"admin_username": "root"}});
    let err = load(&tree).unwrap_err();
    assert!(err.to_string().contains("admin_password"));
}

#[test]
fn test_provisioning_section_must_be_mapping() {
    let mut tree = minimal();
    tree["provisioning"] = json!(4);
    assert!(matches!(load(&tree), Err(StackError::Config(_))));

    tree["provisioning"] = json!({"workers": 4});
    let stack = load(&tree).unwrap();
    assert_eq!(stack.settings.provisioning, Some(json!({"workers": 4})));
}

#[test]
fn test_is_reserved_key() {
    assert!(is_reserved_key("servers"));
    assert!(is_reserved_key("load_balancers"));
    assert!(is_reserved_key("database_credentials"));
    assert!(!is_reserved_key("webapp"));
}

#[test]
fn test_instance_count_expands_server() {
    let mut tree = minimal();
    tree["servers"] = json!({
        "web": {
            "provider": "aws",
            "instance_count": 3,
            "config_scopes": [{"port": 80}],
            "groups": ["frontend"]
        }
    });
    let stack = load(&tree).unwrap();

    let names: Vec<&str> = stack.servers().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["web-1", "web-2", "web-3"]);
    for server in stack.servers() {
        assert_eq!(server.class_name(), "web");
        assert_eq!(server.groups, vec!["frontend"]);
        assert_eq!(server.config_scopes.len(), 1);
        assert_eq!(server.tags["role"], "web");
        assert!(server.attribute("instance_count").is_none());
    }
    let second = stack.resource(&NodeId::new(ResourceCategory::Servers, "web-2")).unwrap();
    assert_eq!(second.tags["Name"], "shop-web-2");
    assert!(!stack.contains(ResourceCategory::Servers, "web"));
}

#[test]
fn test_single_instance_keeps_declared_name() {
    let mut tree = minimal();
    tree["servers"] = json!({"web": {"provider": "aws", "instance_count": 1}});
    let stack = load(&tree).unwrap();
    let web = stack.resource(&NodeId::new(ResourceCategory::Servers, "web")).unwrap();
    assert!(web.server_class.is_none());
    assert_eq!(web.class_name(), "web");
}

#[test]
fn test_invalid_instance_count() {
    for bad in [json!(0), json!(-2), json!("3"), json!(1.5)] {
        let mut tree = minimal();
        tree["servers"] = json!({"web": {"provider": "aws", "instance_count": bad}});
        assert!(matches!(load(&tree), Err(StackError::Config(_))), "{bad}");
    }

    let mut tree = minimal();
    tree["servers"] = json!({"legacy": {"hostname": "legacy.example.com", "instance_count": 2}});
    assert!(matches!(load(&tree), Err(StackError::Config(_))));

    let mut tree = minimal();
    tree["queues"] = json!({"jobs": {"provider": "aws", "instance_count": 2}});
    assert!(matches!(load(&tree), Err(StackError::Config(_))));
}

#[test]
fn test_instance_name_clash_is_rejected() {
    let mut tree = minimal();
    tree["servers"] = json!({
        "web": {"provider": "aws", "instance_count": 2},
        "web-2": {"provider": "aws"}
    });
    let err = load(&tree).unwrap_err();
    assert!(err.to_string().contains("web-2"), "{err}");
}
