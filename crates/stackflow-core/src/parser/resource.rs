//! Resource stanza parsing and preparation

use super::scope::parse_scope_refs;
use super::{DATABASE_CREDENTIALS, SERVER_COMMON_ATTRIBUTES};
use crate::error::{Result, StackError};
use crate::model::{ResourceCategory, ResourceDefinition, StackSettings};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const PROVIDER: &str = "provider";
const HOSTNAME: &str = "hostname";
const CONFIG_SCOPES: &str = "config_scopes";
const GROUPS: &str = "groups";
const TAGS: &str = "tags";
const INSTANCE_COUNT: &str = "instance_count";

/// Keys lifted out of the attribute mapping into dedicated fields
const STRUCTURAL_KEYS: &[&str] = &[
    PROVIDER,
    HOSTNAME,
    CONFIG_SCOPES,
    GROUPS,
    TAGS,
    INSTANCE_COUNT,
];

const REGION: &str = "region_name";
const AVAILABILITY_ZONE: &str = "availability_zone";
const DB_NAME: &str = "db_name";
const ADMIN_USER: &str = "admin_username";
const ADMIN_PASS: &str = "admin_password";
const TAG_STACK: &str = "stack";
const TAG_ROLE: &str = "role";

pub(super) fn parse_category(
    category: ResourceCategory,
    value: &Value,
) -> Result<BTreeMap<String, ResourceDefinition>> {
    let entries = value.as_object().ok_or_else(|| {
        StackError::config(format!(
            "resource category '{}' must be a mapping of name to definition",
            category
        ))
    })?;

    let mut parsed = BTreeMap::new();
    for (name, entry) in entries {
        let (def, count) = parse_resource(category, name, entry)?;
        for instance in expand_instances(def, count) {
            if parsed.contains_key(&instance.name) {
                return Err(StackError::config(format!(
                    "{} '{}' is declared twice (instance names are '<name>-<n>')",
                    category, instance.name
                )));
            }
            parsed.insert(instance.name.clone(), instance);
        }
    }
    Ok(parsed)
}

/// Clone a server `count` times as `<name>-1` .. `<name>-<count>`. Every
/// clone keeps the declared name as its server class.
fn expand_instances(def: ResourceDefinition, count: u64) -> Vec<ResourceDefinition> {
    if count == 1 {
        return vec![def];
    }
    (1..=count)
        .map(|n| {
            let mut instance = def.clone();
            instance.name = format!("{}-{}", def.name, n);
            instance.server_class = Some(def.name.clone());
            instance
        })
        .collect()
}

fn parse_instance_count(def: &ResourceDefinition, fields: &Map<String, Value>) -> Result<u64> {
    let Some(value) = fields.get(INSTANCE_COUNT) else {
        return Ok(1);
    };
    if def.category != ResourceCategory::Servers || def.is_pre_provisioned() {
        return Err(StackError::config(format!(
            "'{}' is only allowed on cloud servers, not on {} '{}'",
            INSTANCE_COUNT, def.category, def.name
        )));
    }
    match value.as_u64() {
        Some(count) if count >= 1 => Ok(count),
        _ => Err(StackError::config(format!(
            "'{}' of '{}' must be a positive integer, got {}",
            INSTANCE_COUNT, def.name, value
        ))),
    }
}

fn parse_resource(
    category: ResourceCategory,
    name: &str,
    entry: &Value,
) -> Result<(ResourceDefinition, u64)> {
    if name.is_empty() {
        return Err(StackError::config(format!(
            "resource names in '{}' must not be empty",
            category
        )));
    }
    let fields = entry.as_object().ok_or_else(|| {
        StackError::config(format!("{} '{}' must be a mapping", category, name))
    })?;

    let mut def = ResourceDefinition::new(category, name);
    def.provider = optional_string(fields, PROVIDER, name)?;
    def.hostname = optional_string(fields, HOSTNAME, name)?;

    if let Some(scopes) = fields.get(CONFIG_SCOPES) {
        def.config_scopes = parse_scope_refs(name, scopes)?;
    }
    if let Some(groups) = fields.get(GROUPS) {
        def.groups = string_list(groups, GROUPS, name)?;
    }
    if let Some(tags) = fields.get(TAGS) {
        def.tags = parse_tags(tags, name)?;
    }

    def.attributes = fields
        .iter()
        .filter(|(key, _)| !STRUCTURAL_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    check_identity(&def)?;
    let count = parse_instance_count(&def, fields)?;
    Ok((def, count))
}

/// Servers need a provider or a hostname; every other category is
/// provisioned and needs a provider.
fn check_identity(def: &ResourceDefinition) -> Result<()> {
    match def.category {
        ResourceCategory::Servers if def.provider.is_none() && def.hostname.is_none() => {
            Err(StackError::config(format!(
                "server '{}' needs either a 'provider' or a 'hostname'",
                def.name
            )))
        }
        ResourceCategory::Servers => Ok(()),
        category if def.provider.is_none() => Err(StackError::config(format!(
            "{} '{}' is missing required key 'provider'",
            category, def.name
        ))),
        _ => Ok(()),
    }
}

fn optional_string(fields: &Map<String, Value>, key: &str, owner: &str) -> Result<Option<String>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(other) => Err(StackError::config(format!(
            "'{}' of '{}' must be a non-empty string, got {}",
            key, owner, other
        ))),
    }
}

fn string_list(value: &Value, key: &str, owner: &str) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| {
        StackError::config(format!("'{}' of '{}' must be a sequence", key, owner))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                StackError::config(format!(
                    "'{}' of '{}' must contain only strings, got {}",
                    key, owner, item
                ))
            })
        })
        .collect()
}

fn parse_tags(value: &Value, owner: &str) -> Result<BTreeMap<String, String>> {
    let tags = value
        .as_object()
        .ok_or_else(|| StackError::config(format!("'tags' of '{}' must be a mapping", owner)))?;
    tags.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(_) | Value::Bool(_) => value.to_string(),
                other => {
                    return Err(StackError::config(format!(
                        "tag '{}' of '{}' must be a scalar, got {}",
                        key, owner, other
                    )));
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

/// Apply the stack-wide preparation rules to freshly parsed resources
pub(super) fn prepare_resources(
    resources: &mut BTreeMap<ResourceCategory, BTreeMap<String, ResourceDefinition>>,
    root: &Map<String, Value>,
    stack_name: &str,
    settings: &StackSettings,
) -> Result<()> {
    if let Some(servers) = resources.get_mut(&ResourceCategory::Servers) {
        if let Some(common) = root.get(SERVER_COMMON_ATTRIBUTES) {
            apply_common_attributes(servers, common)?;
        }
        for server in servers.values_mut() {
            apply_server_defaults(server);
            apply_server_tags(server, stack_name, &settings.name_tag_name);
        }
    }

    if let Some(databases) = resources.get_mut(&ResourceCategory::Databases) {
        apply_database_defaults(databases, root.get(DATABASE_CREDENTIALS))?;
    }
    Ok(())
}

/// Distribute `server_common_attributes` among all servers; a server's own
/// attributes win.
fn apply_common_attributes(
    servers: &mut BTreeMap<String, ResourceDefinition>,
    common: &Value,
) -> Result<()> {
    let common = common.as_object().ok_or_else(|| {
        StackError::config(format!("'{}' must be a mapping", SERVER_COMMON_ATTRIBUTES))
    })?;
    if let Some(key) = common
        .keys()
        .find(|key| STRUCTURAL_KEYS.contains(&key.as_str()))
    {
        return Err(StackError::config(format!(
            "'{}' cannot set '{}'; declare it on each server",
            SERVER_COMMON_ATTRIBUTES, key
        )));
    }

    for server in servers.values_mut() {
        for (key, value) in common {
            server
                .attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
    Ok(())
}

/// Cloud servers land in their region unless an availability zone is given
fn apply_server_defaults(server: &mut ResourceDefinition) {
    if server.provider.is_none() || server.attributes.contains_key(AVAILABILITY_ZONE) {
        return;
    }
    if let Some(region) = server.attributes.get(REGION).cloned() {
        server.attributes.insert(AVAILABILITY_ZONE.to_string(), region);
    }
}

fn apply_server_tags(server: &mut ResourceDefinition, stack_name: &str, name_tag_name: &str) {
    server
        .tags
        .insert(TAG_STACK.to_string(), stack_name.to_string());
    server
        .tags
        .insert(TAG_ROLE.to_string(), server.class_name().to_string());
    if !name_tag_name.is_empty() {
        let qualified = server.qualified_name(stack_name);
        server.tags.insert(name_tag_name.to_string(), qualified);
    }
}

fn apply_database_defaults(
    databases: &mut BTreeMap<String, ResourceDefinition>,
    credentials: Option<&Value>,
) -> Result<()> {
    let credentials = match credentials {
        None => None,
        Some(value) => Some(value.as_object().ok_or_else(|| {
            StackError::config(format!("'{}' must be a mapping", DATABASE_CREDENTIALS))
        })?),
    };

    for db in databases.values_mut() {
        if !db.attributes.contains_key(DB_NAME) {
            db.attributes
                .insert(DB_NAME.to_string(), Value::String(db.name.clone()));
        }

        let Some(creds) = credentials.and_then(|all| all.get(&db.name)) else {
            continue;
        };
        for key in [ADMIN_USER, ADMIN_PASS] {
            let value = creds.get(key).ok_or_else(|| {
                StackError::config(format!(
                    "'{}' for database '{}' is missing '{}'",
                    DATABASE_CREDENTIALS, db.name, key
                ))
            })?;
            db.attributes.insert(key.to_string(), value.clone());
        }
    }
    Ok(())
}
