//! Custom resources and the diff-and-upsert step.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::client::ResourceStore;
use crate::error::{ClusterResult, ResourceError};

/// An unstructured Kubernetes object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomResource(pub Value);

impl CustomResource {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata()?.get("name")?.as_str()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata()?.get("resourceVersion")?.as_str()
    }

    /// Set `metadata.resourceVersion`, creating `metadata` if needed.
    pub fn set_resource_version(&mut self, version: &str) {
        let Some(root) = self.0.as_object_mut() else {
            return;
        };
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(
                "resourceVersion".to_string(),
                Value::String(version.to_string()),
            );
        }
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if a.is_f64() || b.is_f64() {
        a.as_f64() == b.as_f64()
    } else {
        a == b
    }
}

/// Whether `observed` contains everything in `desired`.
///
/// Objects compare key by key, recursing into values; keys only present
/// in `observed` are ignored. Arrays compare positionally and must have
/// the same length. Numbers compare by value regardless of int/float
/// representation. Any type mismatch is unequal.
pub fn is_subset(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Object(want), Value::Object(have)) => want
            .iter()
            .all(|(key, value)| have.get(key).is_some_and(|other| is_subset(value, other))),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(a, b)| is_subset(a, b))
        }
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (a, b) => a == b,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    Create,
    /// Replace, carrying the observed resource version.
    Update { resource_version: Option<String> },
    NoOp,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Create => "create",
            UpsertAction::Update { .. } => "update",
            UpsertAction::NoOp => "noop",
        }
    }
}

/// Decide what to do given the observed state.
pub fn plan_upsert(desired: &CustomResource, observed: Option<&CustomResource>) -> UpsertAction {
    match observed {
        None => UpsertAction::Create,
        Some(current) if is_subset(desired.as_value(), current.as_value()) => UpsertAction::NoOp,
        Some(current) => UpsertAction::Update {
            resource_version: current.resource_version().map(str::to_string),
        },
    }
}

/// Carry out a planned action.
pub async fn apply_upsert(
    store: &dyn ResourceStore,
    name: &str,
    mut desired: CustomResource,
    action: &UpsertAction,
) -> Result<(), ResourceError> {
    match action {
        UpsertAction::NoOp => return Ok(()),
        UpsertAction::Create => {
            store.create(&desired).await?;
        }
        UpsertAction::Update { resource_version } => {
            if let Some(version) = resource_version {
                desired.set_resource_version(version);
            }
            store.update(&desired).await?;
        }
    }
    info!(resource = name, action = action.as_str(), "data id resource applied");
    Ok(())
}

/// Probe by name, then create, update or leave alone.
///
/// `NotFound` from the existence check selects create; any other error aborts.
pub async fn ensure_resource(
    store: &dyn ResourceStore,
    name: &str,
    desired: CustomResource,
) -> ClusterResult<UpsertAction> {
    let observed = match store.get(name).await {
        Ok(resource) => Some(resource),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };
    let action = plan_upsert(&desired, observed.as_ref());
    apply_upsert(store, name, desired, &action).await?;
    Ok(action)
}
