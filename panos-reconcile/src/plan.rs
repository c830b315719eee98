//! Planning: desired value plus prior state to a planned value and action.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use serde_json::{Map, Value};

use crate::drift::{detect, detect_entries};
use crate::error::Result;
use crate::location::{canonicalize, DeviceDefaults};
use crate::reconcile::ordering::Position;
use crate::schema::{CollectionKeying, Kind, ListOrder, ObjectSchema, ResourceSchema, Shape};
use crate::validate::validate;
use crate::value::{entry_name, AttrPath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Create,
    Update,
    /// Immutable fields changed; the resource is destroyed and recreated.
    Replace { paths: Vec<String> },
    Delete,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Action::None => write!(f, "no changes"),
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update in place"),
            Action::Replace { paths } => write!(f, "replace ({})", paths.join(", ")),
            Action::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub action: Action,
    /// Desired value with defaults projected, canonical location and carried
    /// computed fields. `None` for deletions.
    pub planned: Option<Value>,
}

/// Plan the transition from `prior` state to `desired`.
///
/// Validation runs first; nothing else happens when it fails.
pub fn plan(
    schema: &ResourceSchema,
    desired: Option<&Value>,
    prior: Option<&Value>,
    defaults: &DeviceDefaults,
) -> Result<Plan> {
    let Some(desired) = desired else {
        let action = if prior.is_some() {
            Action::Delete
        } else {
            Action::None
        };
        return Ok(Plan {
            action,
            planned: None,
        });
    };

    let validated = validate(schema, desired, defaults)?;
    let mut planned = desired.as_object().cloned().unwrap_or_default();
    planned.insert("location".to_string(), validated.scope.to_value());
    let prior_obj = prior.and_then(Value::as_object);

    match &schema.shape {
        Shape::Entry | Shape::Singleton { .. } => {
            project_defaults(&schema.body, &mut planned);
            if let Some(prior) = prior_obj {
                carry_computed(&schema.body, &mut planned, prior);
            }
        }
        Shape::Collection { list, keying } => {
            if let Some(Value::Array(items)) = planned.get_mut(*list) {
                for item in items.iter_mut().filter_map(Value::as_object_mut) {
                    project_defaults(&schema.body, item);
                }
                let prior_items = prior_obj
                    .and_then(|p| p.get(*list))
                    .and_then(Value::as_array);
                if let (CollectionKeying::Uuid, Some(prior_items)) = (keying, prior_items) {
                    carry_by_identity(&schema.body, items, prior_items);
                }
            }
        }
    }

    let Some(prior) = prior_obj else {
        return Ok(Plan {
            action: Action::Create,
            planned: Some(Value::Object(planned)),
        });
    };

    let mut paths = Vec::new();
    let prior_scope = canonicalize(prior.get("location"), defaults).ok();
    if prior_scope.as_ref() != Some(&validated.scope) {
        paths.push("location".to_string());
    }
    if schema.shape == Shape::Entry && prior.get("name") != planned.get("name") {
        paths.push("name".to_string());
    }

    let action = if !paths.is_empty() {
        Action::Replace { paths }
    } else if changed(schema, &planned, prior, &validated.position) {
        Action::Update
    } else {
        Action::None
    };
    Ok(Plan {
        action,
        planned: Some(Value::Object(planned)),
    })
}

fn changed(
    schema: &ResourceSchema,
    planned: &Map<String, Value>,
    prior: &Map<String, Value>,
    position: &Position,
) -> bool {
    match &schema.shape {
        Shape::Entry | Shape::Singleton { .. } => !detect(&schema.body, planned, prior).is_empty(),
        Shape::Collection { list, keying } => {
            let empty = Vec::new();
            let want = planned.get(*list).and_then(Value::as_array).unwrap_or(&empty);
            let seen = prior.get(*list).and_then(Value::as_array).unwrap_or(&empty);
            let order = match keying {
                CollectionKeying::Set => ListOrder::Set,
                CollectionKeying::Ordered | CollectionKeying::Uuid => ListOrder::Ordered,
            };
            let prior_position =
                Position::parse(prior.get("position"), &AttrPath::attr_root("position"))
                    .unwrap_or_default();
            !detect_entries(&schema.body, order, want, seen, &AttrPath::attr_root(list)).is_empty()
                || (*keying != CollectionKeying::Set && prior_position != *position)
        }
    }
}

/// Fill absent attributes that carry a schema default, recursively.
pub fn project_defaults(schema: &ObjectSchema, object: &mut Map<String, Value>) {
    for attr in &schema.attributes {
        match object.get_mut(attr.name) {
            None => {
                // A one-of arm must never be filled in behind the user's back.
                let in_group = schema.one_of.iter().any(|g| g.arms.contains(&attr.name));
                if let (Some(default), false) = (&attr.default, in_group) {
                    object.insert(attr.name.to_string(), default.clone());
                }
            }
            Some(value) => project_value(&attr.kind, value),
        }
    }
}

fn project_value(kind: &Kind, value: &mut Value) {
    match kind {
        Kind::Object(schema) => {
            if let Some(object) = value.as_object_mut() {
                project_defaults(schema, object);
            }
        }
        Kind::Variant(schema) => {
            if let Some(object) = value.as_object_mut() {
                for arm in &schema.arms {
                    if let Some(inner) = object.get_mut(arm.name) {
                        project_value(&arm.kind, inner);
                    }
                }
            }
        }
        Kind::Entries { entry, .. } => {
            if let Some(items) = value.as_array_mut() {
                for item in items.iter_mut().filter_map(Value::as_object_mut) {
                    project_defaults(entry, item);
                }
            }
        }
        _ => {}
    }
}

fn carry_computed(schema: &ObjectSchema, planned: &mut Map<String, Value>, prior: &Map<String, Value>) {
    for attr in schema.attributes.iter().filter(|a| a.is_computed()) {
        if let Some(value) = prior.get(attr.name).filter(|v| !v.is_null()) {
            planned
                .entry(attr.name.to_string())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Pair planned entries with prior entries, by name first, then by position
/// among the leftovers, and carry computed fields across each pair.
fn carry_by_identity(schema: &ObjectSchema, planned: &mut [Value], prior: &[Value]) {
    let mut taken = HashSet::new();
    let mut pending = Vec::new();
    for (idx, item) in planned.iter_mut().enumerate() {
        let matched = entry_name(item).and_then(|name| {
            prior
                .iter()
                .position(|p| entry_name(p) == Some(name))
        });
        match (matched, item.as_object_mut()) {
            (Some(prior_idx), Some(object)) => {
                taken.insert(prior_idx);
                if let Some(prior_obj) = prior[prior_idx].as_object() {
                    carry_computed(schema, object, prior_obj);
                }
            }
            _ => pending.push(idx),
        }
    }
    for idx in pending {
        if taken.contains(&idx) {
            continue;
        }
        let (Some(object), Some(prior_obj)) = (
            planned[idx].as_object_mut(),
            prior.get(idx).and_then(Value::as_object),
        ) else {
            continue;
        };
        taken.insert(idx);
        carry_computed(schema, object, prior_obj);
    }
}
