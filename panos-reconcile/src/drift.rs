//! Drift detection between a declaration and observed server state.
//!
//! Only declared fields are compared. A field absent from the declaration is
//! never drift; an explicit `null` is authoritative and any server value for
//! it is reported as [`DriftKind::Cleared`].

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use serde_json::{Map, Value};

use crate::codec::variant::selected_arms;
use crate::schema::{Kind, ListOrder, ObjectSchema};
use crate::value::{entry_name, field, AttrPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// Both sides set, values differ.
    Changed,
    /// Declared `null`, server has a value.
    Cleared,
    /// Declared a value, server has none.
    Missing,
}

impl Display for DriftKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DriftKind::Changed => write!(f, "changed"),
            DriftKind::Cleared => write!(f, "cleared"),
            DriftKind::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub path: AttrPath,
    pub kind: DriftKind,
    pub declared: Value,
    pub observed: Option<Value>,
}

impl Display for Drift {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.kind)
    }
}

/// Drift of the declared attributes of `schema` against `observed`.
pub fn detect(
    schema: &ObjectSchema,
    declared: &Map<String, Value>,
    observed: &Map<String, Value>,
) -> Vec<Drift> {
    let mut out = Vec::new();
    compare_object(schema, declared, observed, &AttrPath::root(), &mut out);
    out
}

/// Drift of a declared entry list against an observed one.
///
/// `order` decides whether position is significant. Entries match by name.
pub fn detect_entries(
    schema: &ObjectSchema,
    order: ListOrder,
    declared: &[Value],
    observed: &[Value],
    path: &AttrPath,
) -> Vec<Drift> {
    let mut out = Vec::new();
    compare_entries(schema, order, declared, observed, path, &mut out);
    out
}

fn compare_object(
    schema: &ObjectSchema,
    declared: &Map<String, Value>,
    observed: &Map<String, Value>,
    path: &AttrPath,
    out: &mut Vec<Drift>,
) {
    for attr in &schema.attributes {
        if attr.is_computed() {
            continue;
        }
        let attr_path = path.attr(attr.name);
        match declared.get(attr.name) {
            None => {}
            Some(Value::Null) => {
                if let Some(seen) = field(observed, attr.name) {
                    out.push(Drift {
                        path: attr_path,
                        kind: DriftKind::Cleared,
                        declared: Value::Null,
                        observed: Some(seen.clone()),
                    });
                }
            }
            Some(want) => match field(observed, attr.name) {
                Some(seen) => compare_value(&attr.kind, want, seen, &attr_path, out),
                None if attr.default.as_ref() == Some(want) || is_vacuous(want) => {}
                None => out.push(Drift {
                    path: attr_path,
                    kind: DriftKind::Missing,
                    declared: want.clone(),
                    observed: None,
                }),
            },
        }
    }
}

/// Declared values the server cannot distinguish from absence.
fn is_vacuous(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.is_empty())
}

fn compare_value(kind: &Kind, want: &Value, seen: &Value, path: &AttrPath, out: &mut Vec<Drift>) {
    let changed = |out: &mut Vec<Drift>| {
        out.push(Drift {
            path: path.clone(),
            kind: DriftKind::Changed,
            declared: want.clone(),
            observed: Some(seen.clone()),
        })
    };
    match kind {
        Kind::Members {
            order: ListOrder::Set,
            ..
        } => {
            if member_set(want) != member_set(seen) {
                changed(out);
            }
        }
        // `{}` against any present marker element is equal.
        Kind::Empty => {}
        Kind::Object(schema) => match (want.as_object(), seen.as_object()) {
            (Some(want), Some(seen)) => compare_object(schema, want, seen, path, out),
            _ => changed(out),
        },
        Kind::Variant(schema) => {
            let (Some(want_obj), Some(seen_obj)) = (want.as_object(), seen.as_object()) else {
                return changed(out);
            };
            let arms = schema.arm_names();
            let want_arm = selected_arms(want_obj, &arms);
            let seen_arm = selected_arms(seen_obj, &arms);
            if want_arm != seen_arm {
                return changed(out);
            }
            if let Some(arm) = want_arm.first().and_then(|name| schema.arm(name)) {
                if let (Some(w), Some(s)) = (field(want_obj, arm.name), field(seen_obj, arm.name)) {
                    compare_value(&arm.kind, w, s, &path.attr(arm.name), out);
                }
            }
        }
        Kind::Entries { order, entry } => match (want.as_array(), seen.as_array()) {
            (Some(want), Some(seen)) => compare_entries(entry, *order, want, seen, path, out),
            _ => changed(out),
        },
        Kind::Text(_) | Kind::Int { .. } | Kind::Bool | Kind::Enum(_) | Kind::Members { .. } => {
            if want != seen {
                changed(out);
            }
        }
    }
}

fn compare_entries(
    schema: &ObjectSchema,
    order: ListOrder,
    want: &[Value],
    seen: &[Value],
    path: &AttrPath,
    out: &mut Vec<Drift>,
) {
    let want_names: Vec<&str> = want.iter().filter_map(entry_name).collect();
    let seen_names: Vec<&str> = seen.iter().filter_map(entry_name).collect();
    let membership_differs = want_names.iter().collect::<HashSet<_>>()
        != seen_names.iter().collect::<HashSet<_>>();
    let order_differs = order == ListOrder::Ordered && want_names != seen_names;
    if membership_differs || order_differs {
        out.push(Drift {
            path: path.clone(),
            kind: DriftKind::Changed,
            declared: Value::Array(want.to_vec()),
            observed: Some(Value::Array(seen.to_vec())),
        });
        return;
    }
    for item in want {
        let Some(name) = entry_name(item) else {
            continue;
        };
        let observed = seen.iter().find(|s| entry_name(s) == Some(name));
        if let (Some(w), Some(s)) = (item.as_object(), observed.and_then(Value::as_object)) {
            compare_object(schema, w, s, &path.key(name), out);
        }
    }
}

fn member_set(value: &Value) -> Option<HashSet<&str>> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
}

/// State to persist after reading `observed`.
///
/// Declared fields without drift keep their declared spelling, drifted
/// fields take the observed value, computed fields always come from the
/// server. A field absent from the declaration is carried only when `prior`
/// already tracked it.
pub fn reconcile_state(
    schema: &ObjectSchema,
    declared: &Map<String, Value>,
    observed: &Map<String, Value>,
    prior: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for attr in &schema.attributes {
        let name = attr.name;
        let seen = field(observed, name);
        if attr.is_computed() {
            if let Some(seen) = seen {
                out.insert(name.to_string(), seen.clone());
            }
            continue;
        }
        match declared.get(name) {
            None => {
                let tracked = prior.is_some_and(|p| p.contains_key(name));
                if let (true, Some(seen)) = (tracked, seen) {
                    out.insert(name.to_string(), seen.clone());
                }
            }
            Some(Value::Null) => {
                out.insert(name.to_string(), seen.cloned().unwrap_or(Value::Null));
            }
            Some(want) => {
                let Some(seen) = seen else {
                    if attr.default.as_ref() == Some(want) || is_vacuous(want) {
                        out.insert(name.to_string(), want.clone());
                    }
                    continue;
                };
                let mut drift = Vec::new();
                compare_value(&attr.kind, want, seen, &AttrPath::root(), &mut drift);
                let value = if drift.is_empty() {
                    want.clone()
                } else if let (Kind::Object(inner), Some(w), Some(s)) =
                    (&attr.kind, want.as_object(), seen.as_object())
                {
                    let inner_prior = prior
                        .and_then(|p| p.get(name))
                        .and_then(Value::as_object);
                    Value::Object(reconcile_state(inner, w, s, inner_prior))
                } else {
                    seen.clone()
                };
                out.insert(name.to_string(), value);
            }
        }
    }
    out
}

/// True when any declared field differs from `observed`.
pub fn has_drift(
    schema: &ObjectSchema,
    declared: &Map<String, Value>,
    observed: &Map<String, Value>,
) -> bool {
    !detect(schema, declared, observed).is_empty()
}
