//! Provider-owned sub-lists of a shared server list.
//!
//! The server list may hold foreign entries. They are never written or
//! moved; the owned entries are created, updated and deleted by name and then
//! ordered around them according to the declared [`Position`]. In uuid-keyed
//! containers entries are additionally tracked by their server uuid: renames
//! happen in place and moves address entries by uuid.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use xml_config_core::XmlNode;

use crate::codec::{decode_entry, encode_entry};
use crate::drift::has_drift;
use crate::error::{Error, Result};
use crate::schema::{CollectionKeying, ResourceSchema, Shape};
use crate::transport::{Anchor, EntryRef, ListQuery, Target};
use crate::value::{str_field, AttrPath};

use super::entry::name_of;
use super::ordering::{is_satisfied, minimal_moves, target_order, Position};
use super::{entry_state, is_not_found, is_unsupported, Session};

const UUID_ATTR: &str = "uuid";

/// Server list snapshot, in server order.
struct Listing {
    nodes: Vec<XmlNode>,
}

impl Listing {
    fn names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|n| n.name().map(ToString::to_string))
            .collect()
    }

    fn by_name(&self, name: &str) -> Option<&XmlNode> {
        self.nodes.iter().find(|n| n.name() == Some(name))
    }

    fn by_uuid(&self, uuid: &str) -> Option<&XmlNode> {
        self.nodes.iter().find(|n| n.attribute(UUID_ATTR) == Some(uuid))
    }

    /// Reference for a move: the uuid when the list is uuid-keyed and the
    /// entry has one, the name otherwise.
    fn entry_ref(&self, name: &str, uuid_keyed: bool) -> EntryRef {
        let uuid = self
            .by_name(name)
            .and_then(|n| n.attribute(UUID_ATTR))
            .filter(|_| uuid_keyed);
        match uuid {
            Some(uuid) => EntryRef::Uuid(uuid.to_string()),
            None => EntryRef::Name(name.to_string()),
        }
    }
}

fn list(session: &mut Session<'_>, step: &str, target: &Target) -> Result<Listing> {
    let nodes = session.rpc(step, target, |t| t.list(target, &ListQuery::default()))?;
    Ok(Listing { nodes })
}

fn keying(schema: &ResourceSchema) -> CollectionKeying {
    schema.keying().unwrap_or(CollectionKeying::Set)
}

fn item_path(schema: &ResourceSchema, name: &str) -> AttrPath {
    match &schema.shape {
        Shape::Collection { list, .. } => AttrPath::attr_root(list).key(name),
        _ => AttrPath::root().key(name),
    }
}

/// Prior entry tracking the same server entry as `node`.
fn prior_for<'p>(
    prior: &'p [Map<String, Value>],
    node: &XmlNode,
    uuid_keyed: bool,
) -> Option<&'p Map<String, Value>> {
    let uuid = node.attribute(UUID_ATTR).filter(|_| uuid_keyed);
    if let Some(uuid) = uuid {
        if let Some(found) = prior.iter().find(|p| str_field(p, UUID_ATTR) == Some(uuid)) {
            return Some(found);
        }
    }
    let name = node.name()?;
    prior.iter().find(|p| str_field(p, "name") == Some(name))
}

/// Apply the owned list `desired` and return the entries' state in declared
/// order.
pub fn apply(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    desired: &[Map<String, Value>],
    prior: &[Map<String, Value>],
    position: &Position,
) -> Result<Vec<Map<String, Value>>> {
    let keying = keying(schema);
    let uuid_keyed = keying == CollectionKeying::Uuid;
    let ordered = keying != CollectionKeying::Set;

    let desired_names = desired
        .iter()
        .map(|d| name_of(d).map(ToString::to_string))
        .collect::<Result<Vec<_>>>()?;
    let prior_names = prior
        .iter()
        .map(|p| name_of(p).map(ToString::to_string))
        .collect::<Result<Vec<_>>>()?;

    let snapshot = list(session, "list", target)?;
    let mut server_names = snapshot.names();

    if let Some(pivot) = position.pivot().filter(|_| ordered) {
        let owned = desired_names.iter().chain(&prior_names).any(|n| n == pivot);
        if owned || !server_names.iter().any(|n| n == pivot) {
            return Err(Error::PivotMissing {
                pivot: pivot.to_string(),
            });
        }
    }

    let mut renamed = HashSet::new();
    if uuid_keyed {
        for (item, name) in desired.iter().zip(&desired_names) {
            let Some(uuid) = str_field(item, UUID_ATTR) else {
                continue;
            };
            let Some(current) = snapshot.by_uuid(uuid).and_then(XmlNode::name) else {
                continue;
            };
            if current == name.as_str() || server_names.contains(name) {
                continue;
            }
            let entry = EntryRef::Uuid(uuid.to_string());
            match session.rpc("rename", target, |t| t.rename(target, &entry, name)) {
                Ok(()) => {
                    info!(resource = %target.resource, scope = %target.scope, from = current, name = %name, "renamed rule");
                    if let Some(slot) = server_names.iter_mut().find(|n| n.as_str() == current) {
                        *slot = name.clone();
                    }
                    renamed.insert(name.clone());
                }
                Err(err) if is_unsupported(&err) => {
                    warn!(resource = %target.resource, from = current, name = %name, "rename unsupported; rule will be recreated");
                }
                Err(err) => return Err(err),
            }
        }
    }

    let to_delete: Vec<String> = prior_names
        .iter()
        .filter(|n| !desired_names.contains(n) && server_names.contains(n))
        .cloned()
        .collect();

    let mut to_update = Vec::new();
    let mut to_create = Vec::new();
    for (item, name) in desired.iter().zip(&desired_names) {
        let node = if renamed.contains(name) {
            str_field(item, UUID_ATTR).and_then(|uuid| snapshot.by_uuid(uuid))
        } else {
            snapshot.by_name(name)
        };
        let Some(node) = node else {
            to_create.push((item, name));
            continue;
        };
        if !prior_names.contains(name) && !renamed.contains(name) {
            warn!(resource = %target.resource, scope = %target.scope, name = %name, "adopting existing entry");
        }
        let observed = decode_entry(&schema.body, node, &item_path(schema, name))?;
        if has_drift(&schema.body, item, &observed) {
            to_update.push((item, name));
        }
    }

    if !to_delete.is_empty() {
        match session.rpc("delete", target, |t| t.delete(target, &to_delete)) {
            Ok(()) => {}
            Err(err) if is_not_found(&err) => {}
            Err(err) => return Err(err),
        }
        info!(resource = %target.resource, scope = %target.scope, names = ?to_delete, "deleted entries");
    }
    for (item, name) in &to_update {
        let entry = encode_entry(&schema.body, name, item, &item_path(schema, name))?;
        session.rpc("update", target, |t| t.update(target, name, &entry))?;
        info!(resource = %target.resource, scope = %target.scope, name = %name, "updated entry");
    }
    for (item, name) in &to_create {
        let entry = encode_entry(&schema.body, name, item, &item_path(schema, name))?;
        session.rpc("create", target, |t| t.create(target, &entry))?;
        info!(resource = %target.resource, scope = %target.scope, name = %name, "created entry");
    }

    if ordered {
        let mut current: Vec<String> = server_names
            .into_iter()
            .filter(|n| !to_delete.contains(n))
            .collect();
        current.extend(to_create.iter().map(|(_, name)| (*name).clone()));
        if is_satisfied(&current, &desired_names, position) {
            debug!(resource = %target.resource, "ordering already satisfied");
        } else {
            reorder(session, target, &desired_names, position, uuid_keyed)?;
        }
    }

    let after = list(session, "verify", target)?;
    let observed_names = after.names();
    if ordered && session.verifies() && !is_satisfied(&observed_names, &desired_names, position) {
        let observed = observed_names
            .into_iter()
            .filter(|n| desired_names.contains(n))
            .collect();
        return Err(Error::OrderingUnsatisfied {
            expected: desired_names,
            observed,
        });
    }

    let mut state = Vec::with_capacity(desired.len());
    for (item, name) in desired.iter().zip(&desired_names) {
        let node = after.by_name(name).ok_or_else(|| Error::NotFound {
            resource: target.resource.clone(),
            name: name.clone(),
            scope: target.scope.to_string(),
        })?;
        let observed = decode_entry(&schema.body, node, &item_path(schema, name))?;
        let prior_item = prior_for(prior, node, uuid_keyed);
        state.push(entry_state(schema, name, item, &observed, prior_item));
    }
    Ok(state)
}

fn reorder(
    session: &mut Session<'_>,
    target: &Target,
    owned: &[String],
    position: &Position,
    uuid_keyed: bool,
) -> Result<()> {
    let listing = list(session, "list before reorder", target)?;
    let current = listing.names();
    let refs: Vec<EntryRef> = owned
        .iter()
        .map(|name| listing.entry_ref(name, uuid_keyed))
        .collect();
    let anchor = match position.group_anchor() {
        Anchor::Before(EntryRef::Name(pivot)) => Anchor::Before(listing.entry_ref(&pivot, uuid_keyed)),
        Anchor::After(EntryRef::Name(pivot)) => Anchor::After(listing.entry_ref(&pivot, uuid_keyed)),
        other => other,
    };

    match session.rpc("move group", target, |t| t.move_group(target, &refs, &anchor)) {
        Ok(()) => {
            info!(resource = %target.resource, scope = %target.scope, anchor = %anchor, "moved owned block");
            return Ok(());
        }
        Err(err) if is_unsupported(&err) => {}
        Err(err) => return Err(err),
    }

    let goal = target_order(&current, owned, position);
    let moves = minimal_moves(&current, &goal, owned);
    debug!(resource = %target.resource, moves = moves.len(), "moving entries one by one");
    for mv in moves {
        let entry = listing.entry_ref(&mv.entry, uuid_keyed);
        let anchor = match &mv.after {
            Some(prev) => Anchor::After(listing.entry_ref(prev, uuid_keyed)),
            None => Anchor::Top,
        };
        session.rpc("move entry", target, |t| t.move_entry(target, &entry, &anchor))?;
    }
    Ok(())
}

/// Observed state of the owned entries, in server order; `None` when every
/// previously owned entry is gone.
pub fn read(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    prior: &[Map<String, Value>],
) -> Result<Option<Vec<Map<String, Value>>>> {
    let uuid_keyed = keying(schema) == CollectionKeying::Uuid;
    let listing = list(session, "list", target)?;
    let mut state = Vec::new();
    for node in &listing.nodes {
        let (Some(prior_item), Some(name)) = (prior_for(prior, node, uuid_keyed), node.name()) else {
            continue;
        };
        let observed = decode_entry(&schema.body, node, &item_path(schema, name))?;
        state.push(entry_state(schema, name, prior_item, &observed, Some(prior_item)));
    }
    if state.is_empty() && !prior.is_empty() {
        return Ok(None);
    }
    Ok(Some(state))
}

/// Every decoded field of the named entries, in server order.
pub fn import(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    names: &[String],
) -> Result<Vec<Map<String, Value>>> {
    let listing = list(session, "list", target)?;
    if let Some(missing) = names.iter().find(|n| listing.by_name(n).is_none()) {
        return Err(Error::NotFound {
            resource: target.resource.clone(),
            name: missing.clone(),
            scope: target.scope.to_string(),
        });
    }
    let mut state = Vec::new();
    for node in &listing.nodes {
        let Some(name) = node.name().filter(|n| names.iter().any(|w| w.as_str() == *n)) else {
            continue;
        };
        state.push(decode_entry(&schema.body, node, &item_path(schema, name))?);
    }
    Ok(state)
}

/// Delete the owned entries still present; absent entries are ignored.
pub fn delete(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    prior: &[Map<String, Value>],
) -> Result<()> {
    let uuid_keyed = keying(schema) == CollectionKeying::Uuid;
    let listing = list(session, "list", target)?;
    let names: Vec<String> = listing
        .nodes
        .iter()
        .filter(|node| prior_for(prior, node, uuid_keyed).is_some())
        .filter_map(|node| node.name().map(ToString::to_string))
        .collect();
    if names.is_empty() {
        return Ok(());
    }
    match session.rpc("delete", target, |t| t.delete(target, &names)) {
        Ok(()) => {
            info!(resource = %target.resource, scope = %target.scope, names = ?names, "deleted entries");
            Ok(())
        }
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err),
    }
}
