//! Single named entries in a container.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::codec::{decode_entry, encode_entry};
use crate::error::{Error, Result, ValidationError};
use crate::schema::ResourceSchema;
use crate::transport::{EntryRef, Target};
use crate::value::{str_field, AttrPath};

use super::{entry_state, is_not_found, is_unsupported, Session};

pub(super) fn name_of(object: &Map<String, Value>) -> Result<&str> {
    str_field(object, "name").ok_or_else(|| {
        Error::from(ValidationError::RequiredAttributeMissing {
            path: AttrPath::attr_root("name"),
        })
    })
}

/// Create the entry; an existing entry of the same name is never adopted.
pub fn create(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    desired: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let name = name_of(desired)?;
    match session.rpc("read", target, |t| t.read(target, name)) {
        Ok(_) => {
            return Err(Error::AlreadyExists {
                resource: target.resource.clone(),
                name: name.to_string(),
                scope: target.scope.to_string(),
            })
        }
        Err(err) if is_not_found(&err) => {}
        Err(err) => return Err(err),
    }

    let entry = encode_entry(&schema.body, name, desired, &AttrPath::root())?;
    session.rpc("create", target, |t| t.create(target, &entry))?;
    info!(resource = %target.resource, scope = %target.scope, name, "created");
    read_back(session, schema, target, name, desired, None)
}

/// Current state of the entry, or `None` when it is gone.
pub fn read(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    state: &Map<String, Value>,
) -> Result<Option<Map<String, Value>>> {
    let name = name_of(state)?;
    let node = match session.rpc("read", target, |t| t.read(target, name)) {
        Ok(node) => node,
        Err(err) if is_not_found(&err) => return Ok(None),
        Err(err) => return Err(err),
    };
    let observed = decode_entry(&schema.body, &node, &AttrPath::root())?;
    Ok(Some(entry_state(schema, name, state, &observed, Some(state))))
}

/// Every decoded field of the entry `name`; missing entries are an error.
pub fn import(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    name: &str,
) -> Result<Map<String, Value>> {
    let node = match session.rpc("read", target, |t| t.read(target, name)) {
        Ok(node) => node,
        Err(err) if is_not_found(&err) => {
            return Err(Error::NotFound {
                resource: target.resource.clone(),
                name: name.to_string(),
                scope: target.scope.to_string(),
            })
        }
        Err(err) => return Err(err),
    };
    Ok(decode_entry(&schema.body, &node, &AttrPath::root())?)
}

/// Write the full desired value over the entry, renaming first if needed.
pub fn update(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    prior: &Map<String, Value>,
    desired: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let old_name = name_of(prior)?;
    let name = name_of(desired)?;
    let entry = encode_entry(&schema.body, name, desired, &AttrPath::root())?;

    if old_name != name {
        let renamed = session.rpc("rename", target, |t| {
            t.rename(target, &EntryRef::Name(old_name.to_string()), name)
        });
        match renamed {
            Ok(()) => {
                info!(resource = %target.resource, scope = %target.scope, from = old_name, name, "renamed");
            }
            Err(err) if is_unsupported(&err) => {
                warn!(
                    resource = %target.resource,
                    scope = %target.scope,
                    from = old_name,
                    name,
                    "rename unsupported; recreating entry, list position is lost"
                );
                let doomed = [old_name.to_string()];
                session.rpc("delete", target, |t| t.delete(target, &doomed))?;
                session.rpc("create", target, |t| t.create(target, &entry))?;
                return read_back(session, schema, target, name, desired, Some(prior));
            }
            Err(err) => return Err(err),
        }
    }

    session.rpc("update", target, |t| t.update(target, name, &entry))?;
    info!(resource = %target.resource, scope = %target.scope, name, "updated");
    read_back(session, schema, target, name, desired, Some(prior))
}

/// Delete the entry; a missing entry counts as deleted.
pub fn delete(session: &mut Session<'_>, target: &Target, state: &Map<String, Value>) -> Result<()> {
    let names = [name_of(state)?.to_string()];
    match session.rpc("delete", target, |t| t.delete(target, &names)) {
        Ok(()) => {
            info!(resource = %target.resource, scope = %target.scope, name = %names[0], "deleted");
            Ok(())
        }
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err),
    }
}

fn read_back(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    name: &str,
    desired: &Map<String, Value>,
    prior: Option<&Map<String, Value>>,
) -> Result<Map<String, Value>> {
    let node = session.rpc("read back", target, |t| t.read(target, name))?;
    let observed = decode_entry(&schema.body, &node, &AttrPath::root())?;
    Ok(entry_state(schema, name, desired, &observed, prior))
}
