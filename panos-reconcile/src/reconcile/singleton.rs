//! Co-tenant singletons: several resources sharing one document.
//!
//! Each resource owns the top-level children named by its mask. Writes
//! replace only those children, in place, and leave every other child of the
//! document byte-for-byte as fetched.

use serde_json::{Map, Value};
use tracing::{debug, info};
use xml_config_core::{diff, XmlNode};

use crate::codec::{decode_object, encode_object_into};
use crate::drift::reconcile_state;
use crate::error::{DecodeError, Result};
use crate::schema::{ResourceSchema, Shape};
use crate::transport::Target;
use crate::value::AttrPath;

use super::{is_not_found, Session};

fn mask(schema: &ResourceSchema) -> &[&'static str] {
    match &schema.shape {
        Shape::Singleton { mask } => mask,
        _ => &[],
    }
}

/// Fetch the shared document; a document that does not exist yet is empty.
fn fetch(session: &mut Session<'_>, target: &Target) -> Result<XmlNode> {
    match session.rpc("read document", target, |t| t.read_document(target)) {
        Ok(doc) => Ok(doc),
        Err(err) if is_not_found(&err) => {
            let tag = target.xpath.last_tag().unwrap_or_default();
            Ok(XmlNode::new(tag))
        }
        Err(err) => Err(err),
    }
}

/// The masked slice of `document`.
pub fn project(document: &XmlNode, mask: &[&str]) -> XmlNode {
    let mut projected = XmlNode::new(document.tag.clone());
    projected.children = document
        .children
        .iter()
        .filter(|child| mask.iter().any(|tag| *tag == child.tag))
        .cloned()
        .collect();
    projected
}

/// Replace the masked children of `document` with those of `fresh`.
///
/// Each masked tag keeps the position of its first existing occurrence; tags
/// new to the document are appended.
pub fn overlay(document: &XmlNode, fresh: &XmlNode, mask: &[&str]) -> XmlNode {
    let mut merged = document.clone();
    for tag in mask {
        let replacement: Vec<XmlNode> = fresh
            .children
            .iter()
            .filter(|c| c.tag == *tag)
            .cloned()
            .collect();
        let at = merged.children.iter().position(|c| c.tag == *tag);
        merged.remove_children(tag);
        match at {
            Some(at) => {
                merged.children.splice(at..at, replacement);
            }
            None => merged.children.extend(replacement),
        }
    }
    merged
}

/// Every change between `before` and `after` must fall under a masked tag.
fn guard(before: &XmlNode, after: &XmlNode, mask: &[&str]) -> Result<bool> {
    let changes = diff(before, after);
    for change in &changes {
        let owned = change
            .top_level_tag(&before.tag)
            .is_some_and(|tag| mask.iter().any(|m| *m == tag));
        if !owned {
            return Err(DecodeError::SchemaMismatch {
                path: AttrPath::root(),
                reason: format!("write would touch '{}' outside the mask", change.path()),
            }
            .into());
        }
    }
    Ok(!changes.is_empty())
}

fn decode(schema: &ResourceSchema, document: &XmlNode) -> Result<Map<String, Value>> {
    let projected = project(document, mask(schema));
    Ok(decode_object(&schema.body, &projected, &AttrPath::root())?)
}

/// Observed state of the masked fields.
pub fn read(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    state: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let document = fetch(session, target)?;
    let observed = decode(schema, &document)?;
    Ok(reconcile_state(&schema.body, state, &observed, Some(state)))
}

/// Every decoded masked field.
pub fn import(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
) -> Result<Map<String, Value>> {
    let document = fetch(session, target)?;
    decode(schema, &document)
}

/// Write the masked fields of the document to `desired`.
pub fn write(
    session: &mut Session<'_>,
    schema: &ResourceSchema,
    target: &Target,
    desired: &Map<String, Value>,
    prior: Option<&Map<String, Value>>,
) -> Result<Map<String, Value>> {
    let document = fetch(session, target)?;
    let mut fresh = XmlNode::new(document.tag.clone());
    encode_object_into(&schema.body, desired, &mut fresh, &AttrPath::root())?;
    let merged = overlay(&document, &fresh, mask(schema));

    if guard(&document, &merged, mask(schema))? {
        session.rpc("write document", target, |t| t.write_document(target, &merged))?;
        info!(resource = %target.resource, scope = %target.scope, "wrote masked fields");
    } else {
        debug!(resource = %target.resource, scope = %target.scope, "masked fields unchanged");
    }

    let observed = decode(schema, &merged)?;
    Ok(reconcile_state(&schema.body, desired, &observed, prior))
}

/// Reset the masked fields: defaults where the schema has one, removed
/// otherwise. The document itself is never deleted.
pub fn clear(session: &mut Session<'_>, schema: &ResourceSchema, target: &Target) -> Result<()> {
    let defaults: Map<String, Value> = schema
        .body
        .attributes
        .iter()
        .filter_map(|attr| attr.default.clone().map(|d| (attr.name.to_string(), d)))
        .collect();
    let document = fetch(session, target)?;
    let mut fresh = XmlNode::new(document.tag.clone());
    encode_object_into(&schema.body, &defaults, &mut fresh, &AttrPath::root())?;
    let merged = overlay(&document, &fresh, mask(schema));
    if guard(&document, &merged, mask(schema))? {
        session.rpc("write document", target, |t| t.write_document(target, &merged))?;
        info!(resource = %target.resource, scope = %target.scope, "cleared masked fields");
    }
    Ok(())
}
