//! Arm selection for one-of unions.
//!
//! Shared by the encoder, the decoder, the plan validator and the location
//! resolver so that "which arm is selected" has exactly one definition: an
//! arm is selected when its key is present and not `null` (`{}` selects).

use serde_json::{Map, Value};
use xml_config_core::XmlNode;

use crate::error::{DecodeError, ValidationError};
use crate::value::{is_set, AttrPath};

/// Arms of `arms` set in `object`, in arm-table order.
pub fn selected_arms(object: &Map<String, Value>, arms: &[&'static str]) -> Vec<&'static str> {
    arms.iter()
        .copied()
        .filter(|arm| is_set(object.get(*arm)))
        .collect()
}

/// The selected arm, enforcing "at most one" (and "exactly one" unless
/// `optional`).
pub fn check_cardinality(
    object: &Map<String, Value>,
    arms: &[&'static str],
    optional: bool,
    path: &AttrPath,
) -> Result<Option<&'static str>, ValidationError> {
    let selected = selected_arms(object, arms);
    match selected.as_slice() {
        [] if optional => Ok(None),
        [arm] => Ok(Some(*arm)),
        _ => Err(ValidationError::VariantCardinality {
            path: path.clone(),
            allowed: arms.iter().map(ToString::to_string).collect(),
            set: selected.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// Index of the arm whose tag is present under `node`.
///
/// `tags` is the arm table's XML tags. Zero present arms decode to `None`;
/// more than one is reported, never guessed.
pub fn select_present(
    node: &XmlNode,
    tags: &[&str],
    path: &AttrPath,
) -> Result<Option<usize>, DecodeError> {
    let present: Vec<usize> = tags
        .iter()
        .enumerate()
        .filter(|(_, tag)| node.get_child(tag).is_some())
        .map(|(idx, _)| idx)
        .collect();
    match present.as_slice() {
        [] => Ok(None),
        [idx] => Ok(Some(*idx)),
        _ => Err(DecodeError::VariantServerAmbiguous {
            path: path.clone(),
            tags: present.iter().map(|idx| tags[*idx].to_string()).collect(),
        }),
    }
}
