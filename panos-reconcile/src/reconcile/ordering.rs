//! Positional anchoring of an owned block inside a shared list.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::transport::{Anchor, EntryRef};
use crate::value::{type_label, AttrPath};

/// Where the owned block sits relative to foreign entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Position {
    First,
    #[default]
    Last,
    Before { pivot: String, directly: bool },
    After { pivot: String, directly: bool },
}

const WHERE_VALUES: [&str; 4] = ["first", "last", "before", "after"];

impl Position {
    /// Parse the declarative `position` object; absent means `last`.
    pub fn parse(value: Option<&Value>, path: &AttrPath) -> Result<Self, ValidationErrors> {
        let object = match value {
            None | Some(Value::Null) => return Ok(Position::Last),
            Some(Value::Object(object)) => object,
            Some(other) => {
                return Err(ValidationError::TypeMismatch {
                    path: path.clone(),
                    expected: "object",
                    found: type_label(other),
                }
                .into())
            }
        };

        let mut errors = ValidationErrors::new();
        for key in object.keys() {
            if !["where", "pivot", "directly"].contains(&key.as_str()) {
                errors.push(ValidationError::UnknownAttribute {
                    path: path.attr(key),
                });
            }
        }

        let string_field = |key: &str, errors: &mut ValidationErrors| match object.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                errors.push(ValidationError::TypeMismatch {
                    path: path.attr(key),
                    expected: "string",
                    found: type_label(other),
                });
                None
            }
        };
        let placement = string_field("where", &mut errors);
        let pivot = string_field("pivot", &mut errors);
        let directly = match object.get("directly") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                errors.push(ValidationError::TypeMismatch {
                    path: path.attr("directly"),
                    expected: "bool",
                    found: type_label(other),
                });
                None
            }
        };

        let position = match placement.as_deref() {
            None => {
                errors.push(ValidationError::RequiredAttributeMissing {
                    path: path.attr("where"),
                });
                None
            }
            Some(edge @ ("first" | "last")) => {
                if pivot.is_some() {
                    errors.push(ValidationError::ConflictsWith {
                        path: path.attr("pivot"),
                        conflicts: format!("where={edge}"),
                    });
                }
                if directly.is_some() {
                    errors.push(ValidationError::ConflictsWith {
                        path: path.attr("directly"),
                        conflicts: format!("where={edge}"),
                    });
                }
                Some(if edge == "first" {
                    Position::First
                } else {
                    Position::Last
                })
            }
            Some(side @ ("before" | "after")) => match pivot {
                None => {
                    errors.push(ValidationError::RequiredWith {
                        path: path.attr("where"),
                        requires: "pivot".to_string(),
                    });
                    None
                }
                Some(pivot) if pivot.is_empty() => {
                    errors.push(ValidationError::EmptyName {
                        path: path.attr("pivot"),
                    });
                    None
                }
                Some(pivot) => {
                    let directly = directly.unwrap_or(false);
                    Some(if side == "before" {
                        Position::Before { pivot, directly }
                    } else {
                        Position::After { pivot, directly }
                    })
                }
            },
            Some(other) => {
                errors.push(ValidationError::NotInEnum {
                    path: path.attr("where"),
                    value: other.to_string(),
                    allowed: WHERE_VALUES.iter().map(ToString::to_string).collect(),
                });
                None
            }
        };

        match position {
            Some(position) if errors.is_empty() => Ok(position),
            _ => Err(errors),
        }
    }

    pub fn pivot(&self) -> Option<&str> {
        match self {
            Position::Before { pivot, .. } | Position::After { pivot, .. } => Some(pivot),
            Position::First | Position::Last => None,
        }
    }

    /// Anchor for a single group move of the owned block.
    pub fn group_anchor(&self) -> Anchor {
        match self {
            Position::First => Anchor::Top,
            Position::Last => Anchor::Bottom,
            Position::Before { pivot, .. } => Anchor::Before(EntryRef::Name(pivot.clone())),
            Position::After { pivot, .. } => Anchor::After(EntryRef::Name(pivot.clone())),
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Position::First => write!(f, "first"),
            Position::Last => write!(f, "last"),
            Position::Before { pivot, directly } => {
                write!(f, "before {pivot}{}", if *directly { " directly" } else { "" })
            }
            Position::After { pivot, directly } => {
                write!(f, "after {pivot}{}", if *directly { " directly" } else { "" })
            }
        }
    }
}

/// True when `owned` appears in `server` in declared order and anchored per
/// `position`.
pub fn is_satisfied(server: &[String], owned: &[String], position: &Position) -> bool {
    let index: HashMap<&str, usize> = server
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let Some(places) = owned
        .iter()
        .map(|name| index.get(name.as_str()).copied())
        .collect::<Option<Vec<usize>>>()
    else {
        return false;
    };
    if places.windows(2).any(|w| w[0] >= w[1]) {
        return false;
    }
    let (Some(&first), Some(&last)) = (places.first(), places.last()) else {
        return true;
    };
    let contiguous = last - first + 1 == places.len();
    match position {
        Position::First => first == 0 && contiguous,
        Position::Last => last + 1 == server.len() && contiguous,
        Position::Before { pivot, directly } => match index.get(pivot.as_str()) {
            Some(&p) => last < p && (!directly || (contiguous && last + 1 == p)),
            None => false,
        },
        Position::After { pivot, directly } => match index.get(pivot.as_str()) {
            Some(&p) => first > p && (!directly || (contiguous && first == p + 1)),
            None => false,
        },
    }
}

/// Full list order after placing the owned block; foreign entries keep their
/// relative order.
pub fn target_order(server: &[String], owned: &[String], position: &Position) -> Vec<String> {
    let owned_set: HashSet<&str> = owned.iter().map(String::as_str).collect();
    let mut foreign: Vec<String> = server
        .iter()
        .filter(|name| !owned_set.contains(name.as_str()))
        .cloned()
        .collect();
    let at = match position {
        Position::First => 0,
        Position::Last => foreign.len(),
        Position::Before { pivot, .. } => foreign
            .iter()
            .position(|n| n == pivot)
            .unwrap_or(foreign.len()),
        Position::After { pivot, .. } => foreign
            .iter()
            .position(|n| n == pivot)
            .map_or(foreign.len(), |idx| idx + 1),
    };
    foreign.splice(at..at, owned.iter().cloned());
    foreign
}

/// One per-entry move: place `entry` right after `after`, or at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub entry: String,
    pub after: Option<String>,
}

/// Fewest owned-entry moves turning `current` into `target`.
///
/// Entries kept in place form a maximum-weight increasing subsequence of
/// target positions; foreign entries outweigh every owned entry combined so
/// they are never moved. Moves are emitted in target order, each anchored
/// after its target predecessor.
pub fn minimal_moves(current: &[String], target: &[String], owned: &[String]) -> Vec<Move> {
    let owned_set: HashSet<&str> = owned.iter().map(String::as_str).collect();
    let target_index: HashMap<&str, usize> = target
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let seq: Vec<(usize, u64, &str)> = current
        .iter()
        .filter_map(|name| {
            let pos = *target_index.get(name.as_str())?;
            let weight = if owned_set.contains(name.as_str()) {
                1
            } else {
                current.len() as u64 + 1
            };
            Some((pos, weight, name.as_str()))
        })
        .collect();

    let mut best: Vec<u64> = Vec::with_capacity(seq.len());
    let mut prev: Vec<Option<usize>> = Vec::with_capacity(seq.len());
    for (i, &(pos, weight, _)) in seq.iter().enumerate() {
        let mut score = weight;
        let mut from = None;
        for j in 0..i {
            if seq[j].0 < pos && best[j] + weight > score {
                score = best[j] + weight;
                from = Some(j);
            }
        }
        best.push(score);
        prev.push(from);
    }

    let mut kept: HashSet<&str> = HashSet::new();
    let mut cursor = best
        .iter()
        .enumerate()
        .max_by_key(|(_, score)| **score)
        .map(|(idx, _)| idx);
    while let Some(idx) = cursor {
        kept.insert(seq[idx].2);
        cursor = prev[idx];
    }

    target
        .iter()
        .enumerate()
        .filter(|(_, name)| !kept.contains(name.as_str()))
        .map(|(idx, name)| Move {
            entry: name.clone(),
            after: idx.checked_sub(1).map(|p| target[p].clone()),
        })
        .collect()
}

/// Apply `moves` to a local copy of `order`, mirroring what the server does.
pub fn apply_moves(order: &[String], moves: &[Move]) -> Vec<String> {
    let mut out = order.to_vec();
    for mv in moves {
        if let Some(idx) = out.iter().position(|n| *n == mv.entry) {
            out.remove(idx);
        }
        let at = match &mv.after {
            None => 0,
            Some(after) => out
                .iter()
                .position(|n| n == after)
                .map_or(out.len(), |idx| idx + 1),
        };
        out.insert(at, mv.entry.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{apply_moves, is_satisfied, minimal_moves, target_order, Position};
    use crate::value::AttrPath;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    fn parse(value: serde_json::Value) -> Result<Position, crate::error::ValidationErrors> {
        Position::parse(Some(&value), &AttrPath::attr_root("position"))
    }

    #[test]
    fn parses_positions() {
        assert_eq!(
            Position::parse(None, &AttrPath::attr_root("position")),
            Ok(Position::Last)
        );
        assert_eq!(parse(json!({"where": "first"})), Ok(Position::First));
        assert_eq!(
            parse(json!({"where": "before", "pivot": "Z", "directly": true})),
            Ok(Position::Before {
                pivot: "Z".to_string(),
                directly: true
            })
        );
        assert_eq!(
            parse(json!({"where": "after", "pivot": "A"})),
            Ok(Position::After {
                pivot: "A".to_string(),
                directly: false
            })
        );
    }

    #[test]
    fn rejects_malformed_positions() {
        assert!(parse(json!({"where": "before"}))
            .expect_err("missing pivot")
            .has("required_with"));
        assert!(parse(json!({"where": "first", "pivot": "Z"}))
            .expect_err("pivot with first")
            .has("conflicts_with"));
        assert!(parse(json!({"where": "middle"}))
            .expect_err("bad where")
            .has("not_in_enum"));
        assert!(parse(json!({"pivot": "Z"}))
            .expect_err("no where")
            .has("required_attribute_missing"));
    }

    #[test]
    fn satisfaction_per_anchor() {
        let server = names(&["A", "B", "r1", "r2", "Z"]);
        let owned = names(&["r1", "r2"]);
        let before_z = |directly| Position::Before {
            pivot: "Z".to_string(),
            directly,
        };
        assert!(is_satisfied(&server, &owned, &before_z(true)));
        assert!(!is_satisfied(&server, &owned, &Position::First));
        assert!(!is_satisfied(&server, &owned, &Position::Last));

        let split = names(&["r1", "A", "r2", "Z"]);
        assert!(is_satisfied(&split, &owned, &before_z(false)));
        assert!(!is_satisfied(&split, &owned, &before_z(true)));

        let reversed = names(&["r2", "r1", "Z"]);
        assert!(!is_satisfied(&reversed, &owned, &before_z(false)));
    }

    #[test]
    fn target_order_keeps_foreign_order() {
        let server = names(&["A", "B", "Z"]);
        let owned = names(&["r1", "r2", "r3"]);
        assert_eq!(
            target_order(&server, &owned, &Position::First),
            names(&["r1", "r2", "r3", "A", "B", "Z"])
        );
        assert_eq!(
            target_order(
                &server,
                &owned,
                &Position::Before {
                    pivot: "Z".to_string(),
                    directly: true
                }
            ),
            names(&["A", "B", "r1", "r2", "r3", "Z"])
        );
        assert_eq!(
            target_order(
                &server,
                &owned,
                &Position::After {
                    pivot: "A".to_string(),
                    directly: false
                }
            ),
            names(&["A", "r1", "r2", "r3", "B", "Z"])
        );
    }

    #[test]
    fn swap_needs_a_single_move() {
        let current = names(&["r1", "r2", "r3", "A", "B", "Z"]);
        let owned = names(&["r2", "r1", "r3"]);
        let target = target_order(&current, &owned, &Position::First);
        let moves = minimal_moves(&current, &target, &owned);
        assert_eq!(moves.len(), 1);
        assert_eq!(apply_moves(&current, &moves), target);
    }

    #[test]
    fn foreign_entries_never_move() {
        let current = names(&["A", "B", "Z", "r1", "r2", "r3"]);
        let owned = names(&["r1", "r2", "r3"]);
        let target = target_order(&current, &owned, &Position::First);
        let moves = minimal_moves(&current, &target, &owned);
        assert!(moves.iter().all(|m| m.entry.starts_with('r')));
        assert_eq!(moves.len(), 3);
        assert_eq!(apply_moves(&current, &moves), target);
    }
}
