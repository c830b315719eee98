use std::collections::{BTreeMap, HashMap, HashSet};

use crate::diff::result::DiffEntry;
use crate::tree::{ENTRY_TAG, NAME_ATTR};
use crate::XmlNode;

/// How repeated children with the same tag are matched across trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyField {
    /// Match on an attribute value, e.g. `<entry name="...">`.
    Attribute(String),
    /// Match on the text of a child element.
    Child(String),
}

/// Configures tree diff behavior.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Map from tag to the key used for repeated-element matching.
    pub key_fields: HashMap<String, KeyField>,
    /// Attribute names excluded from comparison (server-assigned ids).
    pub ignore_attributes: Vec<String>,
    /// Paths or tag names to ignore.
    pub ignore_paths: Vec<String>,
    /// Report keyed children whose relative order changed.
    pub detect_reorder: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        let mut key_fields = HashMap::new();
        key_fields.insert(
            ENTRY_TAG.to_string(),
            KeyField::Attribute(NAME_ATTR.to_string()),
        );
        Self {
            key_fields,
            ignore_attributes: Vec::new(),
            ignore_paths: Vec::new(),
            detect_reorder: true,
        }
    }
}

/// Diff two XML trees with default options.
pub fn diff(left: &XmlNode, right: &XmlNode) -> Vec<DiffEntry> {
    diff_with_options(left, right, &DiffOptions::default())
}

/// Diff two XML trees with custom options.
pub fn diff_with_options(left: &XmlNode, right: &XmlNode, opts: &DiffOptions) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    let root_path = left.tag.clone();
    diff_node(left, right, &root_path, opts, &mut out);
    out
}

fn diff_node(
    left: &XmlNode,
    right: &XmlNode,
    path: &str,
    opts: &DiffOptions,
    out: &mut Vec<DiffEntry>,
) {
    if should_ignore(path, opts) {
        return;
    }

    if left.tag != right.tag {
        out.push(DiffEntry::Structural {
            path: path.to_string(),
            description: format!("tag mismatch: left='{}' right='{}'", left.tag, right.tag),
        });
        return;
    }

    if compared_attributes(left, opts) != compared_attributes(right, opts)
        || normalize_text(&left.text) != normalize_text(&right.text)
    {
        out.push(DiffEntry::Modified {
            path: path.to_string(),
            left: local_signature(left, opts),
            right: local_signature(right, opts),
        });
    }

    diff_children(left, right, path, opts, out);
}

struct MatchContext<'a, 'b> {
    parent_path: &'a str,
    opts: &'a DiffOptions,
    out: &'b mut Vec<DiffEntry>,
}

fn match_by_index(
    tag: &str,
    left_nodes: &[&XmlNode],
    right_nodes: &[&XmlNode],
    ctx: &mut MatchContext<'_, '_>,
) {
    let max = left_nodes.len().max(right_nodes.len());
    for i in 0..max {
        let child_path = format!("{}.{tag}[{}]", ctx.parent_path, i + 1);
        match (left_nodes.get(i), right_nodes.get(i)) {
            (Some(l), Some(r)) => diff_node(l, r, &child_path, ctx.opts, ctx.out),
            (Some(l), None) => ctx.out.push(DiffEntry::OnlyLeft {
                path: child_path,
                node: (*l).clone(),
            }),
            (None, Some(r)) => ctx.out.push(DiffEntry::OnlyRight {
                path: child_path,
                node: (*r).clone(),
            }),
            (None, None) => {}
        }
    }
}

fn match_by_key(
    tag: &str,
    key_field: &KeyField,
    left_nodes: &[&XmlNode],
    right_nodes: &[&XmlNode],
    ctx: &mut MatchContext<'_, '_>,
) {
    let mut right_by_key: HashMap<String, usize> = HashMap::new();
    for (idx, node) in right_nodes.iter().enumerate() {
        if let Some(key) = key_of(node, key_field) {
            right_by_key.entry(key.to_string()).or_insert(idx);
        }
    }

    let mut used_right = HashSet::new();
    let mut matched_order = Vec::new();

    for (left_idx, left_node) in left_nodes.iter().enumerate() {
        let left_key = key_of(left_node, key_field);
        let child_path = keyed_path(ctx.parent_path, tag, left_key, left_idx);

        let matched = left_key
            .and_then(|key| right_by_key.get(key).copied())
            .filter(|idx| !used_right.contains(idx));

        match matched {
            Some(right_idx) => {
                used_right.insert(right_idx);
                matched_order.push(right_idx);
                diff_node(
                    left_node,
                    right_nodes[right_idx],
                    &child_path,
                    ctx.opts,
                    ctx.out,
                );
            }
            None => ctx.out.push(DiffEntry::OnlyLeft {
                path: child_path,
                node: (*left_node).clone(),
            }),
        }
    }

    for (right_idx, right_node) in right_nodes.iter().enumerate() {
        if used_right.contains(&right_idx) {
            continue;
        }
        let child_path = keyed_path(
            ctx.parent_path,
            tag,
            key_of(right_node, key_field),
            right_idx,
        );
        ctx.out.push(DiffEntry::OnlyRight {
            path: child_path,
            node: (*right_node).clone(),
        });
    }

    if ctx.opts.detect_reorder && matched_order.windows(2).any(|w| w[0] > w[1]) {
        ctx.out.push(DiffEntry::Structural {
            path: format!("{}.{tag}", ctx.parent_path),
            description: "keyed children changed relative order".to_string(),
        });
    }
}

fn diff_children(
    left: &XmlNode,
    right: &XmlNode,
    path: &str,
    opts: &DiffOptions,
    out: &mut Vec<DiffEntry>,
) {
    let mut tags: Vec<&str> = Vec::new();
    for child in left.children.iter().chain(right.children.iter()) {
        if !tags.contains(&child.tag.as_str()) {
            tags.push(&child.tag);
        }
    }

    for tag in tags {
        let left_nodes: Vec<&XmlNode> = left.children.iter().filter(|n| n.tag == tag).collect();
        let right_nodes: Vec<&XmlNode> = right.children.iter().filter(|n| n.tag == tag).collect();
        let mut ctx = MatchContext {
            parent_path: path,
            opts,
            out,
        };

        if let Some(key_field) = opts.key_fields.get(tag) {
            match_by_key(tag, key_field, &left_nodes, &right_nodes, &mut ctx);
        } else {
            match_by_index(tag, &left_nodes, &right_nodes, &mut ctx);
        }
    }
}

fn key_of<'a>(node: &'a XmlNode, key_field: &KeyField) -> Option<&'a str> {
    match key_field {
        KeyField::Attribute(name) => node.attribute(name),
        KeyField::Child(tag) => node.get_text(&[tag.as_str()]),
    }
}

fn keyed_path(parent: &str, tag: &str, key: Option<&str>, idx: usize) -> String {
    match key {
        Some(key) => format!("{parent}.{tag}[{key}]"),
        None => format!("{parent}.{tag}[{}]", idx + 1),
    }
}

fn should_ignore(path: &str, opts: &DiffOptions) -> bool {
    opts.ignore_paths.iter().any(|ignore| {
        path == ignore
            || path.ends_with(&format!(".{ignore}"))
            || path.contains(&format!(".{ignore}["))
    })
}

fn compared_attributes<'a>(node: &'a XmlNode, opts: &DiffOptions) -> BTreeMap<&'a str, &'a str> {
    node.attributes
        .iter()
        .filter(|(key, _)| !opts.ignore_attributes.iter().any(|i| i == *key))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

fn normalize_text(input: &Option<String>) -> Option<&str> {
    input.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn local_signature(node: &XmlNode, opts: &DiffOptions) -> String {
    format!(
        "attributes={:?}, text={:?}",
        compared_attributes(node, opts),
        normalize_text(&node.text)
    )
}

#[cfg(test)]
mod tests {
    use super::{diff, diff_with_options, DiffOptions};
    use crate::diff::result::DiffEntry;
    use crate::parser::parse;

    #[test]
    fn ignored_attributes_do_not_produce_modifications() {
        let left = parse(br#"<rules><entry name="r1" uuid="1"/></rules>"#).expect("left");
        let right = parse(br#"<rules><entry name="r1" uuid="2"/></rules>"#).expect("right");

        assert!(!diff(&left, &right).is_empty());

        let opts = DiffOptions {
            ignore_attributes: vec!["uuid".to_string()],
            ..DiffOptions::default()
        };
        assert!(diff_with_options(&left, &right, &opts).is_empty());
    }

    #[test]
    fn reordered_entries_are_structural() {
        let left = parse(br#"<rules><entry name="a"/><entry name="b"/></rules>"#).expect("left");
        let right = parse(br#"<rules><entry name="b"/><entry name="a"/></rules>"#).expect("right");

        let entries = diff(&left, &right);
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0], DiffEntry::Structural { path, .. } if path == "rules.entry"));
    }

    #[test]
    fn top_level_tag_extracts_first_child_segment() {
        let entry = DiffEntry::Structural {
            path: "system.ntp-servers[1].primary-ntp-server[1]".to_string(),
            description: String::new(),
        };
        assert_eq!(entry.top_level_tag("system"), Some("ntp-servers"));
        assert_eq!(entry.top_level_tag("other"), None);
    }
}
