//! Absolute element paths into a configuration tree.
//!
//! Paths render in the `entry[@name='...']` xpath dialect used by firewall
//! management APIs, and can be resolved against an in-memory [`XmlNode`].

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::tree::{XmlNode, ENTRY_TAG};

/// One step of an [`XPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A plain child element.
    Tag(String),
    /// A named `<entry>` child.
    Entry(String),
}

/// An absolute path from the document root element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct XPath {
    segments: Vec<Segment>,
}

/// Error returned when an xpath string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid xpath segment '{segment}' in '{path}'")]
pub struct XPathError {
    pub path: String,
    pub segment: String,
}

impl XPath {
    /// Path to the document root element `tag`.
    pub fn root(tag: &str) -> Self {
        Self {
            segments: vec![Segment::Tag(tag.to_string())],
        }
    }

    /// Append a plain element step.
    pub fn tag(mut self, tag: &str) -> Self {
        self.segments.push(Segment::Tag(tag.to_string()));
        self
    }

    /// Append a `/`-separated run of plain element steps.
    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.segments
            .extend(tags.iter().map(|t| Segment::Tag((*t).to_string())));
        self
    }

    /// Append an `entry[@name='...']` step.
    pub fn entry(mut self, name: &str) -> Self {
        self.segments.push(Segment::Entry(name.to_string()));
        self
    }

    /// Path segments from the root.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Path without its last segment.
    pub fn parent(&self) -> Option<XPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Tag of the element the path addresses.
    pub fn last_tag(&self) -> Option<&str> {
        match self.segments.last()? {
            Segment::Tag(tag) => Some(tag),
            Segment::Entry(_) => Some(ENTRY_TAG),
        }
    }
}

impl Display for XPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Tag(tag) => write!(f, "/{tag}")?,
                Segment::Entry(name) => write!(f, "/entry[@name='{name}']")?,
            }
        }
        Ok(())
    }
}

impl FromStr for XPath {
    type Err = XPathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |segment: &str| XPathError {
            path: raw.to_string(),
            segment: segment.to_string(),
        };
        let body = raw.strip_prefix('/').ok_or_else(|| invalid(raw))?;
        let mut segments = Vec::new();
        for part in split_segments(body) {
            if let Some(rest) = part.strip_prefix("entry[@name='") {
                let name = rest.strip_suffix("']").ok_or_else(|| invalid(part))?;
                segments.push(Segment::Entry(name.to_string()));
            } else if part.is_empty() || part.contains(['[', ']', '\'']) {
                return Err(invalid(part));
            } else {
                segments.push(Segment::Tag(part.to_string()));
            }
        }
        if segments.is_empty() {
            return Err(invalid(raw));
        }
        Ok(Self { segments })
    }
}

/// Split on `/` outside of `[...]` predicates, so entry names may contain `/`.
fn split_segments(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in body.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                parts.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

impl XmlNode {
    /// Resolve `path` against this node, which must be the root element.
    pub fn find(&self, path: &XPath) -> Option<&XmlNode> {
        let (first, rest) = path.segments.split_first()?;
        if !matches_segment(self, first) {
            return None;
        }
        let mut current = self;
        for segment in rest {
            current = match segment {
                Segment::Tag(tag) => current.get_child(tag)?,
                Segment::Entry(name) => current.find_entry(name)?,
            };
        }
        Some(current)
    }

    /// Mutable variant of [`XmlNode::find`].
    pub fn find_mut(&mut self, path: &XPath) -> Option<&mut XmlNode> {
        let (first, rest) = path.segments.split_first()?;
        if !matches_segment(self, first) {
            return None;
        }
        let mut current = self;
        for segment in rest {
            current = match segment {
                Segment::Tag(tag) => current.get_child_mut(tag)?,
                Segment::Entry(name) => {
                    let idx = current.entry_position(name)?;
                    &mut current.children[idx]
                }
            };
        }
        Some(current)
    }

    /// Resolve `path`, creating any missing elements along the way.
    ///
    /// Returns `None` only when the root segment does not match this node.
    pub fn ensure_path_mut(&mut self, path: &XPath) -> Option<&mut XmlNode> {
        let (first, rest) = path.segments.split_first()?;
        if !matches_segment(self, first) {
            return None;
        }
        let mut current = self;
        for segment in rest {
            current = match segment {
                Segment::Tag(tag) => current.ensure_child_mut(tag),
                Segment::Entry(name) => current.ensure_entry_mut(name),
            };
        }
        Some(current)
    }
}

fn matches_segment(node: &XmlNode, segment: &Segment) -> bool {
    match segment {
        Segment::Tag(tag) => node.tag == *tag,
        Segment::Entry(name) => node.tag == ENTRY_TAG && node.name() == Some(name.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Segment, XPath};
    use crate::parser::parse;

    #[test]
    fn renders_entry_predicates() {
        let path = XPath::root("config")
            .tag("devices")
            .entry("localhost.localdomain")
            .tag("vsys")
            .entry("vsys1")
            .tag("address");
        assert_eq!(
            path.to_string(),
            "/config/devices/entry[@name='localhost.localdomain']/vsys/entry[@name='vsys1']/address"
        );
    }

    #[test]
    fn parses_rendered_paths_back() {
        let raw = "/config/devices/entry[@name='a/b']/deviceconfig/system";
        let path: XPath = raw.parse().expect("parse xpath");
        assert_eq!(path.segments()[2], Segment::Entry("a/b".to_string()));
        assert_eq!(path.to_string(), raw);
    }

    #[test]
    fn rejects_relative_paths() {
        assert!("config/shared".parse::<XPath>().is_err());
    }

    #[test]
    fn find_and_ensure_resolve_against_tree() {
        let mut root = parse(
            br#"<config><devices><entry name="fw1"><vsys><entry name="vsys1"/></vsys></entry></devices></config>"#,
        )
        .expect("parse");

        let vsys = XPath::root("config")
            .tag("devices")
            .entry("fw1")
            .tag("vsys")
            .entry("vsys1");
        assert!(root.find(&vsys).is_some());

        let address = vsys.clone().tag("address");
        assert!(root.find(&address).is_none());
        root.ensure_path_mut(&address).expect("root matches");
        assert!(root.find(&address).is_some());

        assert!(root.find(&XPath::root("other")).is_none());
    }
}
