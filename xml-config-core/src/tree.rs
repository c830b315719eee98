use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Attribute carrying the key of a named `<entry>` element.
pub const NAME_ATTR: &str = "name";
/// Tag used for named list elements.
pub const ENTRY_TAG: &str = "entry";
/// Tag used for plain string list elements.
pub const MEMBER_TAG: &str = "member";

/// A node of an XML configuration tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Element tag name.
    pub tag: String,
    /// XML attributes keyed by name.
    pub attributes: BTreeMap<String, String>,
    /// Child elements, in document order.
    pub children: Vec<XmlNode>,
    /// Text content, `None` when the element has no non-blank text.
    pub text: Option<String>,
}

impl XmlNode {
    /// Create an element with no attributes, children, or text.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Create a leaf element holding `text`.
    pub fn with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::new(tag);
        node.text = Some(text.into());
        node
    }

    /// Create a named `<entry name="...">` element.
    pub fn entry(name: impl Into<String>) -> Self {
        let mut node = Self::new(ENTRY_TAG);
        node.attributes.insert(NAME_ATTR.to_string(), name.into());
        node
    }

    /// Create a `<tag><member>..</member></tag>` list element.
    pub fn member_list<I, S>(tag: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut node = Self::new(tag);
        node.children = members
            .into_iter()
            .map(|m| Self::with_text(MEMBER_TAG, m))
            .collect();
        node
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// The `name` attribute, if any.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(NAME_ATTR).map(String::as_str)
    }

    /// Return an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// True when the element carries neither children nor text (`<tag/>`).
    pub fn is_empty_element(&self) -> bool {
        self.children.is_empty() && self.text.is_none()
    }

    /// Return the first child with the provided tag.
    pub fn get_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Mutable variant of [`XmlNode::get_child`].
    pub fn get_child_mut(&mut self, tag: &str) -> Option<&mut XmlNode> {
        self.children.iter_mut().find(|child| child.tag == tag)
    }

    /// Return all children with the provided tag.
    pub fn get_children(&self, tag: &str) -> Vec<&XmlNode> {
        self.children
            .iter()
            .filter(|child| child.tag == tag)
            .collect()
    }

    /// Walk a nested child path and return terminal node text if found.
    pub fn get_text<'a>(&'a self, path: &[&str]) -> Option<&'a str> {
        self.descend(path)?.text.as_deref()
    }

    /// Walk a nested child path by tag.
    pub fn descend(&self, path: &[&str]) -> Option<&XmlNode> {
        let mut current = self;
        for segment in path {
            current = current.get_child(segment)?;
        }
        Some(current)
    }

    /// Named `<entry>` children in document order.
    pub fn entries(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter(|child| child.tag == ENTRY_TAG)
    }

    /// Names of the `<entry>` children in document order.
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries().filter_map(XmlNode::name).collect()
    }

    /// Find a named `<entry>` child.
    pub fn find_entry(&self, name: &str) -> Option<&XmlNode> {
        self.entries().find(|entry| entry.name() == Some(name))
    }

    /// Index of a named `<entry>` child among all children.
    pub fn entry_position(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|child| child.tag == ENTRY_TAG && child.name() == Some(name))
    }

    /// Text of every `<member>` child.
    pub fn members(&self) -> Vec<&str> {
        self.children
            .iter()
            .filter(|child| child.tag == MEMBER_TAG)
            .map(|child| child.text.as_deref().unwrap_or(""))
            .collect()
    }

    /// Get or create a child element with the given tag.
    pub fn ensure_child_mut(&mut self, tag: &str) -> &mut XmlNode {
        if let Some(idx) = self.children.iter().position(|c| c.tag == tag) {
            return &mut self.children[idx];
        }
        self.children.push(XmlNode::new(tag));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Get or create a named `<entry>` child.
    pub fn ensure_entry_mut(&mut self, name: &str) -> &mut XmlNode {
        if let Some(idx) = self.entry_position(name) {
            return &mut self.children[idx];
        }
        self.children.push(XmlNode::entry(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Replace the first child sharing `child.tag`, or append it.
    pub fn upsert_child(&mut self, child: XmlNode) {
        if let Some(idx) = self.children.iter().position(|c| c.tag == child.tag) {
            self.children[idx] = child;
            return;
        }
        self.children.push(child);
    }

    /// Remove every child with `tag`, returning how many were removed.
    pub fn remove_children(&mut self, tag: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.tag != tag);
        before - self.children.len()
    }

    /// Remove a named `<entry>` child and return it.
    pub fn remove_entry(&mut self, name: &str) -> Option<XmlNode> {
        let idx = self.entry_position(name)?;
        Some(self.children.remove(idx))
    }
}

impl Display for XmlNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, value)?;
        }

        if self.is_empty_element() {
            return write!(f, "/>");
        }

        write!(f, ">")?;
        if let Some(text) = &self.text {
            write!(f, "{}", text)?;
        }
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::XmlNode;

    #[test]
    fn get_text_walks_nested_path() {
        let root = XmlNode::new("system").with_child(
            XmlNode::new("dns-setting")
                .with_child(XmlNode::new("servers").with_child(XmlNode::with_text(
                    "primary",
                    "10.0.0.1",
                ))),
        );

        assert_eq!(
            root.get_text(&["dns-setting", "servers", "primary"]),
            Some("10.0.0.1")
        );
        assert_eq!(root.get_text(&["dns-setting", "missing"]), None);
    }

    #[test]
    fn entry_helpers_find_and_remove_by_name() {
        let mut rules = XmlNode::new("rules")
            .with_child(XmlNode::entry("a"))
            .with_child(XmlNode::entry("b"));

        assert_eq!(rules.entry_names(), vec!["a", "b"]);
        assert!(rules.find_entry("b").is_some());
        assert_eq!(rules.entry_position("b"), Some(1));

        let removed = rules.remove_entry("a").expect("entry a");
        assert_eq!(removed.name(), Some("a"));
        assert_eq!(rules.entry_names(), vec!["b"]);
    }

    #[test]
    fn ensure_child_mut_reuses_existing_element() {
        let mut root = XmlNode::new("system");
        root.ensure_child_mut("ntp-servers").text = Some("x".to_string());
        root.ensure_child_mut("ntp-servers");
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn display_renders_empty_elements_self_closed() {
        let node = XmlNode::entry("dg1").with_child(XmlNode::new("shared"));
        assert_eq!(node.to_string(), r#"<entry name="dg1"><shared/></entry>"#);
    }

    #[test]
    fn members_reads_member_text() {
        let node = XmlNode::member_list("tag", ["x", "y"]);
        assert_eq!(node.members(), vec!["x", "y"]);
    }
}
