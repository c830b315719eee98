use crate::XmlNode;

/// A single diff outcome for a node path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    /// Node exists on both sides but its text or attributes differ.
    Modified {
        path: String,
        left: String,
        right: String,
    },
    /// Node only in the left tree.
    OnlyLeft { path: String, node: XmlNode },
    /// Node only in the right tree.
    OnlyRight { path: String, node: XmlNode },
    /// Structural mismatch, such as a changed child order in an ordered list.
    Structural { path: String, description: String },
}

impl DiffEntry {
    /// Dotted path of the node this entry describes.
    pub fn path(&self) -> &str {
        match self {
            DiffEntry::Modified { path, .. }
            | DiffEntry::OnlyLeft { path, .. }
            | DiffEntry::OnlyRight { path, .. }
            | DiffEntry::Structural { path, .. } => path,
        }
    }

    /// Tag of the root's direct child this entry falls under, if any.
    ///
    /// For `system.ntp-servers[1].primary-ntp-server[1]` with root `system`
    /// this is `ntp-servers`.
    pub fn top_level_tag<'a>(&'a self, root: &str) -> Option<&'a str> {
        let rest = self.path().strip_prefix(root)?.strip_prefix('.')?;
        rest.split('[').next().filter(|tag| !tag.is_empty())
    }
}
