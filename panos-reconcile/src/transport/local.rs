//! In-memory transport over an XML configuration document.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use regex::Regex;
use tracing::debug;
use uuid::Uuid;
use xml_config_core::{parse_file, write_file, ParseError, WriteError, XmlNode, ENTRY_TAG};

use super::{Anchor, EntryRef, ListQuery, Target, Transport, TransportError};

const UUID_ATTR: &str = "uuid";

/// Kind of a recorded RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Create,
    Read,
    Update,
    Delete,
    List,
    Rename,
    MoveGroup,
    MoveEntry,
    ReadDocument,
    WriteDocument,
}

impl CallKind {
    pub fn is_mutation(self) -> bool {
        !matches!(
            self,
            CallKind::Read | CallKind::List | CallKind::ReadDocument
        )
    }
}

/// One recorded RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub xpath: String,
    pub detail: String,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        self.kind.is_mutation()
    }
}

/// Transport backed by an in-memory document.
///
/// Every RPC is recorded. Rename and group moves can be switched off to
/// exercise the reconcilers' fallbacks.
#[derive(Debug)]
pub struct LocalTransport {
    document: Mutex<XmlNode>,
    calls: Mutex<Vec<Call>>,
    rename_supported: bool,
    move_group_supported: bool,
}

impl LocalTransport {
    pub fn new(document: XmlNode) -> Self {
        Self {
            document: Mutex::new(document),
            calls: Mutex::new(Vec::new()),
            rename_supported: true,
            move_group_supported: true,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        Ok(Self::new(parse_file(path)?))
    }

    pub fn without_rename(mut self) -> Self {
        self.rename_supported = false;
        self
    }

    pub fn without_move_group(mut self) -> Self {
        self.move_group_supported = false;
        self
    }

    /// Snapshot of the current document.
    pub fn document(&self) -> XmlNode {
        self.doc().clone()
    }

    pub fn save(&self, path: &Path) -> Result<(), WriteError> {
        write_file(&self.doc(), path)
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn mutation_count(&self) -> usize {
        lock(&self.calls).iter().filter(|c| c.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Entry names of the target container, in document order.
    pub fn entry_names(&self, target: &Target) -> Vec<String> {
        self.doc()
            .find(&target.xpath)
            .map(|c| c.entry_names().into_iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    fn doc(&self) -> MutexGuard<'_, XmlNode> {
        lock(&self.document)
    }

    fn record(&self, kind: CallKind, target: &Target, detail: impl Into<String>) {
        let call = Call {
            kind,
            xpath: target.xpath.to_string(),
            detail: detail.into(),
        };
        debug!(kind = ?call.kind, xpath = %call.xpath, detail = %call.detail, "local rpc");
        lock(&self.calls).push(call);
    }

    fn with_container<T>(
        &self,
        target: &Target,
        f: impl FnOnce(&mut XmlNode) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut doc = self.doc();
        let container = doc
            .find_mut(&target.xpath)
            .ok_or_else(|| TransportError::not_found(target.xpath.to_string()))?;
        f(container)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn position(container: &XmlNode, entry: &EntryRef) -> Option<usize> {
    container.children.iter().position(|child| {
        child.tag == ENTRY_TAG
            && match entry {
                EntryRef::Name(name) => child.name() == Some(name.as_str()),
                EntryRef::Uuid(uuid) => child.attribute(UUID_ATTR) == Some(uuid.as_str()),
            }
    })
}

fn require(container: &XmlNode, entry: &EntryRef) -> Result<usize, TransportError> {
    position(container, entry).ok_or_else(|| TransportError::not_found(entry.to_string()))
}

fn insertion_index(container: &XmlNode, anchor: &Anchor) -> Result<usize, TransportError> {
    match anchor {
        Anchor::Top => Ok(0),
        Anchor::Bottom => Ok(container.children.len()),
        Anchor::Before(pivot) => require(container, pivot),
        Anchor::After(pivot) => require(container, pivot).map(|idx| idx + 1),
    }
}

fn anchor_ref(anchor: &Anchor) -> Option<&EntryRef> {
    match anchor {
        Anchor::Before(pivot) | Anchor::After(pivot) => Some(pivot),
        Anchor::Top | Anchor::Bottom => None,
    }
}

impl Transport for LocalTransport {
    fn create(&self, target: &Target, entry: &XmlNode) -> Result<(), TransportError> {
        let name = entry
            .name()
            .ok_or_else(|| TransportError::rejected(400, "entry without a name"))?
            .to_string();
        self.record(CallKind::Create, target, &name);
        let mut doc = self.doc();
        let container = doc
            .ensure_path_mut(&target.xpath)
            .ok_or_else(|| TransportError::rejected(400, target.xpath.to_string()))?;
        if container.find_entry(&name).is_some() {
            return Err(TransportError::rejected(
                409,
                format!("'{name}' already exists"),
            ));
        }
        let mut entry = entry.clone();
        if target.uuid_keyed && entry.attribute(UUID_ATTR).is_none() {
            entry
                .attributes
                .insert(UUID_ATTR.to_string(), Uuid::new_v4().to_string());
        }
        container.children.push(entry);
        Ok(())
    }

    fn read(&self, target: &Target, name: &str) -> Result<XmlNode, TransportError> {
        self.record(CallKind::Read, target, name);
        self.doc()
            .find(&target.entry_xpath(name))
            .cloned()
            .ok_or_else(|| TransportError::not_found(name.to_string()))
    }

    fn update(&self, target: &Target, name: &str, entry: &XmlNode) -> Result<(), TransportError> {
        self.record(CallKind::Update, target, name);
        self.with_container(target, |container| {
            let idx = require(container, &EntryRef::Name(name.to_string()))?;
            let mut entry = entry.clone();
            if let Some(uuid) = container.children[idx].attribute(UUID_ATTR) {
                entry
                    .attributes
                    .insert(UUID_ATTR.to_string(), uuid.to_string());
            }
            container.children[idx] = entry;
            Ok(())
        })
    }

    fn delete(&self, target: &Target, names: &[String]) -> Result<(), TransportError> {
        self.record(CallKind::Delete, target, names.join(","));
        self.with_container(target, |container| {
            if let Some(missing) = names.iter().find(|n| container.find_entry(n).is_none()) {
                return Err(TransportError::not_found(missing.clone()));
            }
            for name in names {
                container.remove_entry(name);
            }
            Ok(())
        })
    }

    fn list(&self, target: &Target, query: &ListQuery) -> Result<Vec<XmlNode>, TransportError> {
        self.record(CallKind::List, target, query.filter.clone().unwrap_or_default());
        let filter = query
            .filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| TransportError::rejected(400, err.to_string()))?;
        let doc = self.doc();
        let Some(container) = doc.find(&target.xpath) else {
            return Ok(Vec::new());
        };
        Ok(container
            .entries()
            .filter(|entry| match (&filter, entry.name()) {
                (Some(re), Some(name)) => re.is_match(name),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect())
    }

    fn rename(
        &self,
        target: &Target,
        entry: &EntryRef,
        new_name: &str,
    ) -> Result<(), TransportError> {
        if !self.rename_supported {
            return Err(TransportError::unsupported("rename"));
        }
        self.record(CallKind::Rename, target, format!("{entry} -> {new_name}"));
        self.with_container(target, |container| {
            if container.find_entry(new_name).is_some() {
                return Err(TransportError::rejected(
                    409,
                    format!("'{new_name}' already exists"),
                ));
            }
            let idx = require(container, entry)?;
            container.children[idx]
                .attributes
                .insert("name".to_string(), new_name.to_string());
            Ok(())
        })
    }

    fn move_group(
        &self,
        target: &Target,
        entries: &[EntryRef],
        anchor: &Anchor,
    ) -> Result<(), TransportError> {
        if !self.move_group_supported {
            return Err(TransportError::unsupported("move_group"));
        }
        let detail = entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.record(CallKind::MoveGroup, target, format!("{detail} {anchor}"));
        self.with_container(target, |container| {
            if let Some(pivot) = anchor_ref(anchor) {
                if entries.contains(pivot) {
                    return Err(TransportError::rejected(400, "pivot is part of the group"));
                }
            }
            let mut moved = Vec::with_capacity(entries.len());
            for entry in entries {
                let idx = require(container, entry)?;
                moved.push(container.children.remove(idx));
            }
            let at = insertion_index(container, anchor)?;
            container.children.splice(at..at, moved);
            Ok(())
        })
    }

    fn move_entry(
        &self,
        target: &Target,
        entry: &EntryRef,
        anchor: &Anchor,
    ) -> Result<(), TransportError> {
        self.record(CallKind::MoveEntry, target, format!("{entry} {anchor}"));
        self.with_container(target, |container| {
            if anchor_ref(anchor) == Some(entry) {
                return Err(TransportError::rejected(400, "cannot move relative to itself"));
            }
            let idx = require(container, entry)?;
            let node = container.children.remove(idx);
            let at = insertion_index(container, anchor)?;
            container.children.insert(at, node);
            Ok(())
        })
    }

    fn read_document(&self, target: &Target) -> Result<XmlNode, TransportError> {
        self.record(CallKind::ReadDocument, target, "");
        self.doc()
            .find(&target.xpath)
            .cloned()
            .ok_or_else(|| TransportError::not_found(target.xpath.to_string()))
    }

    fn write_document(&self, target: &Target, document: &XmlNode) -> Result<(), TransportError> {
        self.record(CallKind::WriteDocument, target, "");
        if target.xpath.last_tag() != Some(document.tag.as_str()) {
            return Err(TransportError::rejected(
                400,
                format!("document <{}> does not match {}", document.tag, target.xpath),
            ));
        }
        let mut doc = self.doc();
        let slot = doc
            .ensure_path_mut(&target.xpath)
            .ok_or_else(|| TransportError::rejected(400, target.xpath.to_string()))?;
        *slot = document.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use xml_config_core::{parse, XPath, XmlNode};

    use super::{CallKind, LocalTransport};
    use crate::location::Scope;
    use crate::transport::{Anchor, EntryRef, ListQuery, Target, Transport};

    fn rules_target(uuid_keyed: bool) -> Target {
        Target {
            resource: "security_policy".to_string(),
            scope: Scope::Shared,
            params: BTreeMap::new(),
            xpath: XPath::root("config").tag("rules"),
            uuid_keyed,
        }
    }

    fn transport() -> LocalTransport {
        LocalTransport::new(
            parse(br#"<config><rules><entry name="A" uuid="u-a"/><entry name="B" uuid="u-b"/><entry name="Z" uuid="u-z"/></rules></config>"#)
                .expect("parse"),
        )
    }

    fn names(transport: &LocalTransport) -> Vec<String> {
        transport.entry_names(&rules_target(true))
    }

    #[test]
    fn create_assigns_uuid_in_uuid_keyed_containers() {
        let local = transport();
        local
            .create(&rules_target(true), &XmlNode::entry("r1"))
            .expect("create");
        let created = local.read(&rules_target(true), "r1").expect("read");
        assert!(created.attribute("uuid").is_some());
        assert_eq!(names(&local), vec!["A", "B", "Z", "r1"]);
    }

    #[test]
    fn update_preserves_uuid_and_position() {
        let local = transport();
        let replacement = XmlNode::entry("B").with_child(XmlNode::with_text("action", "deny"));
        local
            .update(&rules_target(true), "B", &replacement)
            .expect("update");
        let read = local.read(&rules_target(true), "B").expect("read");
        assert_eq!(read.attribute("uuid"), Some("u-b"));
        assert_eq!(read.get_text(&["action"]), Some("deny"));
        assert_eq!(names(&local), vec!["A", "B", "Z"]);
    }

    #[test]
    fn moves_entries_and_groups() {
        let local = transport();
        let target = rules_target(true);
        local
            .move_entry(&target, &EntryRef::Uuid("u-z".to_string()), &Anchor::Top)
            .expect("move");
        assert_eq!(names(&local), vec!["Z", "A", "B"]);

        local
            .move_group(
                &target,
                &[EntryRef::Name("B".to_string()), EntryRef::Name("A".to_string())],
                &Anchor::Before(EntryRef::Name("Z".to_string())),
            )
            .expect("group move");
        assert_eq!(names(&local), vec!["B", "A", "Z"]);
    }

    #[test]
    fn disabled_capabilities_report_unsupported() {
        let local = transport().without_rename().without_move_group();
        let target = rules_target(true);
        let err = local
            .rename(&target, &EntryRef::Name("A".to_string()), "A2")
            .expect_err("rename disabled");
        assert!(err.is_unsupported());
        let err = local
            .move_group(&target, &[EntryRef::Name("A".to_string())], &Anchor::Top)
            .expect_err("group move disabled");
        assert!(err.is_unsupported());
        assert_eq!(local.mutation_count(), 0);
    }

    #[test]
    fn delete_is_atomic_on_missing_names() {
        let local = transport();
        let err = local
            .delete(&rules_target(true), &["A".to_string(), "nope".to_string()])
            .expect_err("missing");
        assert!(err.is_not_found());
        assert_eq!(names(&local), vec!["A", "B", "Z"]);
    }

    #[test]
    fn list_applies_name_filter_and_records_calls() {
        let local = transport();
        let query = ListQuery {
            filter: Some("^[AB]$".to_string()),
            ..ListQuery::default()
        };
        let listed = local.list(&rules_target(true), &query).expect("list");
        assert_eq!(listed.len(), 2);
        let calls = local.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::List);
        assert!(!calls[0].is_mutation());
    }

    #[test]
    fn write_document_requires_matching_tag() {
        let local = transport();
        let target = Target {
            xpath: XPath::root("config").tag("system"),
            ..rules_target(false)
        };
        assert!(local.write_document(&target, &XmlNode::new("other")).is_err());
        local
            .write_document(&target, &XmlNode::with_text("system", ""))
            .expect("write");
        assert!(local.read_document(&target).is_ok());
    }
}
