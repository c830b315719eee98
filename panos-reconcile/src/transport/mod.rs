//! The CRUD surface the reconcilers consume.
//!
//! A remote client speaks XML-over-HTTPS to the management API; this crate
//! only depends on the [`Transport`] trait. [`local::LocalTransport`] keeps
//! the configuration tree in memory and backs the CLI and the tests.

pub mod local;

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use thiserror::Error;
use xml_config_core::{XPath, XmlNode};

use crate::location::Scope;
use crate::schema::ResourceSchema;

/// Where a resource's entries (or its document) live on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub resource: String,
    pub scope: Scope,
    /// Addressing parameters the remote API expects for this scope.
    pub params: BTreeMap<&'static str, String>,
    /// Container element for entries, or the document for singletons.
    pub xpath: XPath,
    pub uuid_keyed: bool,
}

impl Target {
    pub fn resolve(schema: &ResourceSchema, scope: &Scope) -> Self {
        let mut xpath = scope.xpath();
        if schema.rulebase {
            xpath = xpath.tag(scope.rulebase_tag());
        }
        Self {
            resource: schema.type_name.to_string(),
            scope: scope.clone(),
            params: scope.addressing_params(schema.rulebase),
            xpath: xpath.tags(&schema.container),
            uuid_keyed: schema.is_uuid_keyed(),
        }
    }

    pub fn entry_xpath(&self, name: &str) -> XPath {
        self.xpath.clone().entry(name)
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.resource, self.scope)
    }
}

/// How an RPC addresses one entry of a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryRef {
    Name(String),
    Uuid(String),
}

impl Display for EntryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EntryRef::Name(name) => write!(f, "{name}"),
            EntryRef::Uuid(uuid) => write!(f, "uuid:{uuid}"),
        }
    }
}

/// Destination of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Top,
    Bottom,
    Before(EntryRef),
    After(EntryRef),
}

impl Display for Anchor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Top => write!(f, "top"),
            Anchor::Bottom => write!(f, "bottom"),
            Anchor::Before(entry) => write!(f, "before {entry}"),
            Anchor::After(entry) => write!(f, "after {entry}"),
        }
    }
}

/// Which configuration a list reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListAction {
    /// Candidate configuration.
    #[default]
    Get,
    /// Running configuration.
    Show,
}

/// Parameters of a list RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub action: ListAction,
    /// Regular expression over entry names.
    pub filter: Option<String>,
    /// Quote character used when the filter is embedded into an xpath.
    pub quote: char,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            action: ListAction::Get,
            filter: None,
            quote: '\'',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    NotFound,
    Unsupported,
    Timeout,
    ConnectionReset,
    Rejected { code: u16 },
    Other,
}

impl Display for TransportErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::NotFound => write!(f, "not found"),
            TransportErrorKind::Unsupported => write!(f, "unsupported"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::ConnectionReset => write!(f, "connection reset"),
            TransportErrorKind::Rejected { code } => write!(f, "rejected ({code})"),
            TransportErrorKind::Other => write!(f, "transport failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            TransportErrorKind::Unsupported,
            format!("{operation} is not supported by this transport"),
        )
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionReset, message)
    }

    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected { code }, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == TransportErrorKind::NotFound
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind == TransportErrorKind::Unsupported
    }

    /// Timeouts and resets may succeed on retry; everything else will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout | TransportErrorKind::ConnectionReset
        )
    }
}

/// Configuration-tree RPCs.
///
/// `read` and `read_document` fail with a not-found error when the element
/// does not exist. `rename` and `move_group` are optional capabilities;
/// callers fall back to delete/create and `move_entry` when they report
/// [`TransportErrorKind::Unsupported`].
pub trait Transport: Send + Sync {
    fn create(&self, target: &Target, entry: &XmlNode) -> Result<(), TransportError>;

    fn read(&self, target: &Target, name: &str) -> Result<XmlNode, TransportError>;

    /// Replace the entry `name` with `entry` (edit semantics).
    fn update(&self, target: &Target, name: &str, entry: &XmlNode) -> Result<(), TransportError>;

    fn delete(&self, target: &Target, names: &[String]) -> Result<(), TransportError>;

    /// Entries of the container, in server order.
    fn list(&self, target: &Target, query: &ListQuery) -> Result<Vec<XmlNode>, TransportError>;

    fn rename(
        &self,
        _target: &Target,
        _entry: &EntryRef,
        _new_name: &str,
    ) -> Result<(), TransportError> {
        Err(TransportError::unsupported("rename"))
    }

    /// Move `entries` as one contiguous block, in the given order.
    fn move_group(
        &self,
        _target: &Target,
        _entries: &[EntryRef],
        _anchor: &Anchor,
    ) -> Result<(), TransportError> {
        Err(TransportError::unsupported("move_group"))
    }

    fn move_entry(
        &self,
        target: &Target,
        entry: &EntryRef,
        anchor: &Anchor,
    ) -> Result<(), TransportError>;

    fn read_document(&self, target: &Target) -> Result<XmlNode, TransportError>;

    fn write_document(&self, target: &Target, document: &XmlNode) -> Result<(), TransportError>;
}
