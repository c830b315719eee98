//! Declarative schema model.
//!
//! A resource body is an [`ObjectSchema`]: an ordered attribute table plus
//! inline one-of groups. Attributes know their declarative name, their XML
//! binding and a [`Kind`]. The codec, the plan validator and the drift
//! detector all walk the same tables, so a union node is described once.
//!
//! ## XML bindings
//!
//! By default an attribute `ip_netmask` binds to the child element
//! `<ip-netmask>`. A binding may be a `/`-separated path
//! (`dns-setting/servers/primary`) whose intermediate elements are shared by
//! sibling attributes, or an `@name` XML attribute on the owning element
//! (used for server-assigned uuids).

pub mod registry;
pub mod resources;

use serde_json::Value;

use crate::location::ScopeArm;

pub use registry::Registry;

/// Textual value domains checked by the plan validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Text,
    Ipv4,
    Ip,
    IpNetmask,
    IpRange,
    IpWildcard,
    Ipv6Prefix,
    Mac,
    Port,
    PortList,
    Fqdn,
}

impl ValueFormat {
    pub fn label(self) -> &'static str {
        match self {
            ValueFormat::Text => "text",
            ValueFormat::Ipv4 => "IPv4 address",
            ValueFormat::Ip => "IP address",
            ValueFormat::IpNetmask => "IP address with optional prefix length",
            ValueFormat::IpRange => "IP range",
            ValueFormat::IpWildcard => "IP wildcard mask",
            ValueFormat::Ipv6Prefix => "IPv6 prefix",
            ValueFormat::Mac => "MAC address",
            ValueFormat::Port => "port number",
            ValueFormat::PortList => "port list",
            ValueFormat::Fqdn => "FQDN",
        }
    }
}

/// Whether list order is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Ordered,
    Set,
}

/// The shape of an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Text(ValueFormat),
    Int { min: i64, max: i64 },
    /// Encoded as `yes` / `no`.
    Bool,
    Enum(&'static [&'static str]),
    /// String list encoded as `<member>` children.
    Members { order: ListOrder, format: ValueFormat },
    /// Parameterless marker: declared as `{}`, encoded as an empty element.
    Empty,
    Object(ObjectSchema),
    Variant(VariantSchema),
    /// Nested `<entry name="...">` list; declared as a list of objects with `name`.
    Entries { order: ListOrder, entry: ObjectSchema },
}

impl Kind {
    pub fn text() -> Self {
        Kind::Text(ValueFormat::Text)
    }

    pub fn formatted(format: ValueFormat) -> Self {
        Kind::Text(format)
    }

    pub fn int(min: i64, max: i64) -> Self {
        Kind::Int { min, max }
    }

    pub fn members() -> Self {
        Kind::Members {
            order: ListOrder::Ordered,
            format: ValueFormat::Text,
        }
    }

    pub fn member_set() -> Self {
        Kind::Members {
            order: ListOrder::Set,
            format: ValueFormat::Text,
        }
    }

    pub fn member_set_of(format: ValueFormat) -> Self {
        Kind::Members {
            order: ListOrder::Set,
            format,
        }
    }

    pub fn object(attributes: Vec<Attribute>) -> Self {
        Kind::Object(ObjectSchema::new(attributes))
    }

    pub fn variant(arms: Vec<Attribute>) -> Self {
        Kind::Variant(VariantSchema {
            arms,
            optional: true,
        })
    }

    pub fn required_variant(arms: Vec<Attribute>) -> Self {
        Kind::Variant(VariantSchema {
            arms,
            optional: false,
        })
    }

    pub fn entries(attributes: Vec<Attribute>) -> Self {
        Kind::Entries {
            order: ListOrder::Ordered,
            entry: ObjectSchema::new(attributes),
        }
    }

    pub fn entry_set(attributes: Vec<Attribute>) -> Self {
        Kind::Entries {
            order: ListOrder::Set,
            entry: ObjectSchema::new(attributes),
        }
    }

    /// Human label used in type-mismatch diagnostics.
    pub fn expected(&self) -> &'static str {
        match self {
            Kind::Text(_) | Kind::Enum(_) => "string",
            Kind::Int { .. } => "integer",
            Kind::Bool => "bool",
            Kind::Members { .. } => "list of strings",
            Kind::Empty => "empty object",
            Kind::Object(_) | Kind::Variant(_) => "object",
            Kind::Entries { .. } => "list of named objects",
        }
    }
}

/// Whether the user supplies an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    /// Assigned by the server; never user-supplied or encoded.
    Computed,
}

/// One field of an object schema or one arm of a variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: &'static str,
    xml: Vec<String>,
    pub kind: Kind,
    pub presence: Presence,
    /// Value the server assumes when the field is omitted.
    pub default: Option<Value>,
    pub required_with: Vec<&'static str>,
    pub conflicts_with: Vec<&'static str>,
}

impl Attribute {
    pub fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            xml: vec![name.replace('_', "-")],
            kind,
            presence: Presence::Optional,
            default: None,
            required_with: Vec::new(),
            conflicts_with: Vec::new(),
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, Kind::text())
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, Kind::Bool)
    }

    /// A parameterless `{}` arm.
    pub fn marker(name: &'static str) -> Self {
        Self::new(name, Kind::Empty)
    }

    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub fn computed(mut self) -> Self {
        self.presence = Presence::Computed;
        self
    }

    /// Override the XML binding (`a/b/c` path or `@attr`).
    pub fn xml(mut self, binding: &str) -> Self {
        self.xml = binding.split('/').map(ToString::to_string).collect();
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn requires(mut self, other: &'static str) -> Self {
        self.required_with.push(other);
        self
    }

    pub fn conflicts(mut self, other: &'static str) -> Self {
        self.conflicts_with.push(other);
        self
    }

    /// XML binding as path segments.
    pub fn xml_path(&self) -> Vec<&str> {
        self.xml.iter().map(String::as_str).collect()
    }

    /// First segment of the XML binding.
    pub fn xml_head(&self) -> &str {
        self.xml.first().map(String::as_str).unwrap_or(self.name)
    }

    /// XML attribute name when the binding is `@name`.
    pub fn xml_attribute(&self) -> Option<&str> {
        match self.xml.as_slice() {
            [single] => single.strip_prefix('@'),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.presence == Presence::Computed
    }
}

/// Attributes of one object plus inline one-of groups among them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub attributes: Vec<Attribute>,
    pub one_of: Vec<OneOf>,
}

/// Sibling attributes of which at most one may be set.
#[derive(Debug, Clone, PartialEq)]
pub struct OneOf {
    pub arms: Vec<&'static str>,
    pub optional: bool,
}

impl ObjectSchema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            one_of: Vec::new(),
        }
    }

    /// Declare an inline one-of group; `optional` allows none to be set.
    pub fn one_of(mut self, arms: &[&'static str], optional: bool) -> Self {
        self.one_of.push(OneOf {
            arms: arms.to_vec(),
            optional,
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes whose XML binding starts with `tag`.
    pub fn attributes_under(&self, tag: &str) -> impl Iterator<Item = &Attribute> {
        let tag = tag.to_string();
        self.attributes
            .iter()
            .filter(move |a| a.xml_head() == tag)
    }
}

/// A discriminated union node: an ordered arm table.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSchema {
    pub arms: Vec<Attribute>,
    pub optional: bool,
}

impl VariantSchema {
    pub fn arm(&self, name: &str) -> Option<&Attribute> {
        self.arms.iter().find(|a| a.name == name)
    }

    pub fn arm_names(&self) -> Vec<&'static str> {
        self.arms.iter().map(|a| a.name).collect()
    }
}

/// How a resource maps onto the server configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// One named entry in a container (C3).
    Entry,
    /// A provider-owned sub-list of a server list (C4/C5).
    Collection {
        /// Declarative attribute holding the owned entries.
        list: &'static str,
        keying: CollectionKeying,
    },
    /// A masked slice of a shared document (C6).
    Singleton { mask: Vec<&'static str> },
}

/// Identity and ordering model of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKeying {
    /// Unordered, compared by membership.
    Set,
    /// Ordered, keyed by name.
    Ordered,
    /// Ordered, keyed by server-assigned uuid.
    Uuid,
}

/// A managed resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub type_name: &'static str,
    pub shape: Shape,
    pub locations: Vec<ScopeArm>,
    /// Element path under the scope root: the entry container, or the
    /// document itself for singletons.
    pub container: Vec<&'static str>,
    /// Whether the container lives under the scope's rulebase.
    pub rulebase: bool,
    pub body: ObjectSchema,
}

impl ResourceSchema {
    pub fn entry(
        type_name: &'static str,
        container: &'static str,
        locations: &[ScopeArm],
        body: ObjectSchema,
    ) -> Self {
        Self {
            type_name,
            shape: Shape::Entry,
            locations: locations.to_vec(),
            container: container.split('/').collect(),
            rulebase: false,
            body,
        }
    }

    pub fn collection(
        type_name: &'static str,
        container: &'static str,
        list: &'static str,
        keying: CollectionKeying,
        locations: &[ScopeArm],
        body: ObjectSchema,
    ) -> Self {
        Self {
            type_name,
            shape: Shape::Collection { list, keying },
            locations: locations.to_vec(),
            container: container.split('/').collect(),
            rulebase: false,
            body,
        }
    }

    pub fn singleton(
        type_name: &'static str,
        document: &'static str,
        mask: &[&'static str],
        locations: &[ScopeArm],
        body: ObjectSchema,
    ) -> Self {
        Self {
            type_name,
            shape: Shape::Singleton {
                mask: mask.to_vec(),
            },
            locations: locations.to_vec(),
            container: document.split('/').collect(),
            rulebase: false,
            body,
        }
    }

    pub fn in_rulebase(mut self) -> Self {
        self.rulebase = true;
        self
    }

    pub fn allows(&self, arm: ScopeArm) -> bool {
        self.locations.contains(&arm)
    }

    pub fn keying(&self) -> Option<CollectionKeying> {
        match self.shape {
            Shape::Collection { keying, .. } => Some(keying),
            _ => None,
        }
    }

    pub fn is_uuid_keyed(&self) -> bool {
        self.keying() == Some(CollectionKeying::Uuid)
    }

    /// Document identity used to group singleton co-tenants.
    pub fn document_key(&self) -> String {
        self.container.join("/")
    }
}
