use crate::location::ScopeArm;
use crate::schema::{
    Attribute, CollectionKeying, Kind, ObjectSchema, ResourceSchema, ValueFormat,
};

use super::OBJECT_SCOPES;

fn tags() -> Attribute {
    Attribute::new("tags", Kind::member_set()).xml("tag")
}

pub(super) fn address_body() -> ObjectSchema {
    ObjectSchema::new(vec![
        Attribute::text("description"),
        Attribute::new("ip_netmask", Kind::formatted(ValueFormat::IpNetmask)),
        Attribute::new("ip_range", Kind::formatted(ValueFormat::IpRange)),
        Attribute::new("ip_wildcard", Kind::formatted(ValueFormat::IpWildcard)),
        Attribute::new("fqdn", Kind::formatted(ValueFormat::Fqdn)),
        tags(),
    ])
    .one_of(&["ip_netmask", "ip_range", "ip_wildcard", "fqdn"], false)
}

pub fn address() -> ResourceSchema {
    let mut scopes = OBJECT_SCOPES.to_vec();
    scopes.push(ScopeArm::TemplateVsys);
    ResourceSchema::entry("address", "address", &scopes, address_body())
}

pub fn address_group() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::text("description"),
        Attribute::new("static", Kind::member_set()),
        Attribute::new(
            "dynamic",
            Kind::object(vec![Attribute::text("filter").required()]),
        ),
        tags(),
    ])
    .one_of(&["static", "dynamic"], false);
    ResourceSchema::entry("address_group", "address-group", OBJECT_SCOPES, body)
}

fn port_spec() -> Kind {
    Kind::object(vec![
        Attribute::new("port", Kind::formatted(ValueFormat::PortList)).required(),
        Attribute::new("source_port", Kind::formatted(ValueFormat::PortList)),
    ])
}

pub fn service() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::text("description"),
        Attribute::new(
            "protocol",
            Kind::required_variant(vec![
                Attribute::new("tcp", port_spec()),
                Attribute::new("udp", port_spec()),
            ]),
        )
        .required(),
        tags(),
    ]);
    ResourceSchema::entry("service", "service", OBJECT_SCOPES, body)
}

/// Bulk address objects, managed by membership.
pub fn addresses() -> ResourceSchema {
    ResourceSchema::collection(
        "addresses",
        "address",
        "addresses",
        CollectionKeying::Set,
        OBJECT_SCOPES,
        address_body(),
    )
}
