use serde_json::json;

use crate::location::ScopeArm;
use crate::schema::{Attribute, Kind, ObjectSchema, ResourceSchema, ValueFormat};

use super::NETWORK_SCOPES;

fn layer3() -> Kind {
    Kind::object(vec![
        Attribute::new("mtu", Kind::int(576, 9216)),
        Attribute::new("ips", Kind::entry_set(vec![]))
            .xml("ip")
            .conflicts("dhcp_client"),
        Attribute::new(
            "dhcp_client",
            Kind::object(vec![
                Attribute::bool("enable"),
                Attribute::bool("create_default_route"),
                Attribute::new("default_route_metric", Kind::int(1, 65_535))
                    .requires("create_default_route"),
            ]),
        ),
        Attribute::new(
            "ipv6",
            Kind::object(vec![
                Attribute::bool("enabled"),
                Attribute::new("addresses", Kind::member_set_of(ValueFormat::Ipv6Prefix))
                    .xml("address"),
            ]),
        ),
        Attribute::text("interface_management_profile"),
    ])
}

pub fn ethernet_interface() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::text("comment"),
        Attribute::new(
            "link_speed",
            Kind::Enum(&["auto", "10", "100", "1000", "10000"]),
        )
        .default_value(json!("auto")),
        Attribute::marker("layer2"),
        Attribute::new("layer3", layer3()),
        Attribute::marker("virtual_wire"),
        Attribute::marker("tap"),
    ])
    .one_of(&["layer2", "layer3", "virtual_wire", "tap"], true);
    ResourceSchema::entry(
        "ethernet_interface",
        "network/interface/ethernet",
        NETWORK_SCOPES,
        body,
    )
}

pub fn zone() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::new(
            "network",
            Kind::variant(vec![
                Attribute::new("layer2", Kind::member_set()),
                Attribute::new("layer3", Kind::member_set()),
                Attribute::new("virtual_wire", Kind::member_set()),
                Attribute::new("tap", Kind::member_set()),
                Attribute::marker("tunnel"),
            ]),
        ),
        Attribute::bool("enable_user_identification"),
    ]);
    ResourceSchema::entry(
        "zone",
        "zone",
        &[ScopeArm::Vsys, ScopeArm::TemplateVsys],
        body,
    )
}

fn static_route() -> Vec<Attribute> {
    vec![
        Attribute::new("destination", Kind::formatted(ValueFormat::IpNetmask)).required(),
        Attribute::text("interface"),
        Attribute::new(
            "nexthop",
            Kind::variant(vec![
                Attribute::new("ip_address", Kind::formatted(ValueFormat::Ip)),
                Attribute::text("next_vr"),
                Attribute::new("fqdn", Kind::formatted(ValueFormat::Fqdn)),
                Attribute::marker("discard"),
            ]),
        ),
        Attribute::new("metric", Kind::int(1, 65_535)).default_value(json!(10)),
        Attribute::new("admin_dist", Kind::int(10, 240)),
    ]
}

pub fn virtual_router() -> ResourceSchema {
    let distance = |name: &'static str| Attribute::new(name, Kind::int(10, 240));
    let body = ObjectSchema::new(vec![
        Attribute::new("interfaces", Kind::member_set()).xml("interface"),
        Attribute::new(
            "admin_dists",
            Kind::object(vec![
                distance("static"),
                distance("static_ipv6"),
                distance("ospf_int"),
                distance("ospf_ext"),
                distance("ebgp"),
                distance("ibgp"),
                distance("rip"),
            ]),
        ),
        Attribute::new("static_routes", Kind::entries(static_route()))
            .xml("routing-table/ip/static-route"),
    ]);
    ResourceSchema::entry(
        "virtual_router",
        "network/virtual-router",
        NETWORK_SCOPES,
        body,
    )
}

fn dhcp_server() -> Kind {
    Kind::object(vec![
        Attribute::new("mode", Kind::Enum(&["enabled", "disabled", "auto"]))
            .default_value(json!("auto")),
        Attribute::new("ip_pools", Kind::member_set()).xml("ip-pool"),
        Attribute::new(
            "option",
            Kind::object(vec![
                Attribute::new("gateway", Kind::formatted(ValueFormat::Ipv4)),
                Attribute::new("subnet_mask", Kind::formatted(ValueFormat::Ipv4)),
                Attribute::new(
                    "lease",
                    Kind::variant(vec![
                        Attribute::marker("unlimited"),
                        Attribute::new("timeout", Kind::int(1, 1_000_000)),
                    ]),
                ),
                Attribute::new(
                    "dns",
                    Kind::object(vec![
                        Attribute::new("primary", Kind::formatted(ValueFormat::Ip)),
                        Attribute::new("secondary", Kind::formatted(ValueFormat::Ip)),
                    ]),
                ),
            ]),
        ),
        Attribute::new(
            "reserved",
            Kind::entry_set(vec![
                Attribute::new("mac", Kind::formatted(ValueFormat::Mac)).required(),
                Attribute::text("description"),
            ]),
        ),
    ])
}

/// DHCP service bound to an interface; the entry name is the interface name.
pub fn dhcp() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::new("server", dhcp_server()),
        Attribute::new(
            "relay",
            Kind::object(vec![Attribute::new(
                "ip",
                Kind::object(vec![
                    Attribute::bool("enabled"),
                    Attribute::new("servers", Kind::member_set_of(ValueFormat::Ip)).xml("server"),
                ]),
            )]),
        ),
    ])
    .one_of(&["server", "relay"], false);
    ResourceSchema::entry("dhcp", "network/dhcp/interface", NETWORK_SCOPES, body)
}
