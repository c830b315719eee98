use serde_json::json;

use crate::schema::{Attribute, Kind, ObjectSchema, ResourceSchema, ValueFormat};

use super::NETWORK_SCOPES;

pub fn ike_crypto_profile() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::new("hash", Kind::members()).required(),
        Attribute::new("dh_group", Kind::members()).required(),
        Attribute::new("encryption", Kind::members()).required(),
        Attribute::new(
            "lifetime",
            Kind::variant(vec![
                Attribute::new("seconds", Kind::int(180, 65_535)),
                Attribute::new("minutes", Kind::int(3, 65_535)),
                Attribute::new("hours", Kind::int(1, 65_535)),
                Attribute::new("days", Kind::int(1, 365)),
            ]),
        )
        .default_value(json!({"hours": 8})),
        Attribute::new("authentication_multiple", Kind::int(0, 50)),
    ]);
    ResourceSchema::entry(
        "ike_crypto_profile",
        "network/ike/crypto-profiles/ike-crypto-profiles",
        NETWORK_SCOPES,
        body,
    )
}

fn proxy_protocol_ports() -> Kind {
    Kind::object(vec![
        Attribute::new("local_port", Kind::int(0, 65_535)),
        Attribute::new("remote_port", Kind::int(0, 65_535)),
    ])
}

fn auto_key() -> Kind {
    Kind::object(vec![
        Attribute::new("ike_gateways", Kind::entries(vec![])).xml("ike-gateway"),
        Attribute::text("ipsec_crypto_profile"),
        Attribute::new(
            "proxy_ids",
            Kind::entries(vec![
                Attribute::new("local", Kind::formatted(ValueFormat::IpNetmask)),
                Attribute::new("remote", Kind::formatted(ValueFormat::IpNetmask)),
                Attribute::new(
                    "protocol",
                    Kind::variant(vec![
                        Attribute::marker("any"),
                        Attribute::new("tcp", proxy_protocol_ports()),
                        Attribute::new("udp", proxy_protocol_ports()),
                        Attribute::new("number", Kind::int(1, 254)),
                    ]),
                ),
            ]),
        )
        .xml("proxy-id"),
    ])
}

fn manual_key() -> Kind {
    Kind::object(vec![
        Attribute::text("local_spi"),
        Attribute::text("remote_spi"),
        Attribute::new(
            "local_address",
            Kind::object(vec![
                Attribute::text("interface").required(),
                Attribute::new("ip", Kind::formatted(ValueFormat::IpNetmask)),
            ]),
        ),
        Attribute::new(
            "peer_address",
            Kind::object(vec![Attribute::new("ip", Kind::formatted(ValueFormat::Ip))]),
        ),
    ])
}

pub fn ipsec_tunnel() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::text("comment"),
        Attribute::text("tunnel_interface").required(),
        Attribute::bool("anti_replay"),
        Attribute::bool("disabled"),
        Attribute::new("auto_key", auto_key()),
        Attribute::new("manual_key", manual_key()),
        Attribute::new(
            "global_protect_satellite",
            Kind::object(vec![
                Attribute::new("portal_address", Kind::formatted(ValueFormat::Fqdn)),
                Attribute::new(
                    "local_address",
                    Kind::object(vec![Attribute::text("interface").required()]),
                ),
            ]),
        ),
    ])
    .one_of(&["auto_key", "manual_key", "global_protect_satellite"], false);
    ResourceSchema::entry("ipsec_tunnel", "network/tunnel/ipsec", NETWORK_SCOPES, body)
}
