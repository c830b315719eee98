use serde_json::json;

use crate::schema::{
    Attribute, CollectionKeying, Kind, ObjectSchema, ResourceSchema, ValueFormat,
};

use super::POLICY_SCOPES;

fn uuid() -> Attribute {
    Attribute::text("uuid").computed().xml("@uuid")
}

fn any_set(name: &'static str) -> Attribute {
    Attribute::new(name, Kind::member_set()).default_value(json!(["any"]))
}

fn security_rule() -> ObjectSchema {
    ObjectSchema::new(vec![
        uuid(),
        Attribute::text("description"),
        Attribute::new("rule_type", Kind::Enum(&["universal", "intrazone", "interzone"])),
        any_set("from"),
        any_set("to"),
        any_set("source"),
        Attribute::bool("negate_source"),
        any_set("destination"),
        Attribute::bool("negate_destination"),
        Attribute::new("service", Kind::member_set())
            .default_value(json!(["application-default"])),
        any_set("application"),
        Attribute::new(
            "action",
            Kind::Enum(&[
                "allow",
                "deny",
                "drop",
                "reset-client",
                "reset-server",
                "reset-both",
            ]),
        )
        .default_value(json!("allow")),
        Attribute::new(
            "profile_setting",
            Kind::variant(vec![
                Attribute::new("group", Kind::members()),
                Attribute::new(
                    "profiles",
                    Kind::object(vec![
                        Attribute::new("virus", Kind::members()),
                        Attribute::new("spyware", Kind::members()),
                        Attribute::new("vulnerability", Kind::members()),
                        Attribute::new("url_filtering", Kind::members()),
                    ]),
                ),
            ]),
        ),
        Attribute::bool("log_start"),
        Attribute::bool("log_end"),
        Attribute::bool("disabled"),
        Attribute::new("tags", Kind::member_set()).xml("tag"),
    ])
}

pub fn security_policy() -> ResourceSchema {
    ResourceSchema::collection(
        "security_policy",
        "security/rules",
        "rules",
        CollectionKeying::Uuid,
        POLICY_SCOPES,
        security_rule(),
    )
    .in_rulebase()
}

fn source_translation() -> Kind {
    Kind::variant(vec![
        Attribute::new(
            "dynamic_ip_and_port",
            Kind::variant(vec![
                Attribute::new("translated_address", Kind::member_set()),
                Attribute::new(
                    "interface_address",
                    Kind::object(vec![
                        Attribute::text("interface").required(),
                        Attribute::new("ip", Kind::formatted(ValueFormat::IpNetmask))
                            .conflicts("floating_ip"),
                        Attribute::new("floating_ip", Kind::formatted(ValueFormat::Ip)),
                    ]),
                ),
            ]),
        ),
        Attribute::new(
            "dynamic_ip",
            Kind::object(vec![
                Attribute::new("translated_address", Kind::member_set()).required()
            ]),
        ),
        Attribute::new(
            "static_ip",
            Kind::object(vec![
                Attribute::new(
                    "translated_address",
                    Kind::formatted(ValueFormat::IpNetmask),
                )
                .required(),
                Attribute::bool("bi_directional"),
            ]),
        ),
    ])
}

fn nat_rule() -> ObjectSchema {
    ObjectSchema::new(vec![
        uuid(),
        Attribute::text("description"),
        Attribute::new("nat_type", Kind::Enum(&["ipv4", "nat64", "nptv6"]))
            .default_value(json!("ipv4")),
        any_set("from"),
        any_set("to"),
        Attribute::text("to_interface"),
        any_set("source"),
        any_set("destination"),
        Attribute::text("service").default_value(json!("any")),
        Attribute::new("source_translation", source_translation()),
        Attribute::new(
            "destination_translation",
            Kind::object(vec![
                Attribute::new(
                    "translated_address",
                    Kind::formatted(ValueFormat::IpNetmask),
                )
                .required(),
                Attribute::new("translated_port", Kind::formatted(ValueFormat::Port)),
            ]),
        ),
        Attribute::bool("disabled"),
        Attribute::new("tags", Kind::member_set()).xml("tag"),
    ])
}

pub fn nat_policy() -> ResourceSchema {
    ResourceSchema::collection(
        "nat_policy",
        "nat/rules",
        "rules",
        CollectionKeying::Uuid,
        POLICY_SCOPES,
        nat_rule(),
    )
    .in_rulebase()
}

fn application_override_rule() -> ObjectSchema {
    ObjectSchema::new(vec![
        Attribute::text("description"),
        any_set("from"),
        any_set("to"),
        any_set("source"),
        any_set("destination"),
        Attribute::new("protocol", Kind::Enum(&["tcp", "udp"])).required(),
        Attribute::new("port", Kind::formatted(ValueFormat::PortList)).required(),
        Attribute::text("application").required(),
        Attribute::bool("disabled"),
    ])
}

pub fn application_override_policy() -> ResourceSchema {
    ResourceSchema::collection(
        "application_override_policy",
        "application-override/rules",
        "rules",
        CollectionKeying::Ordered,
        POLICY_SCOPES,
        application_override_rule(),
    )
    .in_rulebase()
}
