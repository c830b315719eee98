//! Co-tenants of the device `system` document.

use serde_json::json;

use crate::schema::{Attribute, Kind, ObjectSchema, ResourceSchema, ValueFormat};

use super::NETWORK_SCOPES;

const SYSTEM: &str = "deviceconfig/system";

pub fn dns_settings() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::new("primary", Kind::formatted(ValueFormat::Ip))
            .xml("dns-setting/servers/primary"),
        Attribute::new("secondary", Kind::formatted(ValueFormat::Ip))
            .xml("dns-setting/servers/secondary")
            .requires("primary"),
        Attribute::text("dns_proxy_object")
            .xml("dns-setting/dns-proxy-object")
            .conflicts("primary"),
        Attribute::new("fqdn_refresh_time", Kind::int(600, 14_399))
            .default_value(json!(1800)),
    ]);
    ResourceSchema::singleton(
        "dns_settings",
        SYSTEM,
        &["dns-setting", "fqdn-refresh-time"],
        NETWORK_SCOPES,
        body,
    )
}

fn ntp_server() -> Kind {
    Kind::object(vec![
        Attribute::text("ntp_server_address").required(),
        Attribute::new(
            "authentication_type",
            Kind::variant(vec![
                Attribute::marker("none"),
                Attribute::new(
                    "symmetric_key",
                    Kind::object(vec![
                        Attribute::new("key_id", Kind::int(1, 65_534)),
                        Attribute::new(
                            "algorithm",
                            Kind::variant(vec![
                                Attribute::new(
                                    "md5",
                                    Kind::object(vec![Attribute::text("authentication_key")]),
                                ),
                                Attribute::new(
                                    "sha1",
                                    Kind::object(vec![Attribute::text("authentication_key")]),
                                ),
                            ]),
                        ),
                    ]),
                ),
                Attribute::marker("autokey"),
            ]),
        ),
    ])
}

pub fn ntp_settings() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::new("primary_ntp_server", ntp_server())
            .xml("ntp-servers/primary-ntp-server"),
        Attribute::new("secondary_ntp_server", ntp_server())
            .xml("ntp-servers/secondary-ntp-server"),
    ]);
    ResourceSchema::singleton(
        "ntp_settings",
        SYSTEM,
        &["ntp-servers"],
        NETWORK_SCOPES,
        body,
    )
}

pub fn general_settings() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::text("hostname"),
        Attribute::new("domain", Kind::formatted(ValueFormat::Fqdn)),
        Attribute::text("login_banner"),
        Attribute::text("timezone"),
    ]);
    ResourceSchema::singleton(
        "general_settings",
        SYSTEM,
        &["hostname", "domain", "login-banner", "timezone"],
        NETWORK_SCOPES,
        body,
    )
}

fn export_protocol() -> Kind {
    let server = || {
        Kind::object(vec![
            Attribute::new("hostname", Kind::formatted(ValueFormat::Fqdn)).required(),
            Attribute::new("port", Kind::int(1, 65_535)),
            Attribute::text("path"),
            Attribute::text("username"),
            Attribute::text("password"),
        ])
    };
    Kind::variant(vec![
        Attribute::new("ftp", server()),
        Attribute::new("scp", server()),
    ])
}

pub fn log_settings() -> ResourceSchema {
    let body = ObjectSchema::new(vec![
        Attribute::new(
            "log_links",
            Kind::entries(vec![Attribute::text("url").required()]),
        )
        .xml("log-link"),
        Attribute::new(
            "export_schedules",
            Kind::entries(vec![
                Attribute::text("description"),
                Attribute::bool("enable"),
                Attribute::new(
                    "log_type",
                    Kind::Enum(&["traffic", "threat", "url", "data", "wildfire"]),
                ),
                Attribute::text("start_time"),
                Attribute::new("protocol", export_protocol()),
            ]),
        )
        .xml("log-export-schedule"),
    ]);
    ResourceSchema::singleton(
        "log_settings",
        SYSTEM,
        &["log-link", "log-export-schedule"],
        NETWORK_SCOPES,
        body,
    )
}
