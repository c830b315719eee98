//! Plan-time validation of a desired resource value.
//!
//! Every check runs and every failure is collected, each tagged with the
//! path of the offending field. No I/O happens here.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::codec::variant::check_cardinality;
use crate::error::{ValidationError, ValidationErrors};
use crate::location::{canonicalize, DeviceDefaults, Scope};
use crate::reconcile::ordering::Position;
use crate::schema::{
    CollectionKeying, Kind, ListOrder, ObjectSchema, Presence, ResourceSchema, Shape, ValueFormat,
};
use crate::value::{is_set, type_label, AttrPath};

static MAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}([:-])[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){4}$")
        .expect("valid mac regex")
});

static FQDN_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]([A-Za-z0-9_-]{0,61}[A-Za-z0-9_])?$").expect("valid fqdn regex")
});

/// A validated desired value: its canonical scope and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub scope: Scope,
    pub position: Position,
}

/// Who produced the value being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Declared by the user: computed attributes must be absent.
    User,
    /// Produced by planning: computed attributes carried from prior state
    /// are expected.
    Planned,
}

/// Validate `value` against `schema`, collecting every failure.
pub fn validate(
    schema: &ResourceSchema,
    value: &Value,
    defaults: &DeviceDefaults,
) -> Result<Validated, ValidationErrors> {
    validate_from(schema, value, defaults, Origin::User)
}

/// Validate a planned value. Identical to [`validate`] except that computed
/// attributes (rule uuids carried from prior state) are accepted.
pub fn validate_planned(
    schema: &ResourceSchema,
    value: &Value,
    defaults: &DeviceDefaults,
) -> Result<Validated, ValidationErrors> {
    validate_from(schema, value, defaults, Origin::Planned)
}

fn validate_from(
    schema: &ResourceSchema,
    value: &Value,
    defaults: &DeviceDefaults,
    origin: Origin,
) -> Result<Validated, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let Some(object) = value.as_object() else {
        errors.push(ValidationError::TypeMismatch {
            path: AttrPath::root(),
            expected: "object",
            found: type_label(value),
        });
        return Err(errors);
    };

    let scope = match canonicalize(object.get("location"), defaults) {
        Ok(scope) => {
            if !schema.allows(scope.arm()) {
                errors.push(ValidationError::LocationUnsupported {
                    path: AttrPath::attr_root("location"),
                    resource: schema.type_name.to_string(),
                    arm: scope.arm().to_string(),
                });
            }
            Some(scope)
        }
        Err(more) => {
            errors.extend(more);
            None
        }
    };

    let mut position = Position::Last;
    match &schema.shape {
        Shape::Entry => {
            check_name(object, &AttrPath::root(), &mut errors);
            check_object(&schema.body, object, &AttrPath::root(), &["name", "location"], origin, &mut errors);
        }
        Shape::Singleton { .. } => {
            check_object(&schema.body, object, &AttrPath::root(), &["location"], origin, &mut errors);
        }
        Shape::Collection { list, keying } => {
            let mut reserved = vec!["location", *list];
            if *keying != CollectionKeying::Set {
                reserved.push("position");
                match Position::parse(object.get("position"), &AttrPath::attr_root("position")) {
                    Ok(parsed) => position = parsed,
                    Err(more) => errors.extend(more),
                }
            }
            for key in object.keys() {
                if !reserved.iter().any(|r| *r == key.as_str()) {
                    errors.push(ValidationError::UnknownAttribute {
                        path: AttrPath::attr_root(key),
                    });
                }
            }
            let list_path = AttrPath::attr_root(list);
            match object.get(*list) {
                None | Some(Value::Null) => errors.push(ValidationError::RequiredAttributeMissing {
                    path: list_path,
                }),
                Some(Value::Array(items)) => {
                    check_entry_list(&schema.body, items, &list_path, origin, &mut errors)
                }
                Some(other) => errors.push(ValidationError::TypeMismatch {
                    path: list_path,
                    expected: "list of named objects",
                    found: type_label(other),
                }),
            }
        }
    }

    match scope {
        Some(scope) if errors.is_empty() => Ok(Validated { scope, position }),
        _ => Err(errors),
    }
}

fn check_name(object: &Map<String, Value>, path: &AttrPath, errors: &mut ValidationErrors) -> Option<String> {
    let name_path = path.attr("name");
    match object.get("name") {
        None | Some(Value::Null) => {
            errors.push(ValidationError::RequiredAttributeMissing { path: name_path });
            None
        }
        Some(Value::String(name)) if name.is_empty() => {
            errors.push(ValidationError::EmptyName { path: name_path });
            None
        }
        Some(Value::String(name)) => Some(name.clone()),
        Some(other) => {
            errors.push(ValidationError::TypeMismatch {
                path: name_path,
                expected: "string",
                found: type_label(other),
            });
            None
        }
    }
}

fn check_entry_list(
    schema: &ObjectSchema,
    items: &[Value],
    path: &AttrPath,
    origin: Origin,
    errors: &mut ValidationErrors,
) {
    let mut seen = HashSet::new();
    for (idx, item) in items.iter().enumerate() {
        let item_path = path.index(idx);
        let Some(object) = item.as_object() else {
            errors.push(ValidationError::TypeMismatch {
                path: item_path,
                expected: "object",
                found: type_label(item),
            });
            continue;
        };
        let Some(name) = check_name(object, &item_path, errors) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            errors.push(ValidationError::DuplicateEntryName {
                path: item_path,
                name: name.clone(),
            });
            continue;
        }
        check_object(schema, object, &path.key(&name), &["name"], origin, errors);
    }
}

fn check_object(
    schema: &ObjectSchema,
    object: &Map<String, Value>,
    path: &AttrPath,
    reserved: &[&str],
    origin: Origin,
    errors: &mut ValidationErrors,
) {
    for key in object.keys() {
        if !reserved.iter().any(|r| *r == key.as_str()) && schema.attribute(key).is_none() {
            errors.push(ValidationError::UnknownAttribute {
                path: path.attr(key),
            });
        }
    }

    for attr in &schema.attributes {
        let attr_path = path.attr(attr.name);
        let value = object.get(attr.name);
        if attr.is_computed() {
            if origin == Origin::User && is_set(value) {
                errors.push(ValidationError::ComputedAttribute { path: attr_path });
            }
            continue;
        }
        let Some(value) = value.filter(|v| !v.is_null()) else {
            if attr.presence == Presence::Required {
                errors.push(ValidationError::RequiredAttributeMissing { path: attr_path });
            }
            continue;
        };
        for other in &attr.required_with {
            if !is_set(object.get(*other)) {
                errors.push(ValidationError::RequiredWith {
                    path: attr_path.clone(),
                    requires: (*other).to_string(),
                });
            }
        }
        for other in &attr.conflicts_with {
            if is_set(object.get(*other)) {
                errors.push(ValidationError::ConflictsWith {
                    path: attr_path.clone(),
                    conflicts: (*other).to_string(),
                });
            }
        }
        check_value(&attr.kind, value, &attr_path, origin, errors);
    }

    for group in &schema.one_of {
        if let Err(err) = check_cardinality(object, &group.arms, group.optional, path) {
            errors.push(err);
        }
    }
}

fn check_value(kind: &Kind, value: &Value, path: &AttrPath, origin: Origin, errors: &mut ValidationErrors) {
    let mismatch = |errors: &mut ValidationErrors| {
        errors.push(ValidationError::TypeMismatch {
            path: path.clone(),
            expected: kind.expected(),
            found: type_label(value),
        })
    };
    match kind {
        Kind::Text(format) => match value.as_str() {
            Some(text) => check_format(*format, text, path, errors),
            None => mismatch(errors),
        },
        Kind::Enum(allowed) => match value.as_str() {
            Some(text) if allowed.iter().any(|a| *a == text) => {}
            Some(text) => errors.push(ValidationError::NotInEnum {
                path: path.clone(),
                value: text.to_string(),
                allowed: allowed.iter().map(ToString::to_string).collect(),
            }),
            None => mismatch(errors),
        },
        Kind::Int { min, max } => match value.as_i64() {
            Some(n) if n < *min || n > *max => errors.push(ValidationError::OutOfRange {
                path: path.clone(),
                value: n,
                min: *min,
                max: *max,
            }),
            Some(_) => {}
            None => mismatch(errors),
        },
        Kind::Bool => {
            if !value.is_boolean() {
                mismatch(errors);
            }
        }
        Kind::Members { order, format } => {
            let Some(items) = value.as_array() else {
                return mismatch(errors);
            };
            let mut seen = HashSet::new();
            for (idx, item) in items.iter().enumerate() {
                let item_path = path.index(idx);
                let Some(text) = item.as_str() else {
                    errors.push(ValidationError::TypeMismatch {
                        path: item_path,
                        expected: "string",
                        found: type_label(item),
                    });
                    continue;
                };
                check_format(*format, text, &item_path, errors);
                if *order == ListOrder::Set && !seen.insert(text) {
                    errors.push(ValidationError::DuplicateEntryName {
                        path: item_path,
                        name: text.to_string(),
                    });
                }
            }
        }
        Kind::Empty => match value.as_object() {
            Some(object) => {
                for key in object.keys() {
                    errors.push(ValidationError::UnknownAttribute {
                        path: path.attr(key),
                    });
                }
            }
            None => mismatch(errors),
        },
        Kind::Object(schema) => match value.as_object() {
            Some(object) => check_object(schema, object, path, &[], origin, errors),
            None => mismatch(errors),
        },
        Kind::Variant(schema) => {
            let Some(object) = value.as_object() else {
                return mismatch(errors);
            };
            for key in object.keys() {
                if schema.arm(key).is_none() {
                    errors.push(ValidationError::UnknownAttribute {
                        path: path.attr(key),
                    });
                }
            }
            if let Err(err) = check_cardinality(object, &schema.arm_names(), schema.optional, path) {
                errors.push(err);
            }
            for arm in &schema.arms {
                if let Some(arm_value) = object.get(arm.name).filter(|v| !v.is_null()) {
                    check_value(&arm.kind, arm_value, &path.attr(arm.name), origin, errors);
                }
            }
        }
        Kind::Entries { entry, .. } => match value.as_array() {
            Some(items) => check_entry_list(entry, items, path, origin, errors),
            None => mismatch(errors),
        },
    }
}

fn check_format(format: ValueFormat, text: &str, path: &AttrPath, errors: &mut ValidationErrors) {
    if !matches_format(format, text) {
        errors.push(ValidationError::PatternMismatch {
            path: path.clone(),
            format: format.label(),
            value: text.to_string(),
        });
    }
}

/// Value-domain check for textual formats.
pub fn matches_format(format: ValueFormat, text: &str) -> bool {
    match format {
        ValueFormat::Text => true,
        ValueFormat::Ipv4 => text.parse::<Ipv4Addr>().is_ok(),
        ValueFormat::Ip => text.parse::<IpAddr>().is_ok(),
        ValueFormat::IpNetmask => match text.split_once('/') {
            None => text.parse::<IpAddr>().is_ok(),
            Some((ip, prefix)) => match (ip.parse::<IpAddr>(), prefix.parse::<u8>()) {
                (Ok(IpAddr::V4(_)), Ok(len)) => len <= 32,
                (Ok(IpAddr::V6(_)), Ok(len)) => len <= 128,
                _ => false,
            },
        },
        ValueFormat::IpRange => match text.split_once('-') {
            Some((start, end)) => match (start.parse::<IpAddr>(), end.parse::<IpAddr>()) {
                (Ok(IpAddr::V4(a)), Ok(IpAddr::V4(b))) => a <= b,
                (Ok(IpAddr::V6(a)), Ok(IpAddr::V6(b))) => a <= b,
                _ => false,
            },
            None => false,
        },
        ValueFormat::IpWildcard => match text.split_once('/') {
            Some((ip, mask)) => ip.parse::<Ipv4Addr>().is_ok() && mask.parse::<Ipv4Addr>().is_ok(),
            None => false,
        },
        ValueFormat::Ipv6Prefix => match text.split_once('/') {
            Some((ip, len)) => {
                ip.parse::<Ipv6Addr>().is_ok() && len.parse::<u8>().is_ok_and(|l| l <= 128)
            }
            None => false,
        },
        ValueFormat::Mac => MAC_RE.is_match(text),
        ValueFormat::Port => is_port(text),
        ValueFormat::PortList => {
            !text.is_empty()
                && text.split(',').all(|part| match part.split_once('-') {
                    Some((lo, hi)) => {
                        is_port(lo) && is_port(hi) && lo.parse::<u16>().ok() <= hi.parse::<u16>().ok()
                    }
                    None => is_port(part),
                })
        }
        ValueFormat::Fqdn => {
            let trimmed = text.strip_suffix('.').unwrap_or(text);
            !trimmed.is_empty()
                && trimmed.len() <= 253
                && trimmed.split('.').all(|label| FQDN_LABEL_RE.is_match(label))
        }
    }
}

fn is_port(text: &str) -> bool {
    text.parse::<u16>().is_ok_and(|p| p >= 1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{matches_format, validate, validate_planned};
    use crate::location::DeviceDefaults;
    use crate::reconcile::ordering::Position;
    use crate::schema::{Registry, ValueFormat};

    fn check(type_name: &str, value: serde_json::Value) -> Result<super::Validated, crate::error::ValidationErrors> {
        let registry = Registry::builtin().expect("registry");
        let schema = registry.get(type_name).expect("known type");
        validate(schema, &value, &DeviceDefaults::default())
    }

    #[test]
    fn accepts_a_valid_address() {
        let validated = check(
            "address",
            json!({"name": "a1", "location": {"device_group": {"name": "dg1"}}, "ip_netmask": "10.0.0.1/32", "tags": ["web"]}),
        )
        .expect("valid");
        assert_eq!(validated.position, Position::Last);
    }

    #[test]
    fn collects_every_failure() {
        let err = check(
            "address",
            json!({
                "name": "",
                "location": {"system": {}},
                "ip_netmask": "10.0.0.300",
                "fqdn": "example.net",
                "colour": "blue",
                "tags": ["web", "web"]
            }),
        )
        .expect_err("invalid");
        for code in [
            "empty_name",
            "location_unsupported",
            "pattern_mismatch",
            "variant_cardinality",
            "unknown_attribute",
            "duplicate_entry_name",
        ] {
            assert!(err.has(code), "missing {code} in {err}");
        }
    }

    #[test]
    fn duplicate_rule_names_are_reported_with_paths() {
        let err = check(
            "security_policy",
            json!({
                "location": {"vsys": {"name": "vsys1"}},
                "rules": [{"name": "r1"}, {"name": "r1"}]
            }),
        )
        .expect_err("duplicate");
        assert!(err.has("duplicate_entry_name"));
        assert!(err.to_string().contains("rules[1]"));
    }

    #[test]
    fn nested_paths_name_the_rule() {
        let err = check(
            "nat_policy",
            json!({
                "location": {"vsys": {}},
                "rules": [{
                    "name": "r1",
                    "source_translation": {"dynamic_ip": {"translated_address": ["a"]}, "static_ip": {"translated_address": "10.0.0.1"}}
                }]
            }),
        )
        .expect_err("two arms");
        assert!(err.has("variant_cardinality"));
        assert!(err.to_string().contains("rules[r1].source_translation"));
    }

    #[test]
    fn computed_and_relational_constraints() {
        let err = check(
            "security_policy",
            json!({"location": {"vsys": {}}, "rules": [{"name": "r1", "uuid": "x"}]}),
        )
        .expect_err("computed");
        assert!(err.has("computed_attribute"));

        let err = check(
            "dns_settings",
            json!({"location": {"system": {}}, "secondary": "172.16.0.2", "dns_proxy_object": "p"}),
        )
        .expect_err("relations");
        assert!(err.has("required_with"));

        let err = check(
            "dns_settings",
            json!({"location": {"system": {}}, "primary": "172.16.0.1", "dns_proxy_object": "p", "fqdn_refresh_time": 10}),
        )
        .expect_err("conflict and range");
        assert!(err.has("conflicts_with"));
        assert!(err.has("out_of_range"));
    }

    #[test]
    fn planned_values_may_carry_computed_uuids() {
        let registry = Registry::builtin().expect("registry");
        let schema = registry.get("security_policy").expect("known type");
        let value = json!({"location": {"vsys": {}}, "rules": [{"name": "r1", "uuid": "u-1"}]});
        let defaults = DeviceDefaults::default();

        let err = validate(schema, &value, &defaults).expect_err("declared uuid");
        assert!(err.has("computed_attribute"));
        validate_planned(schema, &value, &defaults).expect("planned uuid");

        let broken = json!({"location": {"vsys": {}}, "rules": [{"name": "r1", "uuid": "u-1"}, {"name": "r1"}]});
        let err = validate_planned(schema, &broken, &defaults).expect_err("duplicate");
        assert!(err.has("duplicate_entry_name"));
    }

    #[test]
    fn ambiguous_location_fails_before_anything_else() {
        let err = check(
            "address",
            json!({"name": "a1", "location": {"shared": {}, "vsys": {"name": "vsys1"}}, "fqdn": "a.example"}),
        )
        .expect_err("ambiguous");
        assert!(err.has("location_ambiguous"));
    }

    #[test]
    fn set_collections_take_no_position() {
        let err = check(
            "addresses",
            json!({"location": {"shared": {}}, "position": {"where": "first"}, "addresses": []}),
        )
        .expect_err("position on set");
        assert!(err.has("unknown_attribute"));
    }

    #[test]
    fn value_formats() {
        assert!(matches_format(ValueFormat::IpNetmask, "10.0.0.0/8"));
        assert!(matches_format(ValueFormat::IpNetmask, "2001:db8::/32"));
        assert!(!matches_format(ValueFormat::IpNetmask, "10.0.0.0/33"));
        assert!(matches_format(ValueFormat::IpRange, "10.0.0.1-10.0.0.9"));
        assert!(!matches_format(ValueFormat::IpRange, "10.0.0.9-10.0.0.1"));
        assert!(matches_format(ValueFormat::IpWildcard, "10.0.0.0/0.0.255.255"));
        assert!(matches_format(ValueFormat::Ipv6Prefix, "2001:db8::/64"));
        assert!(!matches_format(ValueFormat::Ipv6Prefix, "10.0.0.0/8"));
        assert!(matches_format(ValueFormat::Mac, "00:1b:21:aa:bb:cc"));
        assert!(!matches_format(ValueFormat::Mac, "00:1b:21:aa:bb"));
        assert!(matches_format(ValueFormat::PortList, "80,443,8000-8080"));
        assert!(!matches_format(ValueFormat::PortList, "0"));
        assert!(!matches_format(ValueFormat::PortList, "90-80"));
        assert!(matches_format(ValueFormat::Fqdn, "updates.example.net"));
        assert!(!matches_format(ValueFormat::Fqdn, "bad..name"));
    }
}
