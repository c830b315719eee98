//! Conversion between declarative values and wire XML, driven by the schema.
//!
//! Encoding trusts plan validation but still refuses values whose JSON type
//! does not fit the attribute kind. Decoding is strict: unknown elements,
//! several variant arms or malformed scalars are reported as
//! [`DecodeError`]s rather than silently dropped.

pub mod variant;

use serde_json::{Map, Number, Value};
use xml_config_core::{XmlNode, ENTRY_TAG, MEMBER_TAG};

use crate::error::{DecodeError, Result, ValidationError};
use crate::schema::{Attribute, Kind, ObjectSchema};
use crate::value::{field, str_field, type_label, AttrPath};

use variant::{check_cardinality, select_present, selected_arms};

/// Encode `body` as `<entry name="...">`.
pub fn encode_entry(
    schema: &ObjectSchema,
    name: &str,
    body: &Map<String, Value>,
    path: &AttrPath,
) -> Result<XmlNode> {
    let mut node = XmlNode::entry(name);
    encode_object_into(schema, body, &mut node, path)?;
    Ok(node)
}

/// Encode the schema attributes of `object` as children of `node`.
///
/// Keys outside the schema (`name`, `location`, ...) are ignored; computed
/// attributes are never sent.
pub fn encode_object_into(
    schema: &ObjectSchema,
    object: &Map<String, Value>,
    node: &mut XmlNode,
    path: &AttrPath,
) -> Result<()> {
    for group in &schema.one_of {
        check_cardinality(object, &group.arms, group.optional, path)?;
    }
    for attr in &schema.attributes {
        if attr.is_computed() {
            continue;
        }
        let Some(value) = field(object, attr.name) else {
            continue;
        };
        let attr_path = path.attr(attr.name);
        if let Some(xml_attr) = attr.xml_attribute() {
            let text = value.as_str().ok_or_else(|| mismatch(&attr.kind, value, &attr_path))?;
            node.attributes.insert(xml_attr.to_string(), text.to_string());
            continue;
        }
        let segments = attr.xml_path();
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };
        let child = encode_value(&attr.kind, leaf, value, &attr_path)?;
        let mut parent = &mut *node;
        for segment in parents {
            parent = parent.ensure_child_mut(segment);
        }
        parent.children.push(child);
    }
    Ok(())
}

/// Encode one value as the element `tag`.
pub fn encode_value(kind: &Kind, tag: &str, value: &Value, path: &AttrPath) -> Result<XmlNode> {
    let bad = || mismatch(kind, value, path);
    let node = match kind {
        Kind::Text(_) | Kind::Enum(_) => XmlNode::with_text(tag, value.as_str().ok_or_else(bad)?),
        Kind::Int { .. } => XmlNode::with_text(tag, value.as_i64().ok_or_else(bad)?.to_string()),
        Kind::Bool => XmlNode::with_text(tag, if value.as_bool().ok_or_else(bad)? { "yes" } else { "no" }),
        Kind::Members { .. } => {
            let members = value
                .as_array()
                .ok_or_else(bad)?
                .iter()
                .map(Value::as_str)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(bad)?;
            XmlNode::member_list(tag, members)
        }
        Kind::Empty => match value.as_object() {
            Some(object) if object.is_empty() => XmlNode::new(tag),
            _ => return Err(bad()),
        },
        Kind::Object(schema) => {
            let mut node = XmlNode::new(tag);
            encode_object_into(schema, value.as_object().ok_or_else(bad)?, &mut node, path)?;
            node
        }
        Kind::Variant(schema) => {
            let object = value.as_object().ok_or_else(bad)?;
            let mut node = XmlNode::new(tag);
            let selected = check_cardinality(object, &schema.arm_names(), schema.optional, path)?;
            if let Some(arm) = selected.and_then(|name| schema.arm(name)) {
                if let Some(arm_value) = field(object, arm.name) {
                    node.children.push(encode_value(
                        &arm.kind,
                        arm.xml_head(),
                        arm_value,
                        &path.attr(arm.name),
                    )?);
                }
            }
            node
        }
        Kind::Entries { entry, .. } => {
            let mut node = XmlNode::new(tag);
            for (idx, item) in value.as_array().ok_or_else(bad)?.iter().enumerate() {
                let item_path = path.index(idx);
                let object = item
                    .as_object()
                    .ok_or_else(|| mismatch(kind, item, &item_path))?;
                let name = str_field(object, "name").ok_or_else(|| {
                    ValidationError::RequiredAttributeMissing {
                        path: item_path.attr("name"),
                    }
                })?;
                node.children
                    .push(encode_entry(entry, name, object, &path.key(name))?);
            }
            node
        }
    };
    Ok(node)
}

fn mismatch(kind: &Kind, value: &Value, path: &AttrPath) -> crate::error::Error {
    ValidationError::TypeMismatch {
        path: path.clone(),
        expected: kind.expected(),
        found: type_label(value),
    }
    .into()
}

/// Decode an `<entry>` element: its `name` plus the schema attributes.
pub fn decode_entry(
    schema: &ObjectSchema,
    node: &XmlNode,
    path: &AttrPath,
) -> Result<Map<String, Value>, DecodeError> {
    let name = node.name().ok_or_else(|| DecodeError::SchemaMismatch {
        path: path.clone(),
        reason: "entry without a name".to_string(),
    })?;
    let mut out = Map::new();
    out.insert("name".to_string(), Value::String(name.to_string()));
    out.extend(decode_object(schema, node, path)?);
    Ok(out)
}

/// Decode the schema attributes found under `node`.
pub fn decode_object(
    schema: &ObjectSchema,
    node: &XmlNode,
    path: &AttrPath,
) -> Result<Map<String, Value>, DecodeError> {
    let bindings: Vec<Vec<&str>> = schema
        .attributes
        .iter()
        .filter(|a| a.xml_attribute().is_none())
        .map(Attribute::xml_path)
        .collect();
    check_known(node, &bindings, path)?;

    let mut out = Map::new();
    for attr in &schema.attributes {
        let attr_path = path.attr(attr.name);
        if let Some(xml_attr) = attr.xml_attribute() {
            if let Some(text) = node.attribute(xml_attr) {
                out.insert(attr.name.to_string(), Value::String(text.to_string()));
            }
            continue;
        }
        if let Some(child) = lookup(node, &attr.xml_path(), &attr_path)? {
            out.insert(
                attr.name.to_string(),
                decode_value(&attr.kind, child, &attr_path)?,
            );
        }
    }

    for group in &schema.one_of {
        let set = selected_arms(&out, &group.arms);
        if set.len() > 1 {
            return Err(DecodeError::VariantServerAmbiguous {
                path: path.clone(),
                tags: set
                    .iter()
                    .filter_map(|arm| schema.attribute(arm))
                    .map(|a| a.xml_head().to_string())
                    .collect(),
            });
        }
    }
    Ok(out)
}

/// Decode one element according to `kind`.
pub fn decode_value(kind: &Kind, node: &XmlNode, path: &AttrPath) -> Result<Value, DecodeError> {
    let schema_mismatch = |reason: String| DecodeError::SchemaMismatch {
        path: path.clone(),
        reason,
    };
    let text = node.text.as_deref().unwrap_or("");
    let value = match kind {
        Kind::Text(_) | Kind::Enum(_) => {
            if !node.children.is_empty() {
                return Err(schema_mismatch(format!(
                    "expected text in <{}>, found nested elements",
                    node.tag
                )));
            }
            Value::String(text.to_string())
        }
        Kind::Int { .. } => {
            let parsed = text
                .trim()
                .parse::<i64>()
                .map_err(|_| schema_mismatch(format!("'{text}' is not an integer")))?;
            Value::Number(Number::from(parsed))
        }
        Kind::Bool => match text.trim() {
            "yes" => Value::Bool(true),
            "no" => Value::Bool(false),
            other => return Err(schema_mismatch(format!("'{other}' is not yes/no"))),
        },
        Kind::Members { .. } => {
            let mut members = Vec::with_capacity(node.children.len());
            for child in &node.children {
                if child.tag != MEMBER_TAG {
                    return Err(DecodeError::UnknownField {
                        path: path.clone(),
                        tag: child.tag.clone(),
                    });
                }
                members.push(Value::String(child.text.clone().unwrap_or_default()));
            }
            Value::Array(members)
        }
        Kind::Empty => {
            if let Some(child) = node.children.first() {
                return Err(DecodeError::UnknownField {
                    path: path.clone(),
                    tag: child.tag.clone(),
                });
            }
            Value::Object(Map::new())
        }
        Kind::Object(schema) => Value::Object(decode_object(schema, node, path)?),
        Kind::Variant(schema) => {
            let tags: Vec<&str> = schema.arms.iter().map(Attribute::xml_head).collect();
            if let Some(unknown) = node
                .children
                .iter()
                .find(|child| !tags.contains(&child.tag.as_str()))
            {
                return Err(DecodeError::UnknownField {
                    path: path.clone(),
                    tag: unknown.tag.clone(),
                });
            }
            let mut out = Map::new();
            if let Some(idx) = select_present(node, &tags, path)? {
                let arm = &schema.arms[idx];
                if let Some(child) = node.get_child(tags[idx]) {
                    out.insert(
                        arm.name.to_string(),
                        decode_value(&arm.kind, child, &path.attr(arm.name))?,
                    );
                }
            }
            Value::Object(out)
        }
        Kind::Entries { entry, .. } => {
            let mut entries = Vec::with_capacity(node.children.len());
            for child in &node.children {
                if child.tag != ENTRY_TAG {
                    return Err(DecodeError::UnknownField {
                        path: path.clone(),
                        tag: child.tag.clone(),
                    });
                }
                let key = child.name().unwrap_or_default();
                entries.push(Value::Object(decode_entry(entry, child, &path.key(key))?));
            }
            Value::Array(entries)
        }
    };
    Ok(value)
}

/// Every child must be the head of some attribute binding.
fn check_known(node: &XmlNode, bindings: &[Vec<&str>], path: &AttrPath) -> Result<(), DecodeError> {
    for child in &node.children {
        let tails: Vec<Vec<&str>> = bindings
            .iter()
            .filter(|b| b.first() == Some(&child.tag.as_str()))
            .map(|b| b[1..].to_vec())
            .collect();
        if tails.is_empty() {
            return Err(DecodeError::UnknownField {
                path: path.clone(),
                tag: child.tag.clone(),
            });
        }
        if tails.iter().any(Vec::is_empty) {
            continue;
        }
        check_known(child, &tails, path)?;
    }
    Ok(())
}

/// Walk a binding path; repeated elements along the way are a mismatch.
fn lookup<'a>(
    node: &'a XmlNode,
    segments: &[&str],
    path: &AttrPath,
) -> Result<Option<&'a XmlNode>, DecodeError> {
    let mut current = node;
    for segment in segments {
        let found = current.get_children(segment);
        match found.as_slice() {
            [] => return Ok(None),
            [single] => current = single,
            _ => {
                return Err(DecodeError::SchemaMismatch {
                    path: path.clone(),
                    reason: format!("element <{segment}> appears {} times", found.len()),
                })
            }
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use xml_config_core::{parse, write_compact};

    use super::{decode_entry, encode_entry};
    use crate::error::DecodeError;
    use crate::schema::{Attribute, Kind, ObjectSchema, Registry};
    use crate::value::AttrPath;

    fn interface_schema() -> ObjectSchema {
        ObjectSchema::new(vec![
            Attribute::text("comment"),
            Attribute::marker("layer2"),
            Attribute::new(
                "layer3",
                Kind::object(vec![
                    Attribute::new("mtu", Kind::int(576, 9216)),
                    Attribute::new(
                        "ips",
                        Kind::entries(vec![]),
                    )
                    .xml("ip"),
                    Attribute::bool("dhcp_client_enabled").xml("dhcp-client/enable"),
                ]),
            ),
            Attribute::new(
                "link",
                Kind::variant(vec![
                    Attribute::marker("auto"),
                    Attribute::new("fixed", Kind::int(10, 100_000)),
                ]),
            ),
            Attribute::text("uuid").computed().xml("@uuid"),
        ])
        .one_of(&["layer2", "layer3"], true)
    }

    fn entry(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn encodes_nested_objects_and_variants() {
        let value = entry(json!({
            "name": "ethernet1/1",
            "location": {"system": {}},
            "layer3": {"mtu": 1500, "ips": [{"name": "10.1.1.1/24"}], "dhcp_client_enabled": false},
            "link": {"auto": {}, "fixed": null},
            "uuid": "ignored"
        }));
        let node = encode_entry(&interface_schema(), "ethernet1/1", &value, &AttrPath::root())
            .expect("encode");
        assert_eq!(
            write_compact(&node).expect("write"),
            r#"<entry name="ethernet1/1"><layer3><mtu>1500</mtu><ip><entry name="10.1.1.1/24"/></ip><dhcp-client><enable>no</enable></dhcp-client></layer3><link><auto/></link></entry>"#
        );
    }

    #[test]
    fn empty_object_arm_round_trips() {
        let value = entry(json!({"name": "ethernet1/2", "layer2": {}}));
        let node = encode_entry(&interface_schema(), "ethernet1/2", &value, &AttrPath::root())
            .expect("encode");
        let decoded = decode_entry(&interface_schema(), &node, &AttrPath::root()).expect("decode");
        assert_eq!(decoded, value);
    }

    #[test]
    fn decodes_uuid_attribute() {
        let node = parse(br#"<entry name="e" uuid="u-1"><comment>x</comment></entry>"#).expect("parse");
        let decoded = decode_entry(&interface_schema(), &node, &AttrPath::root()).expect("decode");
        assert_eq!(decoded, entry(json!({"name": "e", "comment": "x", "uuid": "u-1"})));
    }

    #[test]
    fn two_arms_on_the_wire_are_ambiguous() {
        let node = parse(br#"<entry name="e"><layer2/><layer3/></entry>"#).expect("parse");
        let err = decode_entry(&interface_schema(), &node, &AttrPath::root()).expect_err("ambiguous");
        assert!(err.to_string().contains("several variant arms"));
    }

    #[test]
    fn unknown_and_malformed_fields_are_reported() {
        let node = parse(br#"<entry name="e"><colour>blue</colour></entry>"#).expect("parse");
        let err = decode_entry(&interface_schema(), &node, &AttrPath::root()).expect_err("unknown");
        assert!(err.to_string().contains("unknown field <colour>"));

        let node = parse(br#"<entry name="e"><layer3><mtu>big</mtu></layer3></entry>"#).expect("parse");
        let err = decode_entry(&interface_schema(), &node, &AttrPath::root()).expect_err("mtu");
        assert!(err.to_string().contains("layer3.mtu"));

        let node = parse(br#"<entry name="e"><layer3><dhcp-client><other/></dhcp-client></layer3></entry>"#)
            .expect("parse");
        assert!(decode_entry(&interface_schema(), &node, &AttrPath::root()).is_err());
    }

    #[test]
    fn encode_rejects_two_inline_arms() {
        let value = entry(json!({"name": "e", "layer2": {}, "layer3": {}}));
        let err = encode_entry(&interface_schema(), "e", &value, &AttrPath::root())
            .expect_err("cardinality");
        assert!(err.has_validation("variant_cardinality"));
    }

    fn nat_rule() -> ObjectSchema {
        let registry = Registry::builtin().expect("registry");
        registry.get("nat_policy").expect("nat_policy").body.clone()
    }

    fn rule_path() -> AttrPath {
        AttrPath::attr_root("rules").key("r1")
    }

    #[test]
    fn nested_source_translation_arms_round_trip() {
        let schema = nat_rule();
        let members = entry(json!({
            "name": "r1",
            "source_translation": {"dynamic_ip_and_port": {"translated_address": ["10.0.0.1", "10.0.0.2"]}}
        }));
        let node = encode_entry(&schema, "r1", &members, &rule_path()).expect("encode");
        assert_eq!(
            write_compact(&node).expect("write"),
            r#"<entry name="r1"><source-translation><dynamic-ip-and-port><translated-address><member>10.0.0.1</member><member>10.0.0.2</member></translated-address></dynamic-ip-and-port></source-translation></entry>"#
        );
        assert_eq!(decode_entry(&schema, &node, &rule_path()).expect("decode"), members);

        let interface = entry(json!({
            "name": "r1",
            "source_translation": {"dynamic_ip_and_port": {"interface_address": {"interface": "ethernet1/1", "ip": "10.0.0.1/24"}}}
        }));
        let node = encode_entry(&schema, "r1", &interface, &rule_path()).expect("encode");
        assert_eq!(decode_entry(&schema, &node, &rule_path()).expect("decode"), interface);
    }

    #[test]
    fn nested_empty_arm_differs_from_null() {
        let schema = nat_rule();
        let empty = entry(json!({
            "name": "r1",
            "source_translation": {"dynamic_ip_and_port": {"interface_address": {}}}
        }));
        let node = encode_entry(&schema, "r1", &empty, &rule_path()).expect("encode");
        assert_eq!(
            write_compact(&node).expect("write"),
            r#"<entry name="r1"><source-translation><dynamic-ip-and-port><interface-address/></dynamic-ip-and-port></source-translation></entry>"#
        );
        assert_eq!(decode_entry(&schema, &node, &rule_path()).expect("decode"), empty);

        let unselected = entry(json!({
            "name": "r1",
            "source_translation": {"dynamic_ip_and_port": {"interface_address": null}}
        }));
        let node = encode_entry(&schema, "r1", &unselected, &rule_path()).expect("encode");
        let decoded = decode_entry(&schema, &node, &rule_path()).expect("decode");
        assert_eq!(decoded["source_translation"], json!({"dynamic_ip_and_port": {}}));
    }

    #[test]
    fn two_nested_arms_on_the_wire_name_the_inner_variant() {
        let node = parse(
            br#"<entry name="r1"><source-translation><dynamic-ip-and-port>
                <translated-address><member>10.0.0.1</member></translated-address>
                <interface-address><interface>ethernet1/1</interface></interface-address>
            </dynamic-ip-and-port></source-translation></entry>"#,
        )
        .expect("parse");
        let err = decode_entry(&nat_rule(), &node, &rule_path()).expect_err("ambiguous");
        match err {
            DecodeError::VariantServerAmbiguous { path, tags } => {
                assert_eq!(path.to_string(), "rules[r1].source_translation.dynamic_ip_and_port");
                assert_eq!(tags, vec!["translated-address", "interface-address"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
