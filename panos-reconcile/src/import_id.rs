//! Stable import identifiers.
//!
//! `v1:<type>:<scope arm>:<k=v,...>:<name,...>` with every segment
//! percent-escaped for `%`, `:`, `,` and `=`, so parsing splits on
//! delimiters without ambiguity.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::location::{canonicalize, DeviceDefaults, Scope, ScopeArm};
use crate::schema::{Registry, Shape};
use crate::value::{entry_name, type_label, AttrPath};

pub const VERSION: &str = "v1";

/// A parsed import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    pub type_name: String,
    pub scope: Scope,
    pub names: Vec<String>,
}

impl Display for ImportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let fields = self
            .scope
            .fields()
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join(",");
        let names = self
            .names
            .iter()
            .map(|n| escape(n))
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "{VERSION}:{}:{}:{fields}:{names}",
            escape(&self.type_name),
            self.scope.arm()
        )
    }
}

/// Build the import identifier of a declared object of `type_name`.
pub fn generate(
    registry: &Registry,
    type_name: &str,
    object: &Value,
    defaults: &DeviceDefaults,
) -> Result<String, ValidationErrors> {
    let schema = registry.get(type_name)?;
    let Some(fields) = object.as_object() else {
        return Err(ValidationError::TypeMismatch {
            path: AttrPath::root(),
            expected: "object",
            found: type_label(object),
        }
        .into());
    };

    let mut errors = ValidationErrors::new();
    let scope = match canonicalize(fields.get("location"), defaults) {
        Ok(scope) => Some(scope),
        Err(more) => {
            errors.extend(more);
            None
        }
    };

    let names = match &schema.shape {
        Shape::Entry => match fields.get("name") {
            Some(Value::String(name)) if !name.is_empty() => vec![name.clone()],
            Some(Value::String(_)) => {
                errors.push(ValidationError::EmptyName {
                    path: AttrPath::attr_root("name"),
                });
                Vec::new()
            }
            _ => {
                errors.push(ValidationError::RequiredAttributeMissing {
                    path: AttrPath::attr_root("name"),
                });
                Vec::new()
            }
        },
        Shape::Collection { list, .. } => match fields.get(*list).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(entry_name)
                .map(ToString::to_string)
                .collect(),
            None => {
                errors.push(ValidationError::RequiredAttributeMissing {
                    path: AttrPath::attr_root(list),
                });
                Vec::new()
            }
        },
        Shape::Singleton { .. } => Vec::new(),
    };

    match scope {
        Some(scope) if errors.is_empty() => Ok(ImportId {
            type_name: schema.type_name.to_string(),
            scope,
            names,
        }
        .to_string()),
        _ => Err(errors),
    }
}

/// Parse an identifier produced by [`generate`].
pub fn parse(
    registry: &Registry,
    raw: &str,
    defaults: &DeviceDefaults,
) -> Result<ImportId, ValidationErrors> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [version, type_name, arm, fields, names] = parts.as_slice() else {
        return Err(malformed(format!(
            "expected 5 ':'-separated segments, found {}",
            parts.len()
        )));
    };
    if *version != VERSION {
        return Err(malformed(format!("unsupported version '{version}'")));
    }

    let type_name = unescape(type_name)?;
    let schema = registry.get(&type_name)?;
    let arm = ScopeArm::parse(arm).ok_or_else(|| malformed(format!("unknown scope '{arm}'")))?;

    let mut raw_fields = BTreeMap::new();
    for pair in split_segment(fields) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| malformed(format!("scope field '{pair}' is not key=value")))?;
        raw_fields.insert(unescape(key)?, unescape(value)?);
    }
    let scope = Scope::from_fields(arm, &raw_fields, defaults)?;
    if !schema.allows(arm) {
        return Err(ValidationError::LocationUnsupported {
            path: AttrPath::attr_root("location"),
            resource: schema.type_name.to_string(),
            arm: arm.to_string(),
        }
        .into());
    }

    let names = split_segment(names)
        .map(unescape)
        .collect::<Result<Vec<_>, _>>()?;
    let expected = match schema.shape {
        Shape::Entry => Some(1),
        Shape::Singleton { .. } => Some(0),
        Shape::Collection { .. } => None,
    };
    if let Some(expected) = expected {
        if names.len() != expected {
            return Err(malformed(format!(
                "'{}' takes {expected} name(s), found {}",
                schema.type_name,
                names.len()
            )));
        }
    }
    if names.iter().any(String::is_empty) {
        return Err(malformed("empty name".to_string()));
    }

    Ok(ImportId {
        type_name,
        scope,
        names,
    })
}

fn split_segment(segment: &str) -> impl Iterator<Item = &str> {
    segment.split(',').filter(move |_| !segment.is_empty())
}

fn malformed(reason: String) -> ValidationErrors {
    ValidationError::MalformedImportId { reason }.into()
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            ',' => out.push_str("%2C"),
            '=' => out.push_str("%3D"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, ValidationErrors> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        let decoded = match code.to_ascii_uppercase().as_str() {
            "25" => '%',
            "3A" => ':',
            "2C" => ',',
            "3D" => '=',
            _ => return Err(malformed(format!("bad escape '%{code}' in '{raw}'"))),
        };
        out.push(decoded);
    }
    Ok(out)
}
