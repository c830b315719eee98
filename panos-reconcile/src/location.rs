//! Location resolution: polymorphic `location` objects to canonical scopes.
//!
//! A declared location is an object with exactly one non-null arm, e.g.
//! `{"device_group": {"name": "dg1"}}`. [`canonicalize`] fills device
//! defaults so that two spellings of the same place compare equal, and the
//! resulting [`Scope`] renders the root xpath and the RPC addressing
//! parameters. Nothing here performs I/O.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Deserialize;
use serde_json::{Map, Value};
use xml_config_core::XPath;

use crate::codec::variant::selected_arms;
use crate::error::{ValidationError, ValidationErrors};
use crate::value::{type_label, AttrPath};

pub const DEFAULT_DEVICE: &str = "localhost.localdomain";
pub const DEFAULT_VSYS: &str = "vsys1";

/// Device ids used when a location omits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceDefaults {
    #[serde(default)]
    pub panorama_device: Option<String>,
    #[serde(default)]
    pub ngfw_device: Option<String>,
}

impl DeviceDefaults {
    fn panorama(&self) -> &str {
        self.panorama_device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    fn ngfw(&self) -> &str {
        self.ngfw_device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }
}

/// Discriminator of a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeArm {
    System,
    Shared,
    Panorama,
    Vsys,
    Template,
    TemplateVsys,
    TemplateStack,
    TemplateStackVsys,
    DeviceGroup,
}

impl ScopeArm {
    pub const ALL: [ScopeArm; 9] = [
        ScopeArm::System,
        ScopeArm::Shared,
        ScopeArm::Panorama,
        ScopeArm::Vsys,
        ScopeArm::Template,
        ScopeArm::TemplateVsys,
        ScopeArm::TemplateStack,
        ScopeArm::TemplateStackVsys,
        ScopeArm::DeviceGroup,
    ];

    pub const NAMES: [&'static str; 9] = [
        "system",
        "shared",
        "panorama",
        "vsys",
        "template",
        "template_vsys",
        "template_stack",
        "template_stack_vsys",
        "device_group",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeArm::System => "system",
            ScopeArm::Shared => "shared",
            ScopeArm::Panorama => "panorama",
            ScopeArm::Vsys => "vsys",
            ScopeArm::Template => "template",
            ScopeArm::TemplateVsys => "template_vsys",
            ScopeArm::TemplateStack => "template_stack",
            ScopeArm::TemplateStackVsys => "template_stack_vsys",
            ScopeArm::DeviceGroup => "device_group",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|arm| arm.as_str() == raw)
    }

    fn fields(self) -> &'static [FieldSpec] {
        match self {
            ScopeArm::System => &[FieldSpec("ngfw_device", Fill::Ngfw)],
            ScopeArm::Shared => &[],
            ScopeArm::Panorama => &[FieldSpec("panorama_device", Fill::Panorama)],
            ScopeArm::Vsys => &[FieldSpec("name", Fill::Vsys), FieldSpec("ngfw_device", Fill::Ngfw)],
            ScopeArm::Template | ScopeArm::TemplateStack => &[
                FieldSpec("name", Fill::Required),
                FieldSpec("vsys", Fill::Optional),
                FieldSpec("ngfw_device", Fill::Ngfw),
                FieldSpec("panorama_device", Fill::Panorama),
            ],
            ScopeArm::TemplateVsys => &[
                FieldSpec("template", Fill::Required),
                FieldSpec("vsys", Fill::Vsys),
                FieldSpec("ngfw_device", Fill::Ngfw),
                FieldSpec("panorama_device", Fill::Panorama),
            ],
            ScopeArm::TemplateStackVsys => &[
                FieldSpec("template_stack", Fill::Required),
                FieldSpec("vsys", Fill::Vsys),
                FieldSpec("ngfw_device", Fill::Ngfw),
                FieldSpec("panorama_device", Fill::Panorama),
            ],
            ScopeArm::DeviceGroup => &[
                FieldSpec("name", Fill::Required),
                FieldSpec("rulebase", Fill::Rulebase),
                FieldSpec("panorama_device", Fill::Panorama),
            ],
        }
    }
}

impl Display for ScopeArm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct FieldSpec(&'static str, Fill);

#[derive(Clone, Copy)]
enum Fill {
    Required,
    Optional,
    Ngfw,
    Panorama,
    Vsys,
    Rulebase,
}

/// Device-group rulebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rulebase {
    Pre,
    Post,
}

impl Rulebase {
    pub fn as_str(self) -> &'static str {
        match self {
            Rulebase::Pre => "pre-rulebase",
            Rulebase::Post => "post-rulebase",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pre-rulebase" => Some(Rulebase::Pre),
            "post-rulebase" => Some(Rulebase::Post),
            _ => None,
        }
    }

    fn param(self) -> &'static str {
        match self {
            Rulebase::Pre => "pre",
            Rulebase::Post => "post",
        }
    }
}

/// A canonical location: every defaultable field is filled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    System {
        ngfw_device: String,
    },
    Shared,
    Panorama {
        panorama_device: String,
    },
    Vsys {
        name: String,
        ngfw_device: String,
    },
    Template {
        name: String,
        vsys: Option<String>,
        ngfw_device: String,
        panorama_device: String,
    },
    TemplateVsys {
        template: String,
        vsys: String,
        ngfw_device: String,
        panorama_device: String,
    },
    TemplateStack {
        name: String,
        vsys: Option<String>,
        ngfw_device: String,
        panorama_device: String,
    },
    TemplateStackVsys {
        template_stack: String,
        vsys: String,
        ngfw_device: String,
        panorama_device: String,
    },
    DeviceGroup {
        name: String,
        rulebase: Rulebase,
        panorama_device: String,
    },
}

impl Scope {
    pub fn arm(&self) -> ScopeArm {
        match self {
            Scope::System { .. } => ScopeArm::System,
            Scope::Shared => ScopeArm::Shared,
            Scope::Panorama { .. } => ScopeArm::Panorama,
            Scope::Vsys { .. } => ScopeArm::Vsys,
            Scope::Template { .. } => ScopeArm::Template,
            Scope::TemplateVsys { .. } => ScopeArm::TemplateVsys,
            Scope::TemplateStack { .. } => ScopeArm::TemplateStack,
            Scope::TemplateStackVsys { .. } => ScopeArm::TemplateStackVsys,
            Scope::DeviceGroup { .. } => ScopeArm::DeviceGroup,
        }
    }

    /// Named fields in declaration order; unset optional fields are skipped.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        for FieldSpec(name, _) in self.arm().fields() {
            if let Some(value) = self.field(name) {
                out.push((*name, value.to_string()));
            }
        }
        out
    }

    fn field(&self, key: &str) -> Option<&str> {
        let value = match (self, key) {
            (Scope::System { ngfw_device }, "ngfw_device") => ngfw_device,
            (Scope::Panorama { panorama_device }, "panorama_device") => panorama_device,
            (Scope::Vsys { name, .. }, "name") => name,
            (Scope::Vsys { ngfw_device, .. }, "ngfw_device") => ngfw_device,
            (
                Scope::Template { name, .. } | Scope::TemplateStack { name, .. },
                "name",
            ) => name,
            (
                Scope::Template { vsys, .. } | Scope::TemplateStack { vsys, .. },
                "vsys",
            ) => return vsys.as_deref(),
            (Scope::TemplateVsys { template, .. }, "template") => template,
            (
                Scope::TemplateStackVsys { template_stack, .. },
                "template_stack",
            ) => template_stack,
            (
                Scope::TemplateVsys { vsys, .. } | Scope::TemplateStackVsys { vsys, .. },
                "vsys",
            ) => vsys,
            (
                Scope::Template { ngfw_device, .. }
                | Scope::TemplateVsys { ngfw_device, .. }
                | Scope::TemplateStack { ngfw_device, .. }
                | Scope::TemplateStackVsys { ngfw_device, .. },
                "ngfw_device",
            ) => ngfw_device,
            (
                Scope::Template {
                    panorama_device, ..
                }
                | Scope::TemplateVsys {
                    panorama_device, ..
                }
                | Scope::TemplateStack {
                    panorama_device, ..
                }
                | Scope::TemplateStackVsys {
                    panorama_device, ..
                }
                | Scope::DeviceGroup {
                    panorama_device, ..
                },
                "panorama_device",
            ) => panorama_device,
            (Scope::DeviceGroup { name, .. }, "name") => name,
            (Scope::DeviceGroup { rulebase, .. }, "rulebase") => return Some(rulebase.as_str()),
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Build a scope from raw field values, filling defaults.
    pub fn from_fields(
        arm: ScopeArm,
        raw: &BTreeMap<String, String>,
        defaults: &DeviceDefaults,
    ) -> Result<Scope, ValidationErrors> {
        resolve(arm, raw, defaults, &AttrPath::attr_root("location"))
    }

    /// Root element of the scope in the configuration tree.
    pub fn xpath(&self) -> XPath {
        let devices = |device: &str| XPath::root("config").tag("devices").entry(device);
        let template = |kind: &str, name: &str, pano: &str, ngfw: &str| {
            devices(pano)
                .tag(kind)
                .entry(name)
                .tag("config")
                .tag("devices")
                .entry(ngfw)
        };
        match self {
            Scope::System { ngfw_device } => devices(ngfw_device),
            Scope::Shared => XPath::root("config").tag("shared"),
            Scope::Panorama { .. } => XPath::root("config").tag("panorama"),
            Scope::Vsys { name, ngfw_device } => devices(ngfw_device).tag("vsys").entry(name),
            Scope::Template {
                name,
                vsys,
                ngfw_device,
                panorama_device,
            } => {
                let root = template("template", name, panorama_device, ngfw_device);
                match vsys {
                    Some(vsys) => root.tag("vsys").entry(vsys),
                    None => root,
                }
            }
            Scope::TemplateStack {
                name,
                vsys,
                ngfw_device,
                panorama_device,
            } => {
                let root = template("template-stack", name, panorama_device, ngfw_device);
                match vsys {
                    Some(vsys) => root.tag("vsys").entry(vsys),
                    None => root,
                }
            }
            Scope::TemplateVsys {
                template: name,
                vsys,
                ngfw_device,
                panorama_device,
            } => template("template", name, panorama_device, ngfw_device)
                .tag("vsys")
                .entry(vsys),
            Scope::TemplateStackVsys {
                template_stack,
                vsys,
                ngfw_device,
                panorama_device,
            } => template("template-stack", template_stack, panorama_device, ngfw_device)
                .tag("vsys")
                .entry(vsys),
            Scope::DeviceGroup {
                name,
                panorama_device,
                ..
            } => devices(panorama_device).tag("device-group").entry(name),
        }
    }

    /// Element holding rule containers under the scope root.
    pub fn rulebase_tag(&self) -> &'static str {
        match self {
            Scope::DeviceGroup { rulebase, .. } => rulebase.as_str(),
            _ => "rulebase",
        }
    }

    /// Parameters a remote API call carries for this scope.
    pub fn addressing_params(&self, rule_kind: bool) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        match self {
            Scope::System { .. } | Scope::Panorama { .. } => {}
            Scope::Shared => {
                params.insert("vsys", "shared".to_string());
            }
            Scope::Vsys { name, .. } => {
                params.insert("vsys", name.clone());
            }
            Scope::Template { name, .. } => {
                params.insert("template", name.clone());
                self.device_params(&mut params);
            }
            Scope::TemplateVsys { template, .. } => {
                params.insert("template", template.clone());
                self.device_params(&mut params);
            }
            Scope::TemplateStack { name, .. } => {
                params.insert("template_stack", name.clone());
                self.device_params(&mut params);
            }
            Scope::TemplateStackVsys { template_stack, .. } => {
                params.insert("template_stack", template_stack.clone());
                self.device_params(&mut params);
            }
            Scope::DeviceGroup { name, rulebase, .. } => {
                params.insert("device_group", name.clone());
                if rule_kind {
                    params.insert("rulebase", rulebase.param().to_string());
                }
            }
        }
        params
    }

    fn device_params(&self, params: &mut BTreeMap<&'static str, String>) {
        for key in ["ngfw_device", "panorama_device", "vsys"] {
            if let Some(value) = self.field(key) {
                params.insert(key, value.to_string());
            }
        }
    }

    /// Declarative form, `{"<arm>": {...fields}}`.
    pub fn to_value(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v)))
            .collect();
        let mut out = Map::new();
        out.insert(self.arm().as_str().to_string(), Value::Object(fields));
        Value::Object(out)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let fields = self
            .fields()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}{{{fields}}}", self.arm())
    }
}

/// Resolve a declared `location` into its canonical scope.
pub fn canonicalize(
    location: Option<&Value>,
    defaults: &DeviceDefaults,
) -> Result<Scope, ValidationErrors> {
    let path = AttrPath::attr_root("location");
    let object = match location {
        None | Some(Value::Null) => {
            return Err(ValidationError::RequiredAttributeMissing { path }.into());
        }
        Some(Value::Object(object)) => object,
        Some(other) => {
            return Err(ValidationError::TypeMismatch {
                path,
                expected: "object",
                found: type_label(other),
            }
            .into());
        }
    };

    let mut errors = ValidationErrors::new();
    for key in object.keys() {
        if ScopeArm::parse(key).is_none() {
            errors.push(ValidationError::UnknownAttribute {
                path: path.attr(key),
            });
        }
    }

    let selected = selected_arms(object, &ScopeArm::NAMES);
    let [arm_name] = selected.as_slice() else {
        errors.push(ValidationError::LocationAmbiguous {
            path,
            arms: selected.iter().map(ToString::to_string).collect(),
        });
        return Err(errors);
    };
    let Some(arm) = ScopeArm::parse(arm_name) else {
        return Err(errors);
    };

    let arm_path = path.attr(arm_name);
    let raw = match object.get(*arm_name) {
        Some(Value::Object(inner)) => {
            let mut raw = BTreeMap::new();
            for (key, value) in inner {
                match value {
                    Value::Null => {}
                    Value::String(s) => {
                        raw.insert(key.clone(), s.clone());
                    }
                    other => errors.push(ValidationError::TypeMismatch {
                        path: arm_path.attr(key),
                        expected: "string",
                        found: type_label(other),
                    }),
                }
            }
            raw
        }
        Some(other) => {
            errors.push(ValidationError::TypeMismatch {
                path: arm_path,
                expected: "object",
                found: type_label(other),
            });
            return Err(errors);
        }
        None => BTreeMap::new(),
    };

    match resolve(arm, &raw, defaults, &path) {
        Ok(scope) if errors.is_empty() => Ok(scope),
        Ok(_) => Err(errors),
        Err(more) => {
            errors.extend(more);
            Err(errors)
        }
    }
}

/// Structural equality after canonicalization.
pub fn locations_equal(
    a: Option<&Value>,
    b: Option<&Value>,
    defaults: &DeviceDefaults,
) -> Result<bool, ValidationErrors> {
    Ok(canonicalize(a, defaults)? == canonicalize(b, defaults)?)
}

fn resolve(
    arm: ScopeArm,
    raw: &BTreeMap<String, String>,
    defaults: &DeviceDefaults,
    path: &AttrPath,
) -> Result<Scope, ValidationErrors> {
    let arm_path = path.attr(arm.as_str());
    let specs = arm.fields();
    let mut errors = ValidationErrors::new();

    for key in raw.keys() {
        if !specs.iter().any(|FieldSpec(name, _)| *name == key.as_str()) {
            errors.push(ValidationError::UnknownAttribute {
                path: arm_path.attr(key),
            });
        }
    }

    let mut resolved: BTreeMap<&'static str, String> = BTreeMap::new();
    for FieldSpec(name, fill) in specs {
        let value = match raw.get(*name) {
            Some(value) if value.is_empty() => {
                errors.push(ValidationError::EmptyName {
                    path: arm_path.attr(name),
                });
                continue;
            }
            Some(value) => value.clone(),
            None => match fill {
                Fill::Required => {
                    errors.push(ValidationError::RequiredAttributeMissing {
                        path: arm_path.attr(name),
                    });
                    continue;
                }
                Fill::Optional => continue,
                Fill::Ngfw => defaults.ngfw().to_string(),
                Fill::Panorama => defaults.panorama().to_string(),
                Fill::Vsys => DEFAULT_VSYS.to_string(),
                Fill::Rulebase => Rulebase::Pre.as_str().to_string(),
            },
        };
        resolved.insert(*name, value);
    }

    let rulebase = match resolved.get("rulebase").map(String::as_str) {
        None => Rulebase::Pre,
        Some(raw) => Rulebase::parse(raw).unwrap_or_else(|| {
            errors.push(ValidationError::NotInEnum {
                path: arm_path.attr("rulebase"),
                value: raw.to_string(),
                allowed: vec!["pre-rulebase".to_string(), "post-rulebase".to_string()],
            });
            Rulebase::Pre
        }),
    };
    errors.into_result()?;

    let mut take = |name: &str| resolved.remove(name).unwrap_or_default();
    let scope = match arm {
        ScopeArm::System => Scope::System {
            ngfw_device: take("ngfw_device"),
        },
        ScopeArm::Shared => Scope::Shared,
        ScopeArm::Panorama => Scope::Panorama {
            panorama_device: take("panorama_device"),
        },
        ScopeArm::Vsys => Scope::Vsys {
            name: take("name"),
            ngfw_device: take("ngfw_device"),
        },
        ScopeArm::Template => Scope::Template {
            name: take("name"),
            vsys: Some(take("vsys")).filter(|v| !v.is_empty()),
            ngfw_device: take("ngfw_device"),
            panorama_device: take("panorama_device"),
        },
        ScopeArm::TemplateVsys => Scope::TemplateVsys {
            template: take("template"),
            vsys: take("vsys"),
            ngfw_device: take("ngfw_device"),
            panorama_device: take("panorama_device"),
        },
        ScopeArm::TemplateStack => Scope::TemplateStack {
            name: take("name"),
            vsys: Some(take("vsys")).filter(|v| !v.is_empty()),
            ngfw_device: take("ngfw_device"),
            panorama_device: take("panorama_device"),
        },
        ScopeArm::TemplateStackVsys => Scope::TemplateStackVsys {
            template_stack: take("template_stack"),
            vsys: take("vsys"),
            ngfw_device: take("ngfw_device"),
            panorama_device: take("panorama_device"),
        },
        ScopeArm::DeviceGroup => Scope::DeviceGroup {
            name: take("name"),
            rulebase,
            panorama_device: take("panorama_device"),
        },
    };
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{canonicalize, locations_equal, DeviceDefaults, Rulebase, Scope, ScopeArm};

    fn defaults() -> DeviceDefaults {
        DeviceDefaults::default()
    }

    #[test]
    fn fills_device_defaults() {
        let scope = canonicalize(Some(&json!({"vsys": {}})), &defaults()).expect("vsys");
        assert_eq!(
            scope,
            Scope::Vsys {
                name: "vsys1".to_string(),
                ngfw_device: "localhost.localdomain".to_string(),
            }
        );

        let configured = DeviceDefaults {
            panorama_device: Some("pano-1".to_string()),
            ngfw_device: None,
        };
        let scope = canonicalize(Some(&json!({"device_group": {"name": "dg1"}})), &configured)
            .expect("device group");
        assert_eq!(
            scope,
            Scope::DeviceGroup {
                name: "dg1".to_string(),
                rulebase: Rulebase::Pre,
                panorama_device: "pano-1".to_string(),
            }
        );
    }

    #[test]
    fn two_arms_are_ambiguous() {
        let err = canonicalize(
            Some(&json!({"shared": {}, "vsys": {"name": "vsys1"}})),
            &defaults(),
        )
        .expect_err("ambiguous");
        assert!(err.has("location_ambiguous"));
    }

    #[test]
    fn null_arms_are_unselected() {
        let scope = canonicalize(Some(&json!({"shared": {}, "vsys": null})), &defaults())
            .expect("shared");
        assert_eq!(scope, Scope::Shared);

        let err = canonicalize(Some(&json!({"vsys": null})), &defaults()).expect_err("none");
        assert!(err.has("location_ambiguous"));
    }

    #[test]
    fn reports_empty_missing_and_unknown_fields() {
        let err = canonicalize(
            Some(&json!({"template": {"name": "", "colour": "blue"}})),
            &defaults(),
        )
        .expect_err("invalid");
        assert!(err.has("empty_name"));
        assert!(err.has("unknown_attribute"));

        let err = canonicalize(Some(&json!({"device_group": {}})), &defaults())
            .expect_err("missing name");
        assert!(err.has("required_attribute_missing"));

        let err = canonicalize(
            Some(&json!({"device_group": {"name": "dg1", "rulebase": "mid-rulebase"}})),
            &defaults(),
        )
        .expect_err("bad rulebase");
        assert!(err.has("not_in_enum"));
    }

    #[test]
    fn equal_after_defaults() {
        let a = json!({"system": {}});
        let b = json!({"system": {"ngfw_device": "localhost.localdomain"}});
        assert!(locations_equal(Some(&a), Some(&b), &defaults()).expect("valid"));
    }

    #[test]
    fn renders_scope_roots() {
        let dg = canonicalize(
            Some(&json!({"device_group": {"name": "dg1", "rulebase": "post-rulebase"}})),
            &defaults(),
        )
        .expect("dg");
        assert_eq!(
            dg.xpath().to_string(),
            "/config/devices/entry[@name='localhost.localdomain']/device-group/entry[@name='dg1']"
        );
        assert_eq!(dg.rulebase_tag(), "post-rulebase");
        let params = dg.addressing_params(true);
        assert_eq!(params.get("device_group").map(String::as_str), Some("dg1"));
        assert_eq!(params.get("rulebase").map(String::as_str), Some("post"));
        assert!(!dg.addressing_params(false).contains_key("rulebase"));

        let tpl = canonicalize(
            Some(&json!({"template_vsys": {"template": "t1"}})),
            &defaults(),
        )
        .expect("template vsys");
        assert_eq!(
            tpl.xpath().to_string(),
            "/config/devices/entry[@name='localhost.localdomain']/template/entry[@name='t1']/config/devices/entry[@name='localhost.localdomain']/vsys/entry[@name='vsys1']"
        );
        assert_eq!(
            Scope::Shared.addressing_params(false).get("vsys").map(String::as_str),
            Some("shared")
        );
    }

    #[test]
    fn value_form_canonicalizes_back() {
        let scope = canonicalize(
            Some(&json!({"template": {"name": "t1", "vsys": "vsys2"}})),
            &defaults(),
        )
        .expect("template");
        assert_eq!(scope.arm(), ScopeArm::Template);
        let again = canonicalize(Some(&scope.to_value()), &defaults()).expect("round trip");
        assert_eq!(again, scope);
        assert_eq!(
            scope.to_string(),
            "template{name=t1,vsys=vsys2,ngfw_device=localhost.localdomain,panorama_device=localhost.localdomain}"
        );
    }
}
