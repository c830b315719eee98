use std::collections::BTreeMap;

use crate::error::{DecodeError, Error, Result, ValidationError, ValidationErrors};
use crate::schema::{ResourceSchema, Shape};
use crate::value::AttrPath;

/// Resource types known to the provider, checked once at start-up.
#[derive(Debug, Clone)]
pub struct Registry {
    resources: BTreeMap<&'static str, ResourceSchema>,
}

impl Registry {
    /// The built-in catalogue.
    pub fn builtin() -> Result<Self> {
        Self::new(super::resources::all())
    }

    /// Build a registry, rejecting overlapping singleton masks and singleton
    /// attributes that live outside their mask.
    pub fn new(resources: Vec<ResourceSchema>) -> Result<Self> {
        let mut owners: BTreeMap<(String, &'static str), &'static str> = BTreeMap::new();
        let mut overlaps = ValidationErrors::new();

        for schema in &resources {
            let Shape::Singleton { mask } = &schema.shape else {
                continue;
            };
            for attr in &schema.body.attributes {
                if !mask.iter().any(|tag| *tag == attr.xml_head()) {
                    return Err(Error::Decode(DecodeError::SchemaMismatch {
                        path: AttrPath::attr_root(attr.name),
                        reason: format!(
                            "{} binds <{}> outside its mask [{}]",
                            schema.type_name,
                            attr.xml_head(),
                            mask.join(", ")
                        ),
                    }));
                }
            }
            for tag in mask {
                let key = (schema.document_key(), *tag);
                match owners.get(&key) {
                    Some(first) => overlaps.push(ValidationError::MaskOverlap {
                        document: key.0.clone(),
                        field: (*tag).to_string(),
                        first: (*first).to_string(),
                        second: schema.type_name.to_string(),
                    }),
                    None => {
                        owners.insert(key, schema.type_name);
                    }
                }
            }
        }
        overlaps.into_result()?;

        Ok(Self {
            resources: resources.into_iter().map(|r| (r.type_name, r)).collect(),
        })
    }

    pub fn get(&self, type_name: &str) -> Result<&ResourceSchema, ValidationError> {
        self.resources
            .get(type_name)
            .ok_or_else(|| ValidationError::UnsupportedResourceType {
                name: type_name.to_string(),
            })
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;
    use crate::location::ScopeArm;
    use crate::schema::{Attribute, ObjectSchema, ResourceSchema};

    fn singleton(name: &'static str, mask: &[&'static str], attrs: Vec<Attribute>) -> ResourceSchema {
        ResourceSchema::singleton(
            name,
            "deviceconfig/system",
            mask,
            &[ScopeArm::System],
            ObjectSchema::new(attrs),
        )
    }

    #[test]
    fn builtin_catalogue_is_consistent() {
        let registry = Registry::builtin().expect("builtin registry");
        for name in [
            "address",
            "security_policy",
            "nat_policy",
            "dns_settings",
            "ntp_settings",
        ] {
            assert!(registry.get(name).is_ok(), "{name} registered");
        }
        let err = registry.get("bogus").expect_err("unknown type");
        assert_eq!(err.code(), "unsupported_resource_type");
    }

    #[test]
    fn overlapping_masks_are_rejected() {
        let err = Registry::new(vec![
            singleton("a", &["hostname"], vec![Attribute::text("hostname")]),
            singleton("b", &["hostname", "domain"], vec![Attribute::text("domain")]),
        ])
        .expect_err("overlap");
        assert!(err.has_validation("mask_overlap"));
    }

    #[test]
    fn attributes_outside_the_mask_are_rejected() {
        let err = Registry::new(vec![singleton(
            "a",
            &["hostname"],
            vec![Attribute::text("timezone")],
        )])
        .expect_err("outside mask");
        assert!(err.to_string().contains("outside its mask"));
    }
}
