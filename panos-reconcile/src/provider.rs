//! Orchestrator-facing operations.
//!
//! A [`Provider`] owns the resource registry, the device defaults and one
//! transport. Every operation validates its input first, resolves the scope,
//! then dispatches on the resource shape: named entries, owned sub-lists or
//! co-tenant singletons. Returned state always carries the canonical
//! `location`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ProviderConfig;
use crate::error::{Result, ValidationError};
use crate::import_id::{self, ImportId};
use crate::location::{canonicalize, DeviceDefaults, Scope};
use crate::plan::{plan, Action, Plan};
use crate::reconcile::{collection, entry, singleton, Session};
use crate::schema::{Registry, ResourceSchema, Shape};
use crate::transport::{Target, Transport};
use crate::validate::{validate, validate_planned, Validated};

pub struct Provider {
    registry: Registry,
    defaults: DeviceDefaults,
    skip_verify: bool,
    transport: Arc<dyn Transport>,
}

impl Provider {
    /// Check the endpoint settings and load the built-in resources.
    pub fn configure(config: &ProviderConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.check()?;
        let registry = Registry::builtin()?;
        Ok(Self {
            registry,
            defaults: config.device_defaults(),
            skip_verify: config.skip_verify,
            transport,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn defaults(&self) -> &DeviceDefaults {
        &self.defaults
    }

    fn schema(&self, type_name: &str) -> Result<&ResourceSchema> {
        Ok(self.registry.get(type_name)?)
    }

    fn session(&self, cancel: &CancellationToken) -> Session<'_> {
        Session::new(self.transport.as_ref(), cancel.clone()).skip_verify(self.skip_verify)
    }

    fn scope_of(&self, state: &Value) -> Result<Scope> {
        Ok(canonicalize(state.get("location"), &self.defaults)?)
    }

    pub fn validate(&self, type_name: &str, desired: &Value) -> Result<()> {
        validate(self.schema(type_name)?, desired, &self.defaults)?;
        Ok(())
    }

    pub fn plan(&self, type_name: &str, desired: Option<&Value>, prior: Option<&Value>) -> Result<Plan> {
        plan(self.schema(type_name)?, desired, prior, &self.defaults)
    }

    /// Create the resource from its planned value and return the new state.
    pub fn create(&self, type_name: &str, planned: &Value, cancel: &CancellationToken) -> Result<Value> {
        let schema = self.schema(type_name)?;
        let Validated { scope, position } = validate_planned(schema, planned, &self.defaults)?;
        let target = Target::resolve(schema, &scope);
        let desired = body(planned);
        let mut session = self.session(cancel);
        info!(resource = type_name, scope = %scope, "create");

        let state = match &schema.shape {
            Shape::Entry => entry::create(&mut session, schema, &target, &desired)?,
            Shape::Collection { list, .. } => {
                let items = items(&desired, list);
                let applied = collection::apply(&mut session, schema, &target, &items, &[], &position)?;
                collection_state(list, applied, desired.get("position"))
            }
            Shape::Singleton { .. } => singleton::write(&mut session, schema, &target, &desired, None)?,
        };
        Ok(with_location(state, &scope))
    }

    /// Refresh `state` from the server; `None` when the resource is gone.
    pub fn read(&self, type_name: &str, state: &Value, cancel: &CancellationToken) -> Result<Option<Value>> {
        let schema = self.schema(type_name)?;
        let scope = self.scope_of(state)?;
        let target = Target::resolve(schema, &scope);
        let known = body(state);
        let mut session = self.session(cancel);

        let fresh = match &schema.shape {
            Shape::Entry => entry::read(&mut session, schema, &target, &known)?,
            Shape::Collection { list, .. } => {
                let prior = items(&known, list);
                collection::read(&mut session, schema, &target, &prior)?
                    .map(|observed| collection_state(list, observed, known.get("position")))
            }
            Shape::Singleton { .. } => Some(singleton::read(&mut session, schema, &target, &known)?),
        };
        Ok(fresh.map(|state| with_location(state, &scope)))
    }

    /// Converge the resource from `prior` state to its planned value.
    pub fn update(
        &self,
        type_name: &str,
        prior: &Value,
        planned: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let schema = self.schema(type_name)?;
        let Validated { scope, position } = validate_planned(schema, planned, &self.defaults)?;
        let target = Target::resolve(schema, &scope);
        let desired = body(planned);
        let known = body(prior);
        let mut session = self.session(cancel);
        info!(resource = type_name, scope = %scope, "update");

        let state = match &schema.shape {
            Shape::Entry => entry::update(&mut session, schema, &target, &known, &desired)?,
            Shape::Collection { list, .. } => {
                let want = items(&desired, list);
                let had = items(&known, list);
                let applied = collection::apply(&mut session, schema, &target, &want, &had, &position)?;
                collection_state(list, applied, desired.get("position"))
            }
            Shape::Singleton { .. } => {
                singleton::write(&mut session, schema, &target, &desired, Some(&known))?
            }
        };
        Ok(with_location(state, &scope))
    }

    /// Remove what `state` owns. Already-absent resources count as deleted.
    pub fn delete(&self, type_name: &str, state: &Value, cancel: &CancellationToken) -> Result<()> {
        let schema = self.schema(type_name)?;
        let scope = self.scope_of(state)?;
        let target = Target::resolve(schema, &scope);
        let known = body(state);
        let mut session = self.session(cancel);
        info!(resource = type_name, scope = %scope, "delete");

        match &schema.shape {
            Shape::Entry => entry::delete(&mut session, &target, &known),
            Shape::Collection { list, .. } => {
                collection::delete(&mut session, schema, &target, &items(&known, list))
            }
            Shape::Singleton { .. } => singleton::clear(&mut session, schema, &target),
        }
    }

    /// State of an existing server object named by an import identifier.
    ///
    /// The state carries every decoded field; later applies narrow it to what
    /// the declaration keeps.
    pub fn import(&self, raw: &str, cancel: &CancellationToken) -> Result<(String, Value)> {
        let id = self.parse_import_id(raw)?;
        let schema = self.schema(&id.type_name)?;
        let target = Target::resolve(schema, &id.scope);
        let mut session = self.session(cancel);
        info!(resource = %id.type_name, scope = %id.scope, names = ?id.names, "import");

        let state = match &schema.shape {
            Shape::Entry => {
                let name = id.names.first().ok_or_else(|| ValidationError::MalformedImportId {
                    reason: "missing entry name".to_string(),
                })?;
                entry::import(&mut session, schema, &target, name)?
            }
            Shape::Collection { list, .. } => {
                let imported = collection::import(&mut session, schema, &target, &id.names)?;
                collection_state(list, imported, None)
            }
            Shape::Singleton { .. } => singleton::import(&mut session, schema, &target)?,
        };
        Ok((id.type_name, with_location(state, &id.scope)))
    }

    pub fn generate_import_id(&self, type_name: &str, object: &Value) -> Result<String> {
        Ok(import_id::generate(&self.registry, type_name, object, &self.defaults)?)
    }

    pub fn parse_import_id(&self, raw: &str) -> Result<ImportId> {
        Ok(import_id::parse(&self.registry, raw, &self.defaults)?)
    }

    /// Plan and carry out the transition from `prior` to `desired`.
    ///
    /// Replacement deletes the prior resource before creating the new one.
    pub fn apply(
        &self,
        type_name: &str,
        desired: Option<&Value>,
        prior: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<(Plan, Option<Value>)> {
        let plan = self.plan(type_name, desired, prior)?;
        let state = match (&plan.action, &plan.planned, prior) {
            (Action::None, _, _) => prior.cloned(),
            (Action::Delete, _, Some(prior)) => {
                self.delete(type_name, prior, cancel)?;
                None
            }
            (Action::Create, Some(planned), _) => Some(self.create(type_name, planned, cancel)?),
            (Action::Update, Some(planned), Some(prior)) => {
                Some(self.update(type_name, prior, planned, cancel)?)
            }
            (Action::Replace { .. }, Some(planned), Some(prior)) => {
                self.delete(type_name, prior, cancel)?;
                Some(self.create(type_name, planned, cancel)?)
            }
            _ => prior.cloned(),
        };
        Ok((plan, state))
    }
}

/// The object without its `location`.
fn body(value: &Value) -> Map<String, Value> {
    let mut object = value.as_object().cloned().unwrap_or_default();
    object.remove("location");
    object
}

fn items(object: &Map<String, Value>, list: &str) -> Vec<Map<String, Value>> {
    object
        .get(list)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).cloned().collect())
        .unwrap_or_default()
}

fn collection_state(
    list: &str,
    entries: Vec<Map<String, Value>>,
    position: Option<&Value>,
) -> Map<String, Value> {
    let mut state = Map::new();
    state.insert(
        list.to_string(),
        Value::Array(entries.into_iter().map(Value::Object).collect()),
    );
    if let Some(position) = position.filter(|p| !p.is_null()) {
        state.insert("position".to_string(), position.clone());
    }
    state
}

fn with_location(mut state: Map<String, Value>, scope: &Scope) -> Value {
    state.insert("location".to_string(), scope.to_value());
    Value::Object(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use xml_config_core::parse;

    use super::Provider;
    use crate::config::{ConfigError, ProviderConfig};
    use crate::error::Error;
    use crate::plan::Action;
    use crate::transport::local::{CallKind, LocalTransport};

    fn config() -> ProviderConfig {
        ProviderConfig {
            hostname: Some("fw.example".to_string()),
            api_key: Some("secret".to_string()),
            ..ProviderConfig::default()
        }
    }

    fn provider(xml: &str) -> (Arc<LocalTransport>, Provider) {
        let transport = Arc::new(LocalTransport::new(parse(xml).expect("xml")));
        let provider = Provider::configure(&config(), transport.clone()).expect("configure");
        (transport, provider)
    }

    #[test]
    fn configure_requires_credentials() {
        let transport = Arc::new(LocalTransport::new(parse("<config/>").expect("xml")));
        let config = ProviderConfig {
            hostname: Some("fw.example".to_string()),
            ..ProviderConfig::default()
        };
        let err = Provider::configure(&config, transport).err().expect("missing credentials");
        assert!(matches!(err, Error::Config(ConfigError::MissingCredentials)));
    }

    #[test]
    fn entry_lifecycle_and_import() {
        let (transport, provider) = provider("<config><shared/></config>");
        let cancel = CancellationToken::new();
        let desired = json!({"name": "a1", "location": {"shared": {}}, "ip_netmask": "10.1.1.1/32"});

        let (plan, state) = provider.apply("address", Some(&desired), None, &cancel).expect("apply");
        assert_eq!(plan.action, Action::Create);
        let state = state.expect("state");
        assert_eq!(state["location"], json!({"shared": {}}));

        let (plan, again) = provider
            .apply("address", Some(&desired), Some(&state), &cancel)
            .expect("re-apply");
        assert_eq!(plan.action, Action::None);
        assert_eq!(again.as_ref(), Some(&state));

        let id = provider.generate_import_id("address", &desired).expect("id");
        let (type_name, imported) = provider.import(&id, &cancel).expect("import");
        assert_eq!(type_name, "address");
        assert_eq!(imported["ip_netmask"], json!("10.1.1.1/32"));

        let before = transport.mutation_count();
        let (plan, gone) = provider.apply("address", None, Some(&state), &cancel).expect("destroy");
        assert_eq!(plan.action, Action::Delete);
        assert_eq!(gone, None);
        assert_eq!(transport.mutation_count(), before + 1);
        assert_eq!(provider.read("address", &state, &cancel).expect("read"), None);
    }

    #[test]
    fn validation_failures_issue_no_rpc() {
        let (transport, provider) = provider("<config><shared/></config>");
        let desired = json!({"name": "a1", "location": {"shared": {}, "vsys": {"name": "vsys1"}}});
        let err = provider
            .apply("address", Some(&desired), None, &CancellationToken::new())
            .expect_err("ambiguous");
        assert!(err.has_validation("location_ambiguous"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn rule_updates_keep_carried_uuids() {
        let (transport, provider) = provider(
            r#"<config><devices><entry name="localhost.localdomain"><vsys><entry name="vsys1"/></vsys></entry></devices></config>"#,
        );
        let cancel = CancellationToken::new();
        let declared = json!({"location": {"vsys": {}}, "rules": [{"name": "r1"}, {"name": "r2"}]});
        let (_, state) = provider
            .apply("security_policy", Some(&declared), None, &cancel)
            .expect("create");
        let state = state.expect("state");

        let swapped = json!({"location": {"vsys": {}}, "rules": [{"name": "r2"}, {"name": "r1"}]});
        let planned = provider
            .plan("security_policy", Some(&swapped), Some(&state))
            .expect("plan")
            .planned
            .expect("planned");
        assert_eq!(planned["rules"][0]["uuid"], state["rules"][1]["uuid"]);

        transport.clear_calls();
        let updated = provider
            .update("security_policy", &state, &planned, &cancel)
            .expect("update");
        assert_eq!(updated["rules"][0]["uuid"], state["rules"][1]["uuid"]);
        assert!(transport
            .calls()
            .iter()
            .filter(|c| c.is_mutation())
            .all(|c| matches!(c.kind, CallKind::MoveGroup | CallKind::MoveEntry)));

        let forged = json!({"location": {"vsys": {}}, "rules": [{"name": "r1", "uuid": "x"}]});
        let err = provider
            .plan("security_policy", Some(&forged), Some(&updated))
            .expect_err("user-supplied uuid");
        assert!(err.has_validation("computed_attribute"));
    }

    #[test]
    fn importing_a_missing_entry_is_not_found() {
        let (_, provider) = provider("<config><shared><address/></shared></config>");
        let err = provider
            .import("v1:address:shared::nope", &CancellationToken::new())
            .expect_err("missing");
        assert!(matches!(err, Error::NotFound { ref name, .. } if name == "nope"));
    }
}
