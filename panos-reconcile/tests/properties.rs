use std::path::PathBuf;
use std::sync::Arc;

use panos_reconcile::codec::{decode_entry, encode_entry};
use panos_reconcile::config::ProviderConfig;
use panos_reconcile::import_id;
use panos_reconcile::location::{canonicalize, DeviceDefaults};
use panos_reconcile::provider::Provider;
use panos_reconcile::reconcile::ordering::{
    apply_moves, is_satisfied, minimal_moves, target_order, Position,
};
use panos_reconcile::schema::Registry;
use panos_reconcile::transport::local::LocalTransport;
use panos_reconcile::transport::Target;
use panos_reconcile::value::AttrPath;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn edge_position() -> impl Strategy<Value = Position> {
    prop_oneof![Just(Position::First), Just(Position::Last)]
}

/// A server list interleaving three foreign entries with the owned ones.
fn server_and_owned() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    prop::collection::btree_set("o[0-9]{1,2}", 0..6).prop_flat_map(|owned| {
        let owned: Vec<String> = owned.into_iter().collect();
        let mut all = owned.clone();
        all.extend(["F1", "F2", "F3"].map(String::from));
        (Just(all).prop_shuffle(), Just(owned).prop_shuffle())
    })
}

fn foreign(order: &[String]) -> Vec<String> {
    order.iter().filter(|n| n.starts_with('F')).cloned().collect()
}

proptest! {
    #[test]
    fn moves_reach_the_target_without_touching_foreign_entries(
        (server, owned) in server_and_owned(),
        position in edge_position(),
    ) {
        let target = target_order(&server, &owned, &position);
        let moves = minimal_moves(&server, &target, &owned);
        prop_assert!(moves.iter().all(|m| !m.entry.starts_with('F')));

        let result = apply_moves(&server, &moves);
        prop_assert_eq!(&result, &target);
        prop_assert!(is_satisfied(&result, &owned, &position));
        prop_assert_eq!(foreign(&result), foreign(&server));
    }

    #[test]
    fn pivot_anchors_keep_the_block_adjacent(
        (server, owned) in server_and_owned(),
        before in any::<bool>(),
    ) {
        let pivot = "F2".to_string();
        let position = if before {
            Position::Before { pivot, directly: true }
        } else {
            Position::After { pivot, directly: true }
        };
        let target = target_order(&server, &owned, &position);
        let result = apply_moves(&server, &minimal_moves(&server, &target, &owned));
        prop_assert!(is_satisfied(&result, &owned, &position));
        prop_assert_eq!(foreign(&result), foreign(&server));
    }

    #[test]
    fn import_ids_parse_back(
        name in "[a-zA-Z0-9 %:,=._-]{1,16}",
        device_group in "[a-z][a-z0-9-]{0,10}",
    ) {
        let registry = Registry::builtin().expect("registry");
        let defaults = DeviceDefaults::default();
        let location = json!({"device_group": {"name": device_group}});
        let object = json!({"name": name, "location": location, "fqdn": "a.example"});

        let id = import_id::generate(&registry, "address", &object, &defaults).expect("id");
        let parsed = import_id::parse(&registry, &id, &defaults).expect("parse");
        prop_assert_eq!(parsed.type_name, "address");
        prop_assert_eq!(parsed.scope, canonicalize(Some(&location), &defaults).expect("scope"));
        prop_assert_eq!(parsed.names, vec![name]);
    }

    #[test]
    fn address_entries_survive_the_wire(
        name in "[a-z][a-z0-9-]{0,12}",
        host in 1u8..=254,
        description in proptest::option::of("[a-zA-Z0-9]{1,20}"),
        tags in prop::collection::btree_set("[a-z]{1,6}", 1..4),
    ) {
        let registry = Registry::builtin().expect("registry");
        let schema = &registry.get("address").expect("type").body;
        let mut object = Map::new();
        object.insert("name".to_string(), json!(name));
        object.insert("ip_netmask".to_string(), json!(format!("10.0.0.{host}/32")));
        if let Some(description) = description {
            object.insert("description".to_string(), json!(description));
        }
        object.insert("tags".to_string(), json!(tags.into_iter().collect::<Vec<_>>()));

        let node = encode_entry(schema, &name, &object, &AttrPath::root()).expect("encode");
        let decoded = decode_entry(schema, &node, &AttrPath::root()).expect("decode");
        prop_assert_eq!(decoded, object);
    }

    #[test]
    fn exactly_one_address_kind_is_accepted(
        kinds in prop::collection::btree_set(0usize..4, 0..4),
    ) {
        let registry = Registry::builtin().expect("registry");
        let choices = [
            ("ip_netmask", "10.0.0.1/32"),
            ("ip_range", "10.0.0.1-10.0.0.9"),
            ("ip_wildcard", "10.0.0.0/0.0.0.255"),
            ("fqdn", "a.example"),
        ];
        let mut object = json!({"name": "a1", "location": {"shared": {}}});
        for idx in &kinds {
            let (key, value) = choices[*idx];
            object[key] = json!(value);
        }
        let provider_defaults = DeviceDefaults::default();
        let outcome = panos_reconcile::validate::validate(
            registry.get("address").expect("type"),
            &object,
            &provider_defaults,
        );
        if kinds.len() == 1 {
            prop_assert!(outcome.is_ok());
        } else {
            prop_assert!(outcome.expect_err("zero or several kinds").has("variant_cardinality"));
        }
    }
}

#[test]
fn address_without_a_kind_is_rejected() {
    let registry = Registry::builtin().expect("registry");
    let object = json!({"name": "a1", "location": {"shared": {}}, "description": "no kind"});
    let err = panos_reconcile::validate::validate(
        registry.get("address").expect("type"),
        &object,
        &DeviceDefaults::default(),
    )
    .expect_err("no kind");
    assert!(err.has("variant_cardinality"));
}

fn rule_position() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(json!({"where": "first"})),
        Just(json!({"where": "last"})),
        Just(json!({"where": "before", "pivot": "Z", "directly": true})),
        Just(json!({"where": "after", "pivot": "A"})),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn second_apply_issues_no_mutation(
        names in prop::collection::btree_set("r[0-9]{1,2}", 1..5)
            .prop_flat_map(|set| Just(set.into_iter().collect::<Vec<_>>()).prop_shuffle()),
        position in rule_position(),
    ) {
        let transport = Arc::new(
            LocalTransport::from_file(&fixture("fixtures/device-base.xml")).expect("fixture"),
        );
        let config = ProviderConfig {
            hostname: Some("fw".to_string()),
            api_key: Some("key".to_string()),
            ..ProviderConfig::default()
        };
        let provider = Provider::configure(&config, transport.clone()).expect("configure");
        let rules: Vec<Value> = names.iter().map(|n| json!({"name": n})).collect();
        let mut desired = json!({"location": {"vsys": {}}, "rules": rules});
        if !position.is_null() {
            desired["position"] = position;
        }

        let cancel = CancellationToken::new();
        let plan = provider.plan("security_policy", Some(&desired), None).expect("plan");
        let planned = plan.planned.expect("planned");
        let state = provider.create("security_policy", &planned, &cancel).expect("create");

        let replanned = provider
            .plan("security_policy", Some(&desired), Some(&state))
            .expect("replan")
            .planned
            .expect("planned");
        let before = transport.mutation_count();
        provider
            .update("security_policy", &state, &replanned, &cancel)
            .expect("update");
        prop_assert_eq!(transport.mutation_count(), before);

        let scope = canonicalize(Some(&json!({"vsys": {}})), provider.defaults()).expect("scope");
        let target = Target::resolve(provider.registry().get("security_policy").expect("type"), &scope);
        let server = transport.entry_names(&target);
        prop_assert!(names.iter().all(|n| server.contains(n)));
        prop_assert_eq!(foreign_rules(&server), vec!["A", "B", "Z"]);
    }
}

fn foreign_rules(order: &[String]) -> Vec<String> {
    order.iter().filter(|n| !n.starts_with('r')).cloned().collect()
}
