use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("panos-reconcile"));
    cmd.env("PANOS_HOSTNAME", "fw-lab-01.example")
        .env("PANOS_API_KEY", "lab-key")
        .env_remove("PANOS_USERNAME")
        .env_remove("PANOS_PASSWORD")
        .env_remove("PANOS_PANORAMA_DEVICE")
        .env_remove("PANOS_NGFW_DEVICE");
    cmd
}

#[test]
fn import_id_is_printed_for_a_declared_address() {
    let dir = tempdir().expect("tempdir");
    let desired = dir.path().join("a1.json");
    fs::write(
        &desired,
        r#"{"name": "a1", "location": {"device_group": {"name": "dg1"}}, "fqdn": "a1.example"}"#,
    )
    .expect("write desired");

    cli()
        .arg("import-id")
        .arg("address")
        .arg(&desired)
        .assert()
        .success()
        .stdout(predicate::eq(
            "v1:address:device_group:name=dg1,rulebase=pre-rulebase,panorama_device=localhost.localdomain:a1\n",
        ));
}

#[test]
fn parse_import_id_reports_json() {
    cli()
        .arg("parse-import-id")
        .arg("v1:address:device_group:name=dg1:a1")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\": \"address\""))
        .stdout(predicate::str::contains("\"dg1\""))
        .stdout(predicate::str::contains("\"a1\""));
}

#[test]
fn malformed_import_id_is_rejected() {
    cli()
        .arg("parse-import-id")
        .arg("v2:address:shared::a1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[malformed_import_id]"));
}

#[test]
fn missing_credentials_fail_before_anything_else() {
    let mut cmd = cli();
    cmd.env_remove("PANOS_API_KEY")
        .arg("parse-import-id")
        .arg("v1:address:shared::a1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing credentials"));
}

#[test]
fn validate_lists_every_failure_with_its_code() {
    let dir = tempdir().expect("tempdir");
    let desired = dir.path().join("bad.json");
    fs::write(
        &desired,
        r#"{"name": "a1", "location": {"shared": {}, "vsys": {"name": "vsys1"}}, "ip_netmask": "10.0.0.1/33"}"#,
    )
    .expect("write desired");

    cli()
        .arg("validate")
        .arg("address")
        .arg(&desired)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[location_ambiguous]"))
        .stderr(predicate::str::contains("[pattern_mismatch]"));
}

#[test]
fn validate_accepts_a_good_value() {
    let dir = tempdir().expect("tempdir");
    let desired = dir.path().join("dns.json");
    fs::write(
        &desired,
        r#"{"location": {"system": {}}, "primary": "172.16.0.1", "secondary": "172.16.0.2"}"#,
    )
    .expect("write desired");

    cli()
        .arg("validate")
        .arg("dns_settings")
        .arg(&desired)
        .assert()
        .success()
        .stdout(predicate::str::contains("is a valid dns_settings"));
}
