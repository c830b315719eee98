use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn cli() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("panos-reconcile"));
    cmd.env("PANOS_HOSTNAME", "fw-lab-01.example")
        .env("PANOS_API_KEY", "lab-key")
        .env("NO_COLOR", "1");
    cmd
}

struct Lab {
    dir: TempDir,
}

impl Lab {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        fs::copy(fixture("fixtures/device-base.xml"), dir.path().join("device.xml"))
            .expect("copy fixture");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write");
        path
    }

    fn device(&self) -> String {
        fs::read_to_string(self.path("device.xml")).expect("device")
    }

    fn run(&self, subcommand: &str, resource: &str, desired: Option<&Path>) -> assert_cmd::assert::Assert {
        let mut cmd = cli();
        cmd.arg(subcommand).arg(resource);
        if let Some(desired) = desired {
            cmd.arg(desired);
        }
        cmd.arg("--device")
            .arg(self.path("device.xml"))
            .arg("--state")
            .arg(self.path("state.json"))
            .assert()
    }
}

const RULES_FIRST: &str = r#"{
  "location": {"vsys": {}},
  "position": {"where": "first"},
  "rules": [
    {"name": "r1", "application": ["web-browsing"]},
    {"name": "r2", "action": "deny"}
  ]
}"#;

fn position_of(haystack: &str, needle: &str) -> usize {
    haystack.find(needle).unwrap_or_else(|| panic!("{needle} not in device"))
}

#[test]
fn apply_is_idempotent_and_keeps_foreign_rules() {
    let lab = Lab::new();
    let desired = lab.write("rules.json", RULES_FIRST);

    lab.run("apply", "security_policy", Some(desired.as_path()))
        .success()
        .stdout(predicate::str::contains("create"));
    let device = lab.device();
    assert!(position_of(&device, r#"name="r1""#) < position_of(&device, r#"name="r2""#));
    assert!(position_of(&device, r#"name="r2""#) < position_of(&device, r#"name="A""#));
    assert!(device.contains(r#"name="Z""#));
    let state = fs::read_to_string(lab.path("state.json")).expect("state");
    assert!(state.contains("\"uuid\""));

    lab.run("apply", "security_policy", Some(desired.as_path()))
        .success()
        .stdout(predicate::str::contains("no changes"))
        .stdout(predicate::str::contains("0 mutating call(s)"));
    assert_eq!(lab.device(), device);
}

#[test]
fn destroy_removes_only_owned_rules() {
    let lab = Lab::new();
    let desired = lab.write("rules.json", RULES_FIRST);
    lab.run("apply", "security_policy", Some(desired.as_path())).success();

    lab.run("destroy", "security_policy", None)
        .success()
        .stdout(predicate::str::contains("delete"));
    let device = lab.device();
    assert!(!device.contains(r#"name="r1""#));
    assert!(device.contains(r#"name="A""#));
    assert!(!lab.path("state.json").exists());

    lab.run("destroy", "security_policy", None)
        .success()
        .stdout(predicate::str::contains("nothing to destroy"));
}

#[test]
fn missing_pivot_fails_without_writing() {
    let lab = Lab::new();
    let before = lab.device();
    let desired = lab.write(
        "rules.json",
        r#"{"location": {"vsys": {}}, "position": {"where": "before", "pivot": "nope", "directly": true}, "rules": [{"name": "r1"}]}"#,
    );

    lab.run("apply", "security_policy", Some(desired.as_path()))
        .failure()
        .stderr(predicate::str::contains("pivot entry 'nope'"));
    assert_eq!(lab.device(), before);
    assert!(!lab.path("state.json").exists());
}

#[test]
fn output_flag_leaves_the_source_device_alone() {
    let lab = Lab::new();
    let before = lab.device();
    let desired = lab.write(
        "dns.json",
        r#"{"location": {"system": {}}, "primary": "172.16.0.1"}"#,
    );
    let out = lab.path("out.xml");

    let mut cmd = cli();
    cmd.arg("apply")
        .arg("dns_settings")
        .arg(&desired)
        .arg("--device")
        .arg(lab.path("device.xml"))
        .arg("--state")
        .arg(lab.path("state.json"))
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(lab.device(), before);
    let written = fs::read_to_string(out).expect("output");
    assert!(written.contains("<primary>172.16.0.1</primary>"));
    assert!(written.contains("<hostname>fw-lab-01</hostname>"));
}

#[test]
fn plan_reports_json() {
    let lab = Lab::new();
    let desired = lab.write("rules.json", RULES_FIRST);
    cli()
        .arg("plan")
        .arg("security_policy")
        .arg(&desired)
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"create\""))
        .stdout(predicate::str::contains("\"ngfw_device\": \"localhost.localdomain\""));
}

#[test]
fn import_writes_the_observed_state() {
    let lab = Lab::new();
    let mut cmd = cli();
    cmd.arg("import")
        .arg("v1:address:vsys:name=vsys1:web-srv")
        .arg("--device")
        .arg(lab.path("device.xml"))
        .arg("--state")
        .arg(lab.path("state.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("imported address"));
    let state = fs::read_to_string(lab.path("state.json")).expect("state");
    assert!(state.contains("\"description\": \"web server\""));
    assert!(state.contains("\"ip_netmask\": \"10.1.1.10/32\""));
}
