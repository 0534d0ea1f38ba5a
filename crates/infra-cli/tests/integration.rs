#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const REQUIRED: &[(&str, &str)] = &[
    ("APP_NAME", "acme"),
    ("AWS_REGION", "us-east-1"),
    ("AWS_ACCOUNT_ID", "123456789012"),
    ("HOSTED_ZONE_ID", "Z0123456789ABC"),
    ("HOSTED_ZONE_NAME", "acme.dev"),
    ("HASURA_HOSTNAME", "hasura.acme.dev"),
    ("ACTIONS_HOSTNAME", "actions.acme.dev"),
];

/// A project root with a built action handler and dependency layer.
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let actions = dir.path().join("actions");
    std::fs::create_dir_all(actions.join("dist")).unwrap();
    std::fs::write(actions.join("dist/handler.js"), "exports.handler = async () => ({})").unwrap();
    std::fs::create_dir_all(actions.join("dependencies-layer/nodejs")).unwrap();
    std::fs::write(actions.join("dependencies-layer/nodejs/package.json"), "{}").unwrap();
    dir
}

fn infra(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.env_clear()
        .current_dir(dir.path())
        .env("INFRA_ROOT", dir.path())
        .envs(REQUIRED.iter().copied());
    cmd
}

fn template(dir: &TempDir) -> serde_json::Value {
    let body = std::fs::read_to_string(dir.path().join("infra.out/acme-StagingStack.template.json")).unwrap();
    serde_json::from_str(&body).unwrap()
}

// ---------------------------------------------------------------------------
// infra env
// ---------------------------------------------------------------------------

#[test]
fn env_reports_stack_name() {
    let dir = project();
    infra(&dir)
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("acme-StagingStack"));
}

#[test]
fn env_json_includes_config() {
    let dir = project();
    let out = infra(&dir).args(["env", "--json"]).output().unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["config"]["app_name"], "acme");
    assert_eq!(value["config"]["multi_az"], false);
    assert_eq!(value["stack_name"], "acme-StagingStack");
}

#[test]
fn each_missing_variable_is_named() {
    for (name, _) in REQUIRED {
        let dir = project();
        infra(&dir)
            .env_remove(name)
            .arg("synth")
            .assert()
            .failure()
            .stderr(predicate::str::contains(format!("{name} must be defined in environment")));
        assert!(!dir.path().join("infra.out").exists());
    }
}

#[test]
fn hostname_outside_zone_fails_env() {
    let dir = project();
    infra(&dir)
        .env("ACTIONS_HOSTNAME", "actions.other.io")
        .arg("env")
        .assert()
        .failure()
        .stdout(predicate::str::contains("not inside hosted zone"));
}

// ---------------------------------------------------------------------------
// infra synth
// ---------------------------------------------------------------------------

#[test]
fn synth_writes_assembly() {
    let dir = project();
    infra(&dir)
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synthesized acme-StagingStack"));

    let out = dir.path().join("infra.out");
    assert!(out.join("acme-StagingStack.template.json").exists());
    assert!(out.join("acme-StagingStack.assets.json").exists());
    assert!(out.join("manifest.json").exists());

    let t = template(&dir);
    assert_eq!(t["AWSTemplateFormatVersion"], "2010-09-09");
    let count = |ty: &str| {
        t["Resources"]
            .as_object()
            .unwrap()
            .values()
            .filter(|r| r["Type"] == ty)
            .count()
    };
    assert_eq!(count("AWS::EC2::VPC"), 1);
    assert_eq!(count("AWS::RDS::DBInstance"), 1);
    assert_eq!(count("AWS::ECS::Service"), 1);
    assert_eq!(count("AWS::Lambda::Function"), 1);
}

#[test]
fn synth_is_idempotent() {
    let dir = project();
    infra(&dir).arg("synth").assert().success();
    let first = std::fs::read(dir.path().join("infra.out/acme-StagingStack.template.json")).unwrap();
    infra(&dir)
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes."));
    let second = std::fs::read(dir.path().join("infra.out/acme-StagingStack.template.json")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn synth_yaml_to_custom_dir() {
    let dir = project();
    let out = dir.path().join("cdk.out");
    infra(&dir)
        .args(["synth", "--format", "yaml", "--out"])
        .arg(&out)
        .assert()
        .success();
    let body = std::fs::read_to_string(out.join("acme-StagingStack.template.yaml")).unwrap();
    assert!(body.contains("AWS::RDS::DBInstance"));
}

#[test]
fn synth_rejects_unknown_format() {
    let dir = project();
    infra(&dir)
        .args(["synth", "--format", "toml"])
        .assert()
        .failure();
}

#[test]
fn synth_without_action_build_fails() {
    let dir = project();
    std::fs::remove_dir_all(dir.path().join("actions/dist")).unwrap();
    infra(&dir)
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("asset directory not found"));
}

#[test]
fn stage_variable_renames_stack() {
    let dir = project();
    infra(&dir).env("STAGE", "production").arg("synth").assert().success();
    assert!(dir
        .path()
        .join("infra.out/acme-ProductionStack.template.json")
        .exists());
}

// ---------------------------------------------------------------------------
// infra ls / outputs
// ---------------------------------------------------------------------------

#[test]
fn ls_filters_by_type() {
    let dir = project();
    let out = infra(&dir)
        .args(["ls", "--json", "--type", "AWS::ApiGateway::Method"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let items: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn outputs_lists_secret_arns() {
    let dir = project();
    infra(&dir)
        .arg("outputs")
        .assert()
        .success()
        .stdout(predicate::str::contains("HasuraDatabaseUserSecretArn"))
        .stdout(predicate::str::contains("HasuraDatabaseMasterSecretArn"))
        .stdout(predicate::str::contains("HasuraDatabaseUrlSecretArn"))
        .stdout(predicate::str::contains("HasuraAdminSecretArn"))
        .stdout(predicate::str::contains("HasuraJwtSecretArn"));
}
