//! End-to-end tests for the `wpstack` binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn wpstack() -> Command {
    let mut cmd = Command::cargo_bin("wpstack").unwrap();
    cmd.env_remove("ENVIRONMENT_NAME").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    wpstack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--environment"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_stdout_prints_json_template() {
    let output = wpstack()
        .args(["--environment", "dev", "--stdout", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AWSTemplateFormatVersion"))
        .get_output()
        .stdout
        .clone();

    let template: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let resources = template["Resources"].as_object().unwrap();
    assert!(resources
        .values()
        .any(|r| r["Type"] == "AWS::CodePipeline::Pipeline"));
}

#[test]
fn test_stdout_prints_yaml_template() {
    wpstack()
        .args(["--stdout", "--format", "yaml", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AWSTemplateFormatVersion:"));
}

#[test]
fn test_writes_assembly_directory() {
    let temp = tempdir().unwrap();
    let out = temp.path().join("cdk.out");

    wpstack()
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Synthesized 2 stack(s) for 'dev'"));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
    assert!(manifest["artifacts"]["dev-exprj-stack"].is_object());
    assert!(manifest["artifacts"]["dev-exprj-infrastructure-pipeline"].is_object());
    assert!(out.join("dev-exprj-stack.template.json").exists());
}

#[test]
fn test_environment_variable_selects_profile() {
    let temp = tempdir().unwrap();

    wpstack()
        .env("ENVIRONMENT_NAME", "prod")
        .arg("--output")
        .arg(temp.path())
        .arg("--quiet")
        .assert()
        .success();

    let template = fs::read_to_string(temp.path().join("prod-exprj-stack.template.json")).unwrap();
    assert!(template.contains("AWS::RDS::DBInstance"));
}

#[test]
fn test_unknown_environment_falls_back_to_dev() {
    let temp = tempdir().unwrap();

    wpstack()
        .args(["--environment", "staging"])
        .arg("--output")
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("staging"))
        .stdout(predicate::str::contains("'dev'"));

    assert!(temp.path().join("dev-exprj-stack.template.json").exists());
}

#[test]
fn test_invalid_arguments_exit_code() {
    wpstack()
        .args(["--format", "toml"])
        .assert()
        .code(2);

    wpstack().args(["--verbose", "--quiet"]).assert().code(2);
}
