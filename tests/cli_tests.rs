//! End-to-end tests of the callprof replay binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

const TRACE: &str = "\
# simple request
0 enter handle
10 enter query SELECT 1
35 exit
40 builtin strlen
41 exit
100 exit
";

fn trace_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_text_summary() {
    let trace = trace_file(TRACE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    cmd.arg(trace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("% time"))
        .stdout(predicate::str::contains("main()==>handle"))
        .stdout(predicate::str::contains("handle==>query"))
        .stdout(predicate::str::contains("total"));
}

#[test]
fn test_json_output() {
    let trace = trace_file(TRACE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    let output = cmd
        .arg("--format")
        .arg("json")
        .arg("--args")
        .arg("query")
        .arg(trace.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["main()==>handle"]["ct"], 1);
    assert_eq!(json["main()==>handle"]["wt"], 100);
    assert_eq!(json["handle==>query#SELECT 1"]["wt"], 25);
}

#[test]
fn test_ignore_and_no_builtins() {
    let trace = trace_file(TRACE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    cmd.arg("--ignore")
        .arg("query")
        .arg("--no-builtins")
        .arg(trace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("main()==>handle"))
        .stdout(predicate::str::contains("query").not())
        .stdout(predicate::str::contains("strlen").not());
}

#[test]
fn test_sampled_json() {
    let trace = trace_file("0 enter work\n250000 exit\n");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    let output = cmd
        .args(["--mode", "sampled", "--format", "json", "--base-us", "5000000"])
        .arg(trace.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["5.100000"], "main()==>work");
    assert_eq!(json["5.200000"], "main()==>work");
}

#[test]
fn test_layers_from_config_file() {
    let trace = trace_file(TRACE);
    let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(config, "[layers]\nquery = \"db\"").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    let output = cmd
        .arg("--config")
        .arg(config.path())
        .args(["--format", "json"])
        .arg(trace.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["main()"]["layers"]["db"]["ct"], 1);
}

#[test]
fn test_trace_from_stdin() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    cmd.arg("-")
        .write_stdin("0 enter from_stdin\n5 exit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("main()==>from_stdin"));
}

#[test]
fn test_malformed_trace_fails() {
    let trace = trace_file("0 enter a\n1 exit\n2 exit\n");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    cmd.arg(trace.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 3"));
}

#[test]
fn test_missing_trace_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    cmd.arg("/nonexistent/trace.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read trace"));
}

#[test]
fn test_ignore_and_only_conflict() {
    let trace = trace_file(TRACE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("callprof");
    cmd.args(["--ignore", "a", "--only", "b"])
        .arg(trace.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--ignore and --only"));
}
