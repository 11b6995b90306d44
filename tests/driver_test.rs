// SPDX-License-Identifier: Apache-2.0

use std::process::Command;

const GRAPH: &str = r#"{
    "vars": [{"name": "p", "ty": "bool"}, {"name": "x", "ty": {"bit_vec": 8}}],
    "nodes": [
        {"kind": "var", "var": 0},
        {"kind": "var", "var": 1},
        {"kind": "literal", "value": {"bit_vec": {"width": 8, "value": "5"}}},
        {"kind": "app", "op": {"eq": [1, 2]}},
        {"kind": "app", "op": {"or": [0, 3]}}
    ],
    "assertions": [4]
}"#;

#[test]
fn emit_writes_yices_commands_to_output_file() {
    let driver = env!("CARGO_BIN_EXE_smtbridge");
    let temp_dir = tempfile::tempdir().expect("create tempdir");
    let graph_path = temp_dir.path().join("graph.json");
    std::fs::write(&graph_path, GRAPH).expect("write graph");
    let config_path = temp_dir.path().join("smtbridge.toml");
    std::fs::write(&config_path, "backend = \"yices\"\n").expect("write config");
    let out_path = temp_dir.path().join("out.ys");

    let output = Command::new(driver)
        .arg("emit")
        .arg(graph_path.as_os_str())
        .arg("--config")
        .arg(config_path.as_os_str())
        .arg("--output")
        .arg(out_path.as_os_str())
        .output()
        .expect("emit invocation should run");
    assert!(
        output.status.success(),
        "emit failed: status={:?}\nstderr={}",
        output.status,
        String::from_utf8_lossy(&output.stderr),
    );

    let text = std::fs::read_to_string(&out_path).expect("read output");
    assert_eq!(
        text,
        "(define p::bool)\n\
         (define x::(bitvector 8))\n\
         (define t!0::bool (= x 0b00000101))\n\
         (define t!1::bool (or p t!0))\n\
         (assert t!1)\n"
    );
}

#[test]
fn emit_backend_flag_overrides_config() {
    let driver = env!("CARGO_BIN_EXE_smtbridge");
    let temp_dir = tempfile::tempdir().expect("create tempdir");
    let graph_path = temp_dir.path().join("graph.json");
    std::fs::write(&graph_path, GRAPH).expect("write graph");

    let output = Command::new(driver)
        .arg("emit")
        .arg(graph_path.as_os_str())
        .arg("--backend")
        .arg("smtlib2")
        .output()
        .expect("emit invocation should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("(set-option :produce-models true)\n"));
    assert!(stdout.contains("(declare-fun x () (_ BitVec 8))\n"));
    assert!(stdout.ends_with("(assert t!1)\n"));
}

#[test]
fn emit_reports_unsupported_theory() {
    let driver = env!("CARGO_BIN_EXE_smtbridge");
    let temp_dir = tempfile::tempdir().expect("create tempdir");
    let graph_path = temp_dir.path().join("graph.json");
    std::fs::write(
        &graph_path,
        r#"{"nodes": [
            {"kind": "literal", "value": {"complex": {"re": "1", "im": "0"}}},
            {"kind": "app", "op": {"eq": [0, 0]}}
        ], "assertions": [1]}"#,
    )
    .expect("write graph");
    let config_path = temp_dir.path().join("smtbridge.toml");
    std::fs::write(&config_path, "preset = \"smtlib2-minimal\"\n").expect("write config");

    let output = Command::new(driver)
        .arg("emit")
        .arg(graph_path.as_os_str())
        .arg("--config")
        .arg(config_path.as_os_str())
        .output()
        .expect("emit invocation should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("does not support complex numbers"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn features_lists_preset() {
    let driver = env!("CARGO_BIN_EXE_smtbridge");
    let output = Command::new(driver)
        .arg("features")
        .arg("--backend")
        .arg("yices")
        .output()
        .expect("features invocation should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("yices:"), "stdout: {}", stdout);
    assert!(stdout.contains(" function_update"));
}
