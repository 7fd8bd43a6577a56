// Copyright 2024-2026 The jitdiff authors

//! Tests for the CLI layer: argument and configuration errors, without a
//! real toolchain.

use std::fs::write;

use assert_cmd::Command;
use indoc::formatdoc;
use predicates::prelude::*;
use tempfile::TempDir;

fn run() -> Command {
    Command::cargo_bin("jitdiff").unwrap()
}

#[test]
fn missing_config_argument_is_a_usage_error() {
    run().assert().code(1);
}

#[test]
fn show_version() {
    run()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::is_match(r"^jitdiff \d+\.\d+\.\d+(-.*)?\n$").unwrap());
}

#[test]
fn nonexistent_config_is_a_usage_error() {
    run()
        .arg("/nonexistent/campaign.yaml")
        .assert()
        .code(1)
        .stdout(predicates::str::contains("error"));
}

#[test]
fn malformed_config_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("campaign.yaml");
    write(&config, "num_proc: [what]\n").unwrap();
    run()
        .arg(config)
        .assert()
        .code(1)
        .stdout(predicates::str::contains("error"));
}

#[test]
fn missing_toolchain_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let out_dir = dir.path().join("out");
    std::fs::create_dir(&out_dir).unwrap();
    let config = dir.path().join("campaign.yaml");
    write(
        &config,
        formatdoc! {r#"
            num_proc: 1
            prog_timeout: 10
            rand_seed: 1
            num_mutation: 1
            save_timeouts: false
            out_dir: {out_dir}
            java:
              home: /nonexistent/jdk
            jvm:
              type: hotspot
              java_home: /nonexistent/jdk
            generator:
              name: ExistingTests
              out_dir: {out_dir}
              exist_dir: {out_dir}
            artemis:
              jar: /nonexistent/artemis.jar
              code_bricks: /nonexistent/bricks
              policy: artemis
              min_loop_trip: 32
              max_loop_trip: 256
        "#, out_dir = out_dir.display()},
    )
    .unwrap();
    run()
        .arg(config)
        .assert()
        .code(1)
        .stdout(predicates::str::contains("javac"));
}
