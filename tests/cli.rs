// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! End-to-end tests driving the `blockvault` binary as a subprocess.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn blockvault_cmd() -> Command {
    Command::cargo_bin("blockvault").unwrap()
}

#[test]
fn init_store_retrieve_round_trip() {
    let tempdir = TempDir::new().unwrap();
    let cache_dir = tempdir.child("cache");
    let source = tempdir.child("source.txt");
    source.write_str("hello from the command line").unwrap();
    let dest = tempdir.child("restored.txt");

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("init")
        .assert()
        .success();
    cache_dir
        .child("blockvault.json")
        .assert(predicate::path::exists());

    let store_assert = blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("store")
        .arg(source.path())
        .assert()
        .success();
    let file_id = String::from_utf8(store_assert.get_output().stdout.clone())
        .unwrap()
        .trim()
        .to_string();
    assert!(!file_id.is_empty());

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("retrieve")
        .arg(&file_id)
        .arg(dest.path())
        .assert()
        .success();

    dest.assert("hello from the command line");
}

#[test]
fn list_and_stats_reflect_stored_files() {
    let tempdir = TempDir::new().unwrap();
    let cache_dir = tempdir.child("cache");
    let source = tempdir.child("source.txt");
    source.write_str("tracked content").unwrap();

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("init")
        .assert()
        .success();
    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("store")
        .arg(source.path())
        .arg("--file-id")
        .arg("my-file")
        .assert()
        .success();

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("my-file"));

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("files:"));
}

#[test]
fn gc_and_validate_report_a_healthy_cache() {
    let tempdir = TempDir::new().unwrap();
    let cache_dir = tempdir.child("cache");
    let source = tempdir.child("source.txt");
    source.write_str("validated content").unwrap();

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("init")
        .assert()
        .success();
    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("store")
        .arg(source.path())
        .assert()
        .success();

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("gc")
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted 0"));

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("no problems found"));
}

#[test]
fn retrieving_an_unknown_file_id_fails() {
    let tempdir = TempDir::new().unwrap();
    let cache_dir = tempdir.child("cache");
    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("init")
        .assert()
        .success();

    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("retrieve")
        .arg("never-stored")
        .arg(tempdir.child("out.txt").path())
        .assert()
        .failure();
}

#[test]
fn storing_a_nonexistent_source_file_fails_with_its_path_in_the_message() {
    let tempdir = TempDir::new().unwrap();
    let cache_dir = tempdir.child("cache");
    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("init")
        .assert()
        .success();

    let missing = tempdir.child("does-not-exist.txt");
    blockvault_cmd()
        .arg("-c")
        .arg(cache_dir.path())
        .arg("store")
        .arg(missing.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.txt"));
}
