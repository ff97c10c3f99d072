use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use sha1::{Digest, Sha1};
use std::process::Command;

// Nothing listens on port 1, so every fetch fails fast.
const DEAD_REMOTE: &str = "http://127.0.0.1:1";

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

fn seed_object(td: &assert_fs::TempDir, body: &[u8]) -> String {
    let h = sha1_hex(body);
    td.child(format!("assets/objects/{}/{}", &h[..2], h)).write_binary(body).unwrap();
    h
}

fn write_index(td: &assert_fs::TempDir, version: &str, entries: &[(&str, &str)]) {
    let objects: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(p, h)| (p.to_string(), serde_json::json!({ "hash": h, "size": 1 })))
        .collect();
    td.child(format!("assets/indexes/{version}.json"))
        .write_str(&serde_json::json!({ "objects": objects }).to_string())
        .unwrap();
}

fn assetsync(td: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("assetsync").unwrap();
    cmd.current_dir(td.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn reconcile_from_local_store_happy_path() {
    let td = assert_fs::TempDir::new().unwrap();
    let icon = seed_object(&td, b"icon bytes");
    let lang = seed_object(&td, b"{\"gui.done\": \"Done\"}");
    write_index(&td, "1.16", &[("icons/icon_16x16.png", &icon), ("minecraft/lang/en_gb.json", &lang)]);

    assetsync(&td)
        .args(["reconcile", "1.16", "--local-root", "assets", "--dest", "out", "--remote-base", DEAD_REMOTE])
        .assert()
        .success()
        .stdout(predicate::str::contains("placed=2"))
        .stdout(predicate::str::contains("OK"));

    td.child("out/icons/icon_16x16.png").assert(predicate::path::is_file());
    td.child("out/minecraft/lang/en_gb.json").assert("{\"gui.done\": \"Done\"}");
    td.child("missing_assets.json").assert(predicate::path::missing());

    // second run leaves everything as is
    assetsync(&td)
        .args(["reconcile", "1.16", "--local-root", "assets", "--dest", "out", "--remote-base", DEAD_REMOTE])
        .assert()
        .success()
        .stdout(predicate::str::contains("placed=0 existing=2"));
}

#[test]
fn unreachable_objects_produce_deficiency_report_and_exit_2() {
    let td = assert_fs::TempDir::new().unwrap();
    let present = seed_object(&td, b"here");
    let absent = sha1_hex(b"not anywhere");
    write_index(&td, "1.16", &[("a/here.png", &present), ("a/b.png", &absent)]);

    assetsync(&td)
        .args([
            "reconcile", "1.16",
            "--local-root", "assets",
            "--dest", "out",
            "--remote-base", DEAD_REMOTE,
            "--max-retries", "1",
            "--cooldown-ms", "1",
            "--timeout-ms", "2000",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("unresolved=1"))
        .stdout(predicate::str::contains("missing_assets.json"));

    td.child("out/a/here.png").assert("here");
    td.child("out/a/b.png").assert(predicate::path::missing());
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(td.child("missing_assets.json").path()).unwrap()).unwrap();
    assert_eq!(doc, serde_json::json!({ "version": "1.16", "files": { "a/b.png": absent } }));
}

#[test]
fn malformed_manifest_fails_without_touching_dest() {
    let td = assert_fs::TempDir::new().unwrap();
    td.child("broken.json").write_str("{\"objects\": [1, 2]}").unwrap();

    assetsync(&td)
        .args(["reconcile", "x", "--manifest", "broken.json", "--local-root", "assets", "--dest", "out"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("parse manifest"));

    td.child("out").assert(predicate::path::missing());
}

#[test]
fn version_with_path_separators_is_rejected() {
    let td = assert_fs::TempDir::new().unwrap();
    td.child("outside.json").write_str("{\"objects\": {}}").unwrap();

    assetsync(&td)
        .args(["reconcile", "../../outside", "--local-root", "assets", "--dest", "out"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid asset index id"));
    td.child("out").assert(predicate::path::missing());
}

#[test]
fn config_file_supplies_paths() {
    let td = assert_fs::TempDir::new().unwrap();
    let h = seed_object(&td, b"from config");
    write_index(&td, "1.8", &[("sounds/a.ogg", &h)]);
    td.child("assetsync.json")
        .write_str(r#"{"local_root": "assets", "dest_root": "tree", "remote_base": "http://127.0.0.1:1", "jobs": 2}"#)
        .unwrap();

    assetsync(&td)
        .args(["reconcile", "1.8", "--config", "assetsync.json"])
        .assert()
        .success();
    td.child("tree/sounds/a.ogg").assert("from config");
}

#[test]
fn locate_prints_store_path_and_url() {
    let td = assert_fs::TempDir::new().unwrap();
    let h = "abcd1234abcd1234abcd1234abcd1234abcd1234";
    assetsync(&td)
        .args(["locate", h, "--local-root", "mc"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{h} (absent)")))
        .stdout(predicate::str::contains(format!("https://resources.download.minecraft.net/ab/{h}")));

    assetsync(&td).args(["locate", "ABC"]).assert().failure();
}

#[test]
fn audit_flags_corrupt_objects() {
    let td = assert_fs::TempDir::new().unwrap();
    seed_object(&td, b"good");
    let bad = seed_object(&td, b"soon bad");
    td.child(format!("assets/objects/{}/{}", &bad[..2], bad)).write_str("tampered").unwrap();

    assetsync(&td)
        .args(["audit", "--local-root", "assets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok=1, corrupt=1"))
        .stdout(predicate::str::contains("BAD"));
}
