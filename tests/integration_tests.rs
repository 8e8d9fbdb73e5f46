//! Integration tests for the stockroom CLI
//!
//! Each test runs the binary against a fresh database in a temp directory.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Helper to create a stockroom Command isolated from the caller's environment
fn stockroom(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(dir.path())
        .env_remove("STOCKROOM_DB_PATH")
        .env_remove("STOCKROOM_PORT")
        .env_remove("STOCKROOM_HOST")
        .env_remove("STOCKROOM_LOG_LEVEL")
        .env_remove("STOCKROOM_HISTORY_CAP")
        .env_remove("RUST_LOG")
        .arg("--db-path")
        .arg(dir.path().join("ledger.db"));
    cmd
}

/// Run a command expected to succeed and parse its stdout as JSON
fn run_json(dir: &TempDir, args: &[&str]) -> Value {
    let output = stockroom(dir).args(args).assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn add_pool(dir: &TempDir, kind: &str, total: &str, level: &str) -> String {
    let pool = run_json(
        dir,
        &["pool", "add", kind, "--name", "Overlock machine", "--total", total, "--level", level],
    );
    pool["id"].as_str().unwrap().to_string()
}

fn add_worker(dir: &TempDir, level: &str) -> String {
    let worker = run_json(dir, &["worker", "add", "--name", "Amina", "--level", level]);
    worker["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        cargo_bin_cmd!("stockroom")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("assign"));
    }

    #[test]
    fn test_version() {
        cargo_bin_cmd!("stockroom").arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_database() {
        let dir = TempDir::new().unwrap();
        stockroom(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Ledger database initialized"));
        assert!(dir.path().join("ledger.db").exists());
    }

    #[test]
    fn test_unknown_kind_rejected_by_parser() {
        let dir = TempDir::new().unwrap();
        stockroom(&dir)
            .args(["pool", "list", "tools"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid resource kind"));
    }
}

// =============================================================================
// Circulation
// =============================================================================

mod circulation {
    use super::*;

    #[test]
    fn test_assign_back_round_trip() {
        let dir = TempDir::new().unwrap();
        let pool = add_pool(&dir, "custody", "100", "2");
        let worker = add_worker(&dir, "5");

        let ack = run_json(&dir, &["assign", "custody", &pool, &worker, "30"]);
        assert_eq!(ack["status"], "ok");

        stockroom(&dir)
            .args(["assign", "custody", &pool, &worker, "80"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("70 available"));

        run_json(&dir, &["back", "custody", &pool, &worker, "10", "--note", "blade dull"]);

        let entry = run_json(&dir, &["ledger", "pair", "custody", &pool, &worker]);
        assert_eq!(entry["cumulativeQuantity"], 20);
        assert_eq!(entry["note"], "blade dull");
        assert_eq!(entry["history"].as_array().unwrap().len(), 2);

        run_json(&dir, &["back", "custody", &pool, &worker, "20"]);

        let shown = run_json(&dir, &["pool", "show", "custody", &pool]);
        assert_eq!(shown["availableQuantity"], 100);
        assert_eq!(shown["currentHolders"], serde_json::json!({}));

        let report = run_json(&dir, &["reconcile", "custody", &pool]);
        assert_eq!(report["balanced"], true);
    }

    #[test]
    fn test_eligibility_rejection_exits_nonzero() {
        let dir = TempDir::new().unwrap();
        let pool = add_pool(&dir, "custody", "10", "5");
        let worker = add_worker(&dir, "3");

        stockroom(&dir)
            .args(["assign", "custody", &pool, &worker, "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("eligibility level 3"));
    }

    #[test]
    fn test_back_without_take_reports_missing_relationship() {
        let dir = TempDir::new().unwrap();
        let pool = add_pool(&dir, "material", "10", "0");
        let worker = add_worker(&dir, "0");

        stockroom(&dir)
            .args(["back", "material", &pool, &worker, "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no relationship"));
    }

    #[test]
    fn test_invalid_identifier_names_field() {
        let dir = TempDir::new().unwrap();
        let worker = add_worker(&dir, "0");

        stockroom(&dir)
            .args(["assign", "material", "not-a-uuid", &worker, "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("resourceId"));
    }

    #[test]
    fn test_material_pool_is_not_visible_as_custody() {
        let dir = TempDir::new().unwrap();
        let pool = add_pool(&dir, "material", "10", "0");

        stockroom(&dir)
            .args(["pool", "show", "custody", &pool])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not found"));
    }

    #[test]
    fn test_ledger_listings_and_note() {
        let dir = TempDir::new().unwrap();
        let pool = add_pool(&dir, "material", "500", "0");
        let worker = add_worker(&dir, "0");

        run_json(
            &dir,
            &["assign", "material", &pool, &worker, "120", "--label", "cutting room"],
        );

        let by_worker = run_json(&dir, &["ledger", "worker", "material", &worker]);
        let entries = by_worker.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["history"][0]["label"], "cutting room");
        let entry_id = entries[0]["id"].as_str().unwrap().to_string();

        let by_resource = run_json(&dir, &["ledger", "resource", "material", &pool]);
        assert_eq!(by_resource.as_array().unwrap().len(), 1);

        run_json(&dir, &["ledger", "note", "material", &entry_id, "lot 44"]);
        let entry = run_json(&dir, &["ledger", "show", "material", &entry_id]);
        assert_eq!(entry["note"], "lot 44");

        let worker_view = run_json(&dir, &["worker", "show", &worker]);
        assert_eq!(worker_view["currentMaterials"][pool.as_str()], 120);
        assert_eq!(worker_view["currentCustody"], serde_json::json!({}));
    }

    #[test]
    fn test_state_persists_across_invocations() {
        let dir = TempDir::new().unwrap();
        let pool = add_pool(&dir, "custody", "5", "0");
        let worker = add_worker(&dir, "0");
        run_json(&dir, &["assign", "custody", &pool, &worker, "5"]);

        let pools = run_json(&dir, &["pool", "list", "custody"]);
        assert_eq!(pools[0]["availableQuantity"], 0);
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;
    use std::fs;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        stockroom(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("history_cap = 100000"))
            .stdout(predicate::str::contains("[logging]"));
    }

    #[test]
    fn test_config_file_and_env_layering() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("stockroom.toml"),
            "[ledger]\nhistory_cap = 2\n\n[server]\nport = 9001\n",
        )
        .unwrap();

        stockroom(&dir)
            .env("STOCKROOM_PORT", "9002")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("history_cap = 2"))
            .stdout(predicate::str::contains("port = 9002"));
    }

    #[test]
    fn test_history_cap_from_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stockroom.toml"), "[ledger]\nhistory_cap = 2\n").unwrap();
        let pool = add_pool(&dir, "material", "10", "0");
        let worker = add_worker(&dir, "0");

        for _ in 0..3 {
            run_json(&dir, &["assign", "material", &pool, &worker, "1"]);
        }
        let entry = run_json(&dir, &["ledger", "pair", "material", &pool, &worker]);
        assert_eq!(entry["cumulativeQuantity"], 3);
        assert_eq!(entry["history"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stockroom.toml"), "[ledger]\nhistory_cap = 0\n").unwrap();
        stockroom(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("history_cap"));
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let dir = TempDir::new().unwrap();
        stockroom(&dir)
            .args(["--config", "absent.toml", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Config file not found"));
    }

    #[test]
    fn test_config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        stockroom(&dir)
            .args(["--config", "custom.toml", "config", "init"])
            .assert()
            .success();
        assert!(dir.path().join("custom.toml").exists());

        stockroom(&dir)
            .args(["--config", "custom.toml", "config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }
}
