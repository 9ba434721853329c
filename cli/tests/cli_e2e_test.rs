use assert_cmd::{Command, cargo_bin_cmd};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn gatewayctl() -> Command {
    let mut cmd = cargo_bin_cmd!("gatewayctl");
    for var in [
        "GATEWAY_CONFIG_PATH",
        "GATEWAY_APP_DIR",
        "GATEWAY_STORE_PATH",
        "GATEWAY_LOG_LEVEL",
        "GATEWAY_ENCRYPTION_KEY",
        "RUST_LOG",
        "OPENAI_API_KEY"
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

fn write_config(dir: &Path, document: &serde_json::Value) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(document).unwrap()).unwrap();
    path
}

fn openai_config() -> serde_json::Value {
    serde_json::json!({
        "$schema": "gateway-config/v1",
        "encryption_key": "env.STORE_KEY",
        "providers": {
            "openai": {
                "keys": [{ "id": "k1", "name": "primary", "value": "env.OPENAI_API_KEY" }]
            }
        }
    })
}

mod help_and_version {
    use super::*;

    #[test]
    fn test_help_flag() {
        gatewayctl()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage:"))
            .stdout(predicate::str::contains("check"))
            .stdout(predicate::str::contains("load"));
    }

    #[test]
    fn test_version_flag() {
        gatewayctl()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gatewayctl"));
    }

    #[test]
    fn test_no_args_shows_help() {
        gatewayctl()
            .assert()
            .failure()
            .stderr(predicate::str::contains("Usage:"));
    }

    #[test]
    fn test_completion_bash() {
        gatewayctl()
            .args(["completion", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gatewayctl"));
    }
}

mod check_subcommand {
    use super::*;

    #[test]
    fn test_check_passes_with_env_set() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &openai_config());

        gatewayctl()
            .arg("check")
            .arg(&path)
            .env("OPENAI_API_KEY", "sk-test-0000000000")
            .env("STORE_KEY", "passphrase")
            .assert()
            .success()
            .stdout(predicate::str::contains("OPENAI_API_KEY"))
            .stdout(predicate::str::contains("sk-test-0000000000").not());
    }

    #[test]
    fn test_check_fails_on_unset_required_env() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &openai_config());

        gatewayctl()
            .args(["check", "--json"])
            .arg(&path)
            .env("STORE_KEY", "passphrase")
            .assert()
            .failure()
            .stdout(predicate::str::contains("\"success\": false"))
            .stdout(predicate::str::contains("providers.openai.keys[0].value"));
    }

    #[test]
    fn test_check_strict_fails_on_warnings() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &openai_config());

        // STORE_KEY unset: the encryption key reference is only a warning.
        gatewayctl()
            .arg("check")
            .arg(&path)
            .env("OPENAI_API_KEY", "sk-test-0000000000")
            .assert()
            .success();

        gatewayctl()
            .args(["check", "--strict"])
            .arg(&path)
            .env("OPENAI_API_KEY", "sk-test-0000000000")
            .assert()
            .failure()
            .stderr(predicate::str::contains("strict mode"));
    }

    #[test]
    fn test_check_finds_default_config_in_app_dir() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), &openai_config());

        gatewayctl()
            .args(["check", "--app-dir"])
            .arg(dir.path())
            .env("OPENAI_API_KEY", "sk-test-0000000000")
            .env("STORE_KEY", "passphrase")
            .assert()
            .success();
    }

    #[test]
    fn test_check_without_config_explains() {
        let dir = TempDir::new().unwrap();

        gatewayctl()
            .args(["check", "--app-dir"])
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("No config file found"))
            .stderr(predicate::str::contains("How to fix:"));
    }

    #[test]
    fn test_check_reports_syntax_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"providers\": ").unwrap();

        gatewayctl()
            .arg("check")
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid config document"));
    }
}

mod load_subcommand {
    use super::*;

    #[test]
    fn test_load_prints_report() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &openai_config());

        gatewayctl()
            .arg("load")
            .arg(&path)
            .env("OPENAI_API_KEY", "sk-test-0000000000")
            .assert()
            .success()
            .stdout(predicate::str::contains("providers: 1 created"))
            .stdout(predicate::str::contains("openai"));
    }

    #[test]
    fn test_second_load_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &openai_config());
        let store = dir.path().join("store.json");

        for expected in ["providers: 1 created", "providers: 0 created, 0 updated, 0 deleted, 1 unchanged"] {
            gatewayctl()
                .arg("load")
                .arg(&path)
                .arg("--store")
                .arg(&store)
                .env("OPENAI_API_KEY", "sk-test-0000000000")
                .env("STORE_KEY", "correct-horse-battery-staple")
                .assert()
                .success()
                .stdout(predicate::str::contains(expected));
        }
        let snapshot = std::fs::read_to_string(&store).unwrap();
        assert!(!snapshot.contains("env.OPENAI_API_KEY"));
    }

    #[test]
    fn test_load_json_redacts_secrets() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            dir.path(),
            &serde_json::json!({
                "providers": {
                    "openai": {
                        "keys": [{ "id": "k1", "name": "inline", "value": "sk-literal-0123456789abcdef" }]
                    }
                }
            })
        );

        let output = gatewayctl()
            .args(["load", "--json"])
            .arg(&path)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(report["success"], true);
        assert_eq!(report["store"], "memory");
        let shown = report["providers"]["openai"]["keys"][0]["value"].as_str().unwrap();
        assert_ne!(shown, "sk-literal-0123456789abcdef");
        assert!(!String::from_utf8_lossy(&output).contains("sk-literal-0123456789abcdef"));
    }

    #[test]
    fn test_load_unsupported_store_explains() {
        let dir = TempDir::new().unwrap();
        let mut document = openai_config();
        document["config_store"] = serde_json::json!({ "enabled": true, "type": "postgres" });
        let path = write_config(dir.path(), &document);

        gatewayctl()
            .arg("load")
            .arg(&path)
            .env("OPENAI_API_KEY", "sk-test-0000000000")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cannot open the postgres config store"));
    }
}
