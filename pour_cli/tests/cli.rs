use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Simulated bus with fast polling so a whole pour takes well under a second.
const CONFIG: &str = r#"
[bus]
simulate = true
op_timeout_ms = 500

[pour]
poll_ms = 10
tare_settle_ms = 0
ingredient_settle_ms = 0

[telemetry]
weight_feed_ms = 0
status_feed_ms = 0

[pumps]
vodka = 1
lime_juice = 2
ginger_beer = 3

[[recipes]]
id = "moscow_mule"
ingredients = [["vodka", 45.0], ["lime_juice", 10.0], ["ginger_beer", 90.0]]

[[recipes]]
id = "gimlet"
ingredients = [["gin", 50.0], ["lime_juice", 15.0]]

[[recipes]]
id = "buck"
ingredients = [["vodka", 20.0]]
post_add = "ginger_ale"
"#;

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("pour.toml");
    fs::write(&path, CONFIG).unwrap();
    path
}

fn pour(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("pour").unwrap();
    cmd.env("POUR_SIM_FLOW_G_PER_S", "400")
        .env_remove("POUR_SIM_OFFLINE")
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(cfg);
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("pour")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("self-check")));
}

#[rstest]
#[case(&["serve", "moscow_mule"], 0, "moscow_mule complete")]
#[case(&["serve", "buck", "--yes"], 0, "buck complete (with ginger_ale)")]
#[case(&["stop"], 0, "all pumps off")]
#[case(&["self-check"], 0, "self-check ok (simulated bus)")]
#[case(&["pump", "4", "--ms", "20"], 0, "pump 4 ran 20 ms")]
#[case(&["stop-pump", "2"], 0, "pump 2 off")]
#[case(&["start-pump", "5", "--secs", "0"], 0, "pump 5 off")]
#[case(&["weight"], 0, " g")]
fn commands_succeed_on_simulated_bus(
    #[case] args: &[&str],
    #[case] code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    pour(&cfg)
        .args(args)
        .assert()
        .code(code)
        .stdout(predicate::str::contains(needle));
}

#[rstest]
#[case(&["serve", "zombie"], 1, "no recipe called zombie")]
#[case(&["serve", "gimlet"], 6, "No pump is mapped to gin")]
#[case(&["pump", "9"], 1, "Pump 9 does not exist")]
fn failures_carry_exit_codes_and_hints(
    #[case] args: &[&str],
    #[case] code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    pour(&cfg)
        .args(args)
        .assert()
        .code(code)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn status_json_reports_ready_machine() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = pour(&cfg).args(["--json", "status"]).output().unwrap();
    assert!(out.status.success());
    let line = String::from_utf8(out.stdout).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v["aggregate"], "ready");
    assert_eq!(v["relayConnected"], true);
    assert_eq!(v["busMode"], "simulated");
    assert_eq!(v["totalPumps"], 8);
}

#[test]
fn status_reports_partial_when_scale_is_missing() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    pour(&cfg)
        .env("POUR_SIM_OFFLINE", "scale")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("status:  partial"));
}

#[test]
fn serve_json_streams_progress_then_outcome() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = pour(&cfg)
        .args(["--json", "serve", "moscow_mule"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(
        lines
            .iter()
            .any(|v| v["type"] == "progress" && v["data"]["currentIngredient"] == "vodka")
    );
    let progress: Vec<&serde_json::Value> =
        lines.iter().filter(|v| v["type"] == "progress").collect();
    let final_progress = progress.last().unwrap();
    assert_eq!(final_progress["data"]["isComplete"], true);
    assert_eq!(final_progress["data"]["isServing"], true);
    let last = lines.last().unwrap();
    assert_eq!(last["recipe"], "moscow_mule");
    assert_eq!(last["complete"], true);
}

#[test]
fn unknown_recipe_json_error() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = pour(&cfg)
        .args(["--json", "serve", "zombie"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let last = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["reason"], "UnknownRecipe");
}

#[test]
fn recipes_mark_unavailable_ones() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    pour(&cfg)
        .arg("recipes")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("moscow_mule: vodka 45 ml")
                .and(predicate::str::contains("gimlet (unavailable)"))
                .and(predicate::str::contains("+ ginger_ale by hand")),
        );
}

#[test]
fn pumps_csv_with_bad_header_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let csv = dir.path().join("pumps.csv");
    fs::write(&csv, "name,slot\nvodka,1\n").unwrap();
    pour(&cfg)
        .arg("--pumps-csv")
        .arg(&csv)
        .arg("recipes")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Expected 'ingredient,pump'"));
}

#[test]
fn pumps_csv_replaces_config_map() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let csv = dir.path().join("pumps.csv");
    fs::write(&csv, "ingredient,pump\ngin,4\nlime_juice,2\n").unwrap();
    pour(&cfg)
        .arg("--pumps-csv")
        .arg(&csv)
        .arg("recipes")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("gimlet: gin 50 ml")
                .and(predicate::str::contains("moscow_mule (unavailable)")),
        );
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    pour(&missing)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not load the configuration"));
}
