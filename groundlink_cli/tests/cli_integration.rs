use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Relay config; the relay is never contacted by these commands or in --sim
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[device]
dev_addr = "E6BD0B26"
app_skey = "F4AEB552D056C431BAAB9BF5B3CB3E8C"

[relay]
enabled = true
server_uri = "http://127.0.0.1:9"
transmitter_id = "sat"
receiver_id = "station"
request_timeout_ms = 200

[session]
# short cycles keep the session tests fast
cycle_ms = 50
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_plan(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("plan.csv");
    let mut f = fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["check-config"], 0, "config ok", "stdout")]
#[case(&["plan-setup"], 0, "CHANGE DELAY TO 16s CPY 48 to 48", "stdout")]
#[case(&["plan-setup", "--path", "push"], 0, "DATARATE TABLE CPY 30 to 40", "stdout")]
#[case(&["plan-setup", "--max-hex", "12"], 3, "cannot hold a single verified write", "stderr")]
#[case(&["encode"], 2, "required", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("groundlink").unwrap();
    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("error");
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn missing_config_exits_with_config_code() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("groundlink")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("check-config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(
        &path,
        "[device]\ndev_addr = \"E6BD0B26\"\napp_skey = \"F4AEB552D056C431BAAB9BF5B3CB3E8C\"\n",
    )
    .unwrap();
    Command::cargo_bin("groundlink")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("run")
        .arg("--sim")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no transmission path"));
}

#[test]
fn encode_prints_batches_with_frames() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let plan = write_plan(&dir, "label,address,data\nDELAY,48,03\n");

    Command::cargo_bin("groundlink")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["encode", "--frames", "--plan"])
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "DELAY CPY 48 to 48\t9100300390003001000F\texpect 03\t60E6BD0B260A00009100300390003001000F00",
        ));
}

#[test]
fn encode_reports_bad_plan_header() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let plan = write_plan(&dir, "name,address,data\nDELAY,48,03\n");

    Command::cargo_bin("groundlink")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("encode")
        .arg("--plan")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[test]
fn sim_session_quits_on_operator_q() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    assert_cmd::Command::cargo_bin("groundlink")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["--log-level", "error", "run", "--sim"])
        .write_stdin("q\n")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("session ended"));
}
