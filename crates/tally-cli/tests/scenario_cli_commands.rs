use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

const CONFIG: &str = r#"
timezone: "America/Mexico_City"
directory:
  devices:
    - name: lobby
      address: "192.168.1.64"
      port: 80
      username: admin
      password_env: TALLY_TEST_LOBBY_PASSWORD
    - name: dead
      address: "127.0.0.1"
      port: 9
      username: admin
      password_env: TALLY_TEST_DEAD_PASSWORD
  employees:
    - name: Ana
      biometric_code: "1001"
      device: lobby
"#;

/// Writes the config into a scratch dir that also serves as the working
/// directory, so no stray `.env.local` gets picked up.
fn scratch() -> anyhow::Result<(tempfile::TempDir, String)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tally.yaml");
    fs::write(&path, CONFIG)?;
    Ok((dir, path.to_string_lossy().to_string()))
}

fn tally(dir: &tempfile::TempDir) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("tally")?;
    cmd.current_dir(dir.path()).env_remove("TALLY_DATABASE_URL");
    Ok(cmd)
}

#[test]
fn config_hash_prints_hash_and_canonical_json() -> anyhow::Result<()> {
    let (dir, cfg) = scratch()?;
    tally(&dir)?
        .args(["config-hash", &cfg])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("America/Mexico_City"));
    Ok(())
}

#[test]
fn replay_applies_a_saved_webhook_payload() -> anyhow::Result<()> {
    let (dir, cfg) = scratch()?;
    let payload = dir.path().join("event.json");
    // Leading BOM as written by some exporters.
    fs::write(
        &payload,
        "\u{feff}{\"ipAddress\":\"192.168.1.64\",\"dateTime\":\"2024-01-10T08:00:00-06:00\",\
         \"AccessControllerEvent\":{\"employeeNoString\":\"1001\",\"label\":\"Check In\"}}\n",
    )?;

    tally(&dir)?
        .args(["replay", "--config", &cfg, &payload.to_string_lossy()])
        .assert()
        .success()
        .stdout(predicate::str::contains("status=applied"))
        .stdout(predicate::str::contains("session_id="));
    Ok(())
}

#[test]
fn replay_of_unknown_device_fails() -> anyhow::Result<()> {
    let (dir, cfg) = scratch()?;
    let payload = dir.path().join("event.json");
    fs::write(
        &payload,
        r#"{"ipAddress":"10.9.9.9","dateTime":"2024-01-10T08:00:00-06:00","AccessControllerEvent":{"employeeNoString":"1001","label":"Check In"}}"#,
    )?;

    tally(&dir)?
        .args(["replay", "--config", &cfg, &payload.to_string_lossy()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("UNKNOWN_DEVICE"));
    Ok(())
}

#[test]
fn download_from_unconfigured_device_fails() -> anyhow::Result<()> {
    let (dir, cfg) = scratch()?;
    tally(&dir)?
        .args([
            "download",
            "--device",
            "nowhere",
            "--from",
            "2024-02-01T00:00:00Z",
            "--to",
            "2024-02-02T00:00:00Z",
            "--config",
            &cfg,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no configured device matches"));
    Ok(())
}

#[test]
fn download_with_inverted_range_fails() -> anyhow::Result<()> {
    let (dir, cfg) = scratch()?;
    tally(&dir)?
        .env("TALLY_TEST_DEAD_PASSWORD", "pw")
        .args([
            "download",
            "--device",
            "dead",
            "--from",
            "2024-02-02T00:00:00Z",
            "--to",
            "2024-02-01T00:00:00Z",
            "--config",
            &cfg,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_RANGE"));
    Ok(())
}

#[test]
fn download_from_unreachable_device_fails() -> anyhow::Result<()> {
    let (dir, cfg) = scratch()?;
    tally(&dir)?
        .env("TALLY_TEST_DEAD_PASSWORD", "pw")
        .args([
            "download",
            "--device",
            "127.0.0.1",
            "--from",
            "2024-02-01T00:00:00Z",
            "--to",
            "2024-02-02T00:00:00Z",
            "--config",
            &cfg,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DEVICE_UNREACHABLE"));
    Ok(())
}

/// DB-backed; skipped if TALLY_DATABASE_URL is not set.
#[test]
fn db_status_reports_sessions_table_after_migrate() -> anyhow::Result<()> {
    let url = match std::env::var("TALLY_DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TALLY_DATABASE_URL not set");
            return Ok(());
        }
    };
    let (dir, _) = scratch()?;

    let mut migrate = Command::cargo_bin("tally")?;
    migrate
        .current_dir(dir.path())
        .env("TALLY_DATABASE_URL", &url)
        .args(["db", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("migrations_applied=true"));

    let mut status = Command::cargo_bin("tally")?;
    status
        .current_dir(dir.path())
        .env("TALLY_DATABASE_URL", &url)
        .args(["db", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("has_sessions_table=true"));
    Ok(())
}
