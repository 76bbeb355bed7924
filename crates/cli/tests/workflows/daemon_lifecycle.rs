//! Start, feed, observe and stop a real daemon

use crate::common::TestEnv;
use anyhow::Result;
use std::process::Child;
use std::time::Duration;

const STARTUP: Duration = Duration::from_secs(20);

/// Kills the daemon if a test bails before stopping it
struct Daemon(Child);

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn start(env: &TestEnv) -> Result<Daemon> {
    let log = env.path().join("daemon.log").display().to_string();
    let daemon = Daemon(env.command(&["run", "--log-file", &log]).spawn()?);
    env.wait_until("daemon startup", STARTUP, || {
        env.command(&["status"])
            .execute()
            .map(|r| r.contains_stdout("Running"))
            .unwrap_or(false)
    })?;
    Ok(daemon)
}

fn stop(env: &TestEnv, mut daemon: Daemon) -> Result<()> {
    env.command(&["stop"]).assert_success()?;
    let status = daemon.0.wait()?;
    assert!(status.success(), "daemon exited with {}", status);
    Ok(())
}

#[test]
fn test_burst_is_processed_once_and_drained() -> Result<()> {
    let mut env = TestEnv::new()?;
    // `touch <entity>` in the working directory marks each processed entity
    env.set("QUIESCE_PROCESS_COMMAND", "touch");
    let daemon = start(&env)?;

    for _ in 0..3 {
        env.command(&["enqueue", r#"{"Id":"abc"}"#]).assert_success()?;
    }
    env.command(&["enqueue", "--stdin"])
        .stdin("{\"Id\":\"def\"}\n\nnot json\n")
        .assert_success()?;

    let abc = env.path().join("abc");
    let def = env.path().join("def");
    env.wait_until("processing", STARTUP, || abc.exists() && def.exists())?;

    stop(&env, daemon)?;

    let result = env.command(&["entities"]).assert_success()?;
    assert!(result.contains_stdout("No tracked entities"));

    let log = std::fs::read_to_string(env.path().join("daemon.log"))?;
    assert!(log.contains("Discarding malformed message"));
    Ok(())
}

#[test]
fn test_continuous_records_are_retained() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.set("QUIESCE_DISPOSITION", "continuous")
        .set("QUIESCE_PROCESS_COMMAND", "touch");
    let daemon = start(&env)?;

    env.command(&["enqueue", r#"{"Id":"xyz"}"#]).assert_success()?;
    let xyz = env.path().join("xyz");
    env.wait_until("processing", STARTUP, || xyz.exists())?;

    let result = env.command(&["entities"]).assert_success()?;
    assert!(result.contains_stdout("xyz"));

    stop(&env, daemon)?;
    Ok(())
}

#[test]
fn test_second_scanner_is_refused() -> Result<()> {
    let env = TestEnv::new()?;
    let daemon = start(&env)?;

    let result = env.command(&["scan"]).assert_failure()?;
    assert!(result.contains_stderr("Scanner already running"));

    let result = env.command(&["run", "--role", "ingest"]).assert_failure()?;
    assert!(result.contains_stderr("Daemon already running"));

    stop(&env, daemon)?;
    Ok(())
}
