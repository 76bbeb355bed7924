//! Commands that work without a running daemon

use crate::common::TestEnv;
use anyhow::Result;

#[test]
fn test_config_reports_effective_values() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.set("QUIESCE_DISPOSITION", "continuous");

    let result = env.command(&["config"]).assert_success()?;
    assert!(result.contains_stdout("(1s)"));
    assert!(result.contains_stdout("Continuous"));
    assert!(result.contains_stdout("Configuration is valid"));
    Ok(())
}

#[test]
fn test_config_file_is_read() -> Result<()> {
    let env = TestEnv::unconfigured()?;
    let file = env.path().join("custom.toml");
    std::fs::write(
        &file,
        format!(
            "queue = \"{}\"\ntable = \"{}\"\ncontinuous_interval_secs = 600\n",
            env.path().join("q").display(),
            env.path().join("t").display()
        ),
    )?;

    let file_arg = file.display().to_string();
    let result = env.command(&["--config", &file_arg, "config"]).assert_success()?;
    assert!(result.contains_stdout("(10 min)"));
    assert!(result.contains_stdout("Configuration is valid"));
    Ok(())
}

#[test]
fn test_run_requires_queue_and_table() -> Result<()> {
    let env = TestEnv::unconfigured()?;

    let result = env.command(&["config"]).assert_success()?;
    assert!(result.contains_stdout("queue is not set"));

    let result = env.command(&["run"]).assert_failure()?;
    assert!(result.contains_stderr("queue is not set"));
    Ok(())
}

#[test]
fn test_status_and_enqueue_without_daemon() -> Result<()> {
    let env = TestEnv::new()?;

    let result = env.command(&["status"]).assert_success()?;
    assert!(result.contains_stdout("Not running"));

    let result = env.command(&["enqueue", r#"{"Id":"abc"}"#]).assert_failure()?;
    assert!(result.contains_stderr("Daemon is not running"));

    let result = env.command(&["stop"]).assert_success()?;
    assert!(result.contains_stdout("not running"));
    Ok(())
}

#[test]
fn test_offline_scan_of_empty_table() -> Result<()> {
    let env = TestEnv::new()?;

    let result = env.command(&["scan", "--dry-run"]).assert_success()?;
    assert!(result.contains_stdout("Nothing eligible"));

    let result = env.command(&["scan"]).assert_success()?;
    assert!(result.contains_stdout("Scan complete"));

    let result = env.command(&["entities"]).assert_success()?;
    assert!(result.contains_stdout("No tracked entities"));
    Ok(())
}

#[test]
fn test_forget_and_metrics_without_daemon() -> Result<()> {
    let env = TestEnv::new()?;

    let result = env.command(&["forget", "abc"]).assert_success()?;
    assert!(result.contains_stdout("Forgot abc"));

    let result = env.command(&["forget", "  "]).assert_failure()?;
    assert!(result.contains_stderr("entity"));

    let result = env.command(&["metrics"]).assert_failure()?;
    assert!(result.contains_stderr("Daemon is not running"));
    Ok(())
}
