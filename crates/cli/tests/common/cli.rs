//! CLI command execution helpers
//!
//! Wraps the `quiesce` binary with an isolated state directory, queue and
//! table per test, passed through `QUIESCE_*` environment variables.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Isolated working directory and settings for one test
pub struct TestEnv {
    dir: TempDir,
    env: HashMap<String, String>,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path();

        let mut env = HashMap::new();
        env.insert("QUIESCE_QUEUE".into(), root.join("queue").display().to_string());
        env.insert("QUIESCE_TABLE".into(), root.join("table").display().to_string());
        env.insert("QUIESCE_STATE_DIR".into(), root.join("state").display().to_string());
        env.insert("QUIESCE_DEBOUNCE_WINDOW_SECS".into(), "1".into());
        env.insert("QUIESCE_POLL_INTERVAL_SECS".into(), "1".into());
        env.insert("QUIESCE_RECEIVE_WAIT_SECS".into(), "1".into());

        Ok(Self { dir, env })
    }

    /// Settings without queue or table
    pub fn unconfigured() -> Result<Self> {
        let mut env = Self::new()?;
        env.env.remove("QUIESCE_QUEUE");
        env.env.remove("QUIESCE_TABLE");
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn command(&self, args: &[&str]) -> QuiesceCommand {
        QuiesceCommand {
            working_dir: self.dir.path().to_path_buf(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: self.env.clone(),
            stdin_data: None,
        }
    }

    /// Poll `check` until it holds or `timeout` passes
    pub fn wait_until(&self, what: &str, timeout: Duration, mut check: impl FnMut() -> bool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !check() {
            if Instant::now() >= deadline {
                anyhow::bail!("Timed out waiting for {}", what);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    }
}

/// One `quiesce` invocation
pub struct QuiesceCommand {
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    stdin_data: Option<String>,
}

impl QuiesceCommand {
    /// Provide stdin data
    pub fn stdin(&mut self, data: &str) -> &mut Self {
        self.stdin_data = Some(data.to_string());
        self
    }

    fn build(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_quiesce"));
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env);
        command
    }

    /// Start without waiting (daemon)
    pub fn spawn(&self) -> Result<Child> {
        self.build()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn quiesce")
    }

    pub fn execute(&self) -> Result<CommandResult> {
        let mut command = self.build();
        let output = match &self.stdin_data {
            Some(data) => {
                let mut child = command
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .context("Failed to spawn command")?;
                if let Some(mut stdin) = child.stdin.take() {
                    use std::io::Write;
                    stdin.write_all(data.as_bytes())?;
                }
                child.wait_with_output().context("Failed to wait for command")?
            }
            None => command.output().context("Failed to execute command")?,
        };

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }
        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}
