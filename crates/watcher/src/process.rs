//! Entity processing capability
//!
//! The scanner awaits `Processor::process` for every eligible entity and
//! only advances state when it returns `Ok`.

use async_trait::async_trait;
use quiesce_core::{EntityId, Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Per-entity business logic
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, entity: &EntityId) -> Result<()>;
}

/// Logs the entity and succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProcessor;

#[async_trait]
impl Processor for LogProcessor {
    async fn process(&self, entity: &EntityId) -> Result<()> {
        info!(entity = %entity, "Processing entity");
        Ok(())
    }
}

/// Runs an external program once per entity
///
/// The entity id is appended as the last argument and exported as
/// `QUIESCE_ENTITY_ID`. A non-zero exit or a timeout is a failure.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Split a whitespace-separated command line (no shell quoting)
    pub fn from_command_line(line: &str, timeout: Duration) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("process_command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect(), timeout))
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    async fn process(&self, entity: &EntityId) -> Result<()> {
        debug!(entity = %entity, program = %self.program, "Running process command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(entity.as_str())
            .env("QUIESCE_ENTITY_ID", entity.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::processing(entity.as_str(), format!("spawn {}: {}", self.program, e)))?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| Error::processing(entity.as_str(), e.to_string()))?,
            Err(_) => {
                return Err(Error::processing(
                    entity.as_str(),
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };

        if !status.success() {
            return Err(Error::processing(entity.as_str(), format!("exited with {}", status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_split() {
        let processor =
            CommandProcessor::from_command_line("/usr/bin/env refresh --fast", Duration::from_secs(1))
                .unwrap();
        assert_eq!(processor.program, "/usr/bin/env");
        assert_eq!(processor.args, vec!["refresh", "--fast"]);

        assert!(CommandProcessor::from_command_line("   ", Duration::from_secs(1)).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_exit_status_decides_outcome() {
        let entity = EntityId::new("abc").unwrap();

        let ok = CommandProcessor::new("true", Vec::new(), Duration::from_secs(5));
        assert!(ok.process(&entity).await.is_ok());

        let failing = CommandProcessor::new("false", Vec::new(), Duration::from_secs(5));
        assert!(matches!(
            failing.process(&entity).await,
            Err(Error::Processing { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_entity_id() {
        let entity = EntityId::new("abc").unwrap();
        let check = CommandProcessor::new(
            "sh",
            vec!["-c".into(), "test \"$1\" = abc && test \"$QUIESCE_ENTITY_ID\" = abc".into(), "sh".into()],
            Duration::from_secs(5),
        );
        assert!(check.process(&entity).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let entity = EntityId::new("abc").unwrap();
        let missing = CommandProcessor::new("/nonexistent/quiesce-hook", Vec::new(), Duration::from_secs(1));
        assert!(missing.process(&entity).await.is_err());
    }
}
