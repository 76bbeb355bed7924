//! Run the daemon in the foreground

use anyhow::Result;
use quiesce_core::Settings;
use watcher::Roles;

pub async fn run(settings: Settings, roles: Roles) -> Result<()> {
    crate::daemon::run(settings, roles).await
}
