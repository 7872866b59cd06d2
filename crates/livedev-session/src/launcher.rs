//! Default browser launcher

use std::io;
use std::process::Command;
use std::thread::JoinHandle;

use crate::host::Launcher;
use crate::Result;

/// Opens URLs with the platform's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, url: &str) -> Result<()> {
        let command = if cfg!(target_os = "macos") {
            let mut command = Command::new("open");
            command.arg(url);
            command
        } else if cfg!(target_os = "windows") {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", "", url]);
            command
        } else {
            let mut command = Command::new("xdg-open");
            command.arg(url);
            command
        };

        match spawn_reaped(command) {
            Ok(_) => {
                tracing::info!(url, "Opened browser");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to open browser");
                Err(e.into())
            }
        }
    }
}

/// Spawn `command` and wait for it on a background thread so the exited
/// opener does not linger as a zombie. Returns the child's pid.
fn spawn_reaped(mut command: Command) -> io::Result<(u32, JoinHandle<()>)> {
    let mut child = command.spawn()?;
    let pid = child.id();
    let reaper = std::thread::spawn(move || match child.wait() {
        Ok(status) => tracing::debug!(pid, status = %status, "Browser opener exited"),
        Err(e) => tracing::debug!(pid, error = %e, "Failed to wait for browser opener"),
    });
    Ok((pid, reaper))
}
