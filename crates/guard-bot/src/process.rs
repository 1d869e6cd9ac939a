//! Trading terminal lifecycle.

use crate::config::TerminalConfig;
use crate::error::{AppError, AppResult};
use std::path::PathBuf;
use std::process::{Child, Command};
use tracing::{info, warn};

/// Start, check and stop the trading terminal.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessController: Send {
    fn launch(&mut self) -> AppResult<()>;
    fn is_running(&mut self) -> bool;
    fn kill(&mut self) -> AppResult<()>;
}

/// The terminal as a child process of the controller.
#[derive(Debug)]
pub struct TerminalProcess {
    executable: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

impl TerminalProcess {
    pub fn new(executable: PathBuf, args: Vec<String>) -> Self {
        Self {
            executable,
            args,
            child: None,
        }
    }

    /// `None` when no executable is configured.
    pub fn from_config(config: &TerminalConfig) -> Option<Self> {
        config
            .executable
            .clone()
            .map(|exe| Self::new(exe, config.args.clone()))
    }
}

impl ProcessController for TerminalProcess {
    fn launch(&mut self) -> AppResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let child = Command::new(&self.executable)
            .args(&self.args)
            .spawn()
            .map_err(|e| {
                AppError::Process(format!("Failed to launch {}: {e}", self.executable.display()))
            })?;
        info!(pid = child.id(), exe = %self.executable.display(), "Terminal launched");
        self.child = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!(?status, "Terminal exited");
                self.child = None;
                false
            }
            Err(e) => {
                warn!(?e, "Failed to poll terminal process");
                true
            }
        }
    }

    fn kill(&mut self) -> AppResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let pid = child.id();
        if let Err(e) = child.kill() {
            // Already exited between the last poll and now.
            warn!(?e, pid, "Kill failed");
        }
        child
            .wait()
            .map_err(|e| AppError::Process(format!("Failed to reap terminal {pid}: {e}")))?;
        info!(pid, "Terminal stopped");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_launch_check_kill() {
        let mut terminal = TerminalProcess::new(PathBuf::from("sleep"), vec!["30".to_string()]);
        assert!(!terminal.is_running());
        terminal.launch().unwrap();
        assert!(terminal.is_running());
        terminal.kill().unwrap();
        assert!(!terminal.is_running());
        terminal.kill().unwrap();
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let mut terminal = TerminalProcess::new(PathBuf::from("/nonexistent/terminal"), vec![]);
        assert!(matches!(terminal.launch(), Err(AppError::Process(_))));
    }
}
