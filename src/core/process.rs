use crate::core::cancel::CancellationToken;
use crate::types::{DtmError, DtmResult};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// External program invocation with an explicit argument vector (no shell)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

/// How an external program terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    Success,
    /// Non-zero exit code; -1 when the process was killed by a signal
    Failed(i32),
}

impl ToolCommand {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Run to completion with stdout/stderr discarded.
    ///
    /// The child gets its own process group so a terminal interrupt reaches
    /// only this process; cancellation is relayed through `cancel`, which
    /// kills the child and yields [`DtmError::Cancelled`].
    pub fn run(&self, cancel: &CancellationToken) -> DtmResult<ToolExit> {
        if cancel.is_cancelled() {
            return Err(DtmError::Cancelled);
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| {
            DtmError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to launch {}: {}", self.program.display(), e),
            ))
        })?;

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(if status.success() {
                    ToolExit::Success
                } else {
                    ToolExit::Failed(status.code().unwrap_or(-1))
                });
            }
            if cancel.is_cancelled() {
                log::warn!("Terminating {} (pid {})", self.program.display(), child.id());
                child.kill()?;
                child.wait()?;
                return Err(DtmError::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
