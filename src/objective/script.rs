//! Executing one rendered script as a `bash` process.

use core::time::Duration;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Instant;

use chrono::Utc;

use crate::error::Result;
use crate::template::RunConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The phase a script belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Runs before the command.
    Setup,
    /// The measured command.
    Command,
    /// Runs after the command.
    Finish,
}

impl Stage {
    /// Lowercase label used in file names and failure messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Command => "command",
            Stage::Finish => "finish",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one script execution produced.
#[derive(Clone, Debug)]
pub struct ScriptOutput {
    /// Exit code; `-1` when the process was killed by a signal or timed out.
    pub returncode: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
    /// Set when the timeout elapsed and the process was killed.
    pub timed_out: bool,
    /// Audit copy of the executed script.
    pub script_path: PathBuf,
}

impl ScriptOutput {
    fn timeout(elapsed: Duration, script_path: PathBuf) -> Self {
        Self {
            returncode: super::TIMEOUT_RETURNCODE,
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
            timed_out: true,
            script_path,
        }
    }

    /// Standard output followed by standard error.
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}{}", self.stdout, self.stderr)
        }
    }
}

/// Writes scripts to the run's scripts directory and executes them.
///
/// Each script is saved as `<stage>_<tool>_<timestamp>.sh` before it runs, so
/// the directory doubles as an audit log of every executed trial.
#[derive(Clone, Debug)]
pub struct ScriptRunner {
    shell: String,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

impl ScriptRunner {
    /// Creates a runner that uses `bash`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `shell` instead of `bash` to interpret scripts.
    #[must_use]
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Saves `body` and runs it, killing it once `timeout` elapses.
    ///
    /// The script runs in its own process group. Whatever it leaves running
    /// in that group is killed when it exits. Output is read until the
    /// deadline too, so a descendant that escaped the group and still holds
    /// a pipe turns the run into a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the script cannot be saved
    /// or the shell cannot be spawned.
    pub fn run(
        &self,
        stage: Stage,
        body: &str,
        run: &RunConfig,
        timeout: Option<Duration>,
    ) -> Result<ScriptOutput> {
        let script_path = self.save(stage, body, run)?;

        let mut command = Command::new(&self.shell);
        command
            .arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let start = Instant::now();
        let mut child = command.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        tracing::debug!(%stage, script = %script_path.display(), pid = child.id(), "script started");

        let deadline = timeout.map(|t| start + t);
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };
        let elapsed = start.elapsed();

        let Some(status) = status else {
            terminate(&mut child);
            tracing::warn!(%stage, elapsed_secs = elapsed.as_secs_f64(), "script timed out");
            // Orphaned descendants may still hold the pipes, so the readers are not joined.
            return Ok(ScriptOutput::timeout(elapsed, script_path));
        };

        kill_group(child.id());
        let (Some(stdout), Some(stderr)) = (
            collect(stdout.as_ref(), deadline),
            collect(stderr.as_ref(), deadline),
        ) else {
            let elapsed = start.elapsed();
            tracing::warn!(%stage, elapsed_secs = elapsed.as_secs_f64(), "script output still open at timeout");
            return Ok(ScriptOutput::timeout(elapsed, script_path));
        };

        let returncode = status.code().unwrap_or(-1);
        tracing::debug!(%stage, returncode, elapsed_secs = elapsed.as_secs_f64(), "script finished");
        Ok(ScriptOutput {
            returncode,
            stdout,
            stderr,
            elapsed,
            timed_out: false,
            script_path,
        })
    }

    fn save(&self, stage: Stage, body: &str, run: &RunConfig) -> Result<PathBuf> {
        fs::create_dir_all(&run.scripts_dir)?;
        let path = script_path(&run.scripts_dir, stage, &run.experiment.tool_name);
        fs::write(&path, body)?;
        Ok(path)
    }
}

fn script_path(dir: &Path, stage: Stage, tool_name: &str) -> PathBuf {
    let tool: String = tool_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let stamp = Utc::now().format("%Y%m%d-%H%M%S%.6f");
    dir.join(format!("{stage}_{tool}_{stamp}.sh"))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// Waits for a pipe reader; `None` if it is still blocked at `deadline`.
fn collect(reader: Option<&Receiver<String>>, deadline: Option<Instant>) -> Option<String> {
    let Some(reader) = reader else {
        return Some(String::new());
    };
    let received = match deadline {
        Some(d) => reader.recv_timeout(d.saturating_duration_since(Instant::now())),
        None => reader.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };
    match received {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

/// Sends `SIGKILL` to the process group led by `pid`.
fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        let group = format!("-{pid}");
        let _ = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kills the child's whole process group, then the child itself.
fn terminate(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}
