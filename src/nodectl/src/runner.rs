//! Everything that touches the node's filesystem or service manager does so through a shell
//! script. The updater runs them locally; the operator cli runs the same scripts over ssh.

use async_trait::async_trait;
use std::path::PathBuf;

/// ssh reserves this exit status for its own failures (connection refused, auth, ...).
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// A failed script run. Callers treat both variants as "retry later"; the split only exists so the
/// log can say whether the host was unreachable or the script itself failed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
  /// The script never ran: the process could not be spawned or the remote host was unreachable.
  #[error("unable to reach '{target}' - {reason}")]
  Transport {
    /// Where the script was meant to run.
    target: String,
    /// What went wrong.
    reason: String,
  },

  /// The script ran and exited unsuccessfully.
  #[error("script on '{target}' exited with {status:?} - {stderr}")]
  Exit {
    /// Where the script ran.
    target: String,
    /// The exit status; `None` if killed by a signal.
    status: Option<i32>,
    /// Whatever the script wrote to stderr.
    stderr: String,
  },
}

/// Runs a shell script to completion somewhere.
#[async_trait]
pub trait Runner: Send + Sync {
  /// A human readable name for where scripts run.
  fn target(&self) -> String;

  /// Runs `script`, succeeding only if it exits with status zero.
  async fn run(&self, script: &str) -> Result<(), RunError>;
}

/// Runs scripts on this machine with `bash -c`.
#[derive(Debug, Default, Clone)]
pub struct LocalRunner;

#[async_trait]
impl Runner for LocalRunner {
  fn target(&self) -> String {
    "localhost".to_string()
  }

  async fn run(&self, script: &str) -> Result<(), RunError> {
    log::debug!("running locally: {script}");

    let output = async_std::process::Command::new("bash")
      .arg("-c")
      .arg(script)
      .output()
      .await
      .map_err(|error| RunError::Transport {
        target: self.target(),
        reason: format!("unable to spawn bash - {error}"),
      })?;

    if output.status.success() {
      return Ok(());
    }

    Err(RunError::Exit {
      target: self.target(),
      status: output.status.code(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
  }
}

/// Runs scripts on a remote host through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshRunner {
  /// The host (ip) to connect to.
  host: String,
  /// The user to connect as.
  user: String,
  /// The private key to authenticate with.
  key: PathBuf,
}

impl SshRunner {
  /// Creates a runner for `user@host` authenticating with `key`.
  pub fn new<H, U, K>(host: H, user: U, key: K) -> Self
  where
    H: Into<String>,
    U: Into<String>,
    K: Into<PathBuf>,
  {
    Self {
      host: host.into(),
      user: user.into(),
      key: key.into(),
    }
  }
}

#[async_trait]
impl Runner for SshRunner {
  fn target(&self) -> String {
    format!("{}@{}", self.user, self.host)
  }

  async fn run(&self, script: &str) -> Result<(), RunError> {
    log::debug!("running on {}: {script}", self.target());

    let output = async_std::process::Command::new("ssh")
      .arg("-i")
      .arg(&self.key)
      .arg("-o")
      .arg("StrictHostKeyChecking=no")
      .arg("-o")
      .arg("BatchMode=yes")
      .arg(self.target())
      .arg(script)
      .output()
      .await
      .map_err(|error| RunError::Transport {
        target: self.target(),
        reason: format!("unable to spawn ssh - {error}"),
      })?;

    if output.status.success() {
      return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    match output.status.code() {
      Some(SSH_TRANSPORT_FAILURE) => Err(RunError::Transport {
        target: self.target(),
        reason: stderr,
      }),
      status => Err(RunError::Exit {
        target: self.target(),
        status,
        stderr,
      }),
    }
  }
}

/// Quotes `input` as a single shell word.
pub fn shell_quote(input: &str) -> String {
  format!("'{}'", input.replace('\'', r"'\''"))
}
