//! Remediation is what an update loop does once it has decided the node is out of date. Each kind
//! is a separate [`Remediator`] so the loops can be exercised against fakes. The script builders
//! are shared with the operator cli, which runs the same steps over ssh.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::options::{Network, NodeOptions, OptionsError};
use crate::resolver::{object_key, object_url, release_download_url};
use crate::runner::{shell_quote, RunError, Runner};
use crate::version::ReleaseTag;

/// Why a remediation did not take effect.
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
  /// The remediation script failed.
  #[error(transparent)]
  Run(#[from] RunError),

  /// The new config could not be written.
  #[error(transparent)]
  Options(#[from] OptionsError),

  /// A snapshot name that cannot be used safely in a path.
  #[error("invalid snapshot name '{0}'")]
  InvalidSnapshot(String),
}

/// Applies one kind of update to the node.
#[async_trait]
pub trait Remediator<T>: Send + Sync
where
  T: ?Sized + Sync,
{
  /// Brings the node to `target`. Must be safe to repeat.
  async fn apply(&self, target: &T) -> Result<(), RemediationError>;
}

/// The darknode home directory, as seen by the shell that runs a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptHome {
  /// `~/.darknode` of whichever user runs the script. This is what the operator cli uses over ssh,
  /// where the remote user's home is not known up front.
  Default,

  /// An explicit directory on the machine running the script.
  At(PathBuf),
}

impl ScriptHome {
  /// The directory as a shell word, safe to append `/<name>` to.
  fn shell(&self) -> String {
    match self {
      ScriptHome::Default => format!("\"$HOME\"/{}", crate::constants::HOME_DIRECTORY),
      ScriptHome::At(path) => shell_quote(&path.to_string_lossy()),
    }
  }
}

/// Downloads a release binary next to the installed one and renames it into place.
pub fn install_binary_script(home: &ScriptHome, tag: &ReleaseTag) -> String {
  let bin = format!("{}/bin", home.shell());
  format!(
    "mkdir -p {bin} && \
curl -sSfL {} -o {bin}/darknode-new && \
chmod +x {bin}/darknode-new && \
mv {bin}/darknode-new {bin}/darknode",
    shell_quote(&release_download_url(tag))
  )
}

/// Replaces the node's chain state with a snapshot. The existing database is moved to
/// `db-bak-<backup>` rather than deleted.
pub fn restore_snapshot_script(
  home: &ScriptHome,
  network: Network,
  snapshot: Option<&str>,
  backup: &str,
) -> Result<String, RemediationError> {
  let name = snapshot.unwrap_or(crate::constants::SNAPSHOT_OBJECT);

  let safe = |value: &str| {
    !value.is_empty()
      && !value.starts_with('.')
      && value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
  };

  if !safe(name) {
    return Err(RemediationError::InvalidSnapshot(name.to_string()));
  }

  if !safe(backup) {
    return Err(RemediationError::InvalidSnapshot(backup.to_string()));
  }

  let url = object_url(&object_key(network, name));

  Ok(format!(
    "cd {} && \
rm -rf chain.wal genesis.json && \
if [ -d db ]; then mv db db-bak-{backup}; fi && \
curl -sSfL {} -o {name} && \
tar xzf {name} && \
rm {name}",
    home.shell(),
    shell_quote(&url)
  ))
}

/// Overwrites the node's `config.json` with `options`.
pub fn write_config_script(home: &ScriptHome, options: &NodeOptions) -> Result<String, RemediationError> {
  let contents = options.to_pretty_json()?;
  Ok(format!(
    "printf '%s' {} > {}/config.json",
    shell_quote(&contents),
    home.shell()
  ))
}

/// Sets `key=value` in the node's `.env`, keeping every other line. Used by the operator cli so a
/// running updater sees what was installed behind its back.
pub fn record_marker_script(home: &ScriptHome, key: &str, value: &str) -> String {
  format!(
    "cd {} && \
touch .env && \
{{ grep -v {} .env || true; }} > .env.new && \
printf '%s\\n' {} >> .env.new && \
mv .env.new .env",
    home.shell(),
    shell_quote(&format!("^{key}=")),
    shell_quote(&format!("{key}={value}"))
  )
}

/// Installs release binaries through a runner.
pub struct BinaryInstall {
  /// Where the install script runs.
  runner: Arc<dyn Runner>,
  /// The darknode home on that machine.
  home: ScriptHome,
}

impl BinaryInstall {
  /// Creates the remediator.
  pub fn new(runner: Arc<dyn Runner>, home: ScriptHome) -> Self {
    Self { runner, home }
  }
}

#[async_trait]
impl Remediator<ReleaseTag> for BinaryInstall {
  async fn apply(&self, target: &ReleaseTag) -> Result<(), RemediationError> {
    log::info!("installing darknode {target} on {}", self.runner.target());
    self.runner.run(&install_binary_script(&self.home, target)).await?;
    Ok(())
  }
}

/// Writes merged options straight to the local config file.
pub struct ConfigWrite {
  /// The darknode's `config.json`.
  path: PathBuf,
}

impl ConfigWrite {
  /// Creates the remediator for the config at `path`.
  pub fn new<P>(path: P) -> Self
  where
    P: Into<PathBuf>,
  {
    Self { path: path.into() }
  }
}

#[async_trait]
impl Remediator<NodeOptions> for ConfigWrite {
  async fn apply(&self, target: &NodeOptions) -> Result<(), RemediationError> {
    log::info!("writing updated node options to {:?}", self.path);
    target.write(&self.path).await?;
    Ok(())
  }
}

/// Restores the latest published snapshot through a runner. The target is the snapshot's version
/// id, used only for reporting.
pub struct SnapshotRestore {
  /// Where the restore script runs.
  runner: Arc<dyn Runner>,
  /// Which network's snapshot to fetch.
  network: Network,
  /// The darknode home holding the database.
  home: ScriptHome,
}

impl SnapshotRestore {
  /// Creates the remediator.
  pub fn new(runner: Arc<dyn Runner>, network: Network, home: ScriptHome) -> Self {
    Self { runner, network, home }
  }
}

#[async_trait]
impl Remediator<str> for SnapshotRestore {
  async fn apply(&self, target: &str) -> Result<(), RemediationError> {
    let backup = uuid::Uuid::new_v4().to_string();
    log::info!("restoring {} snapshot {target}, old database kept as db-bak-{backup}", self.network);
    let script = restore_snapshot_script(&self.home, self.network, None, &backup)?;
    self.runner.run(&script).await?;
    Ok(())
  }
}
