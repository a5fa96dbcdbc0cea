//! The updater is three independent polling loops (binary, config, snapshot recovery) owned by a
//! [`Supervisor`]. A loop iteration checks its toggle, resolves the remote version, compares it
//! with the marker recorded in the store, remediates on drift, records the new marker and restarts
//! the service. Nothing is kept in memory between iterations that the store does not also know,
//! so restarting the daemon loses no progress.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::options::{NodeIdentity, NodeOptions};
use crate::remediation::{BinaryInstall, ConfigWrite, RemediationError, ScriptHome, SnapshotRestore};
use crate::resolver::{ResolveError, Resolver};
use crate::runner::Runner;
use crate::service::ServiceController;
use crate::store::EnvStore;
use crate::version::VersionError;

/// Keeps the darknode binary on the newest release for its network.
pub mod binary;
pub use binary::BinaryCheck;

/// Keeps the darknode config in line with the network template.
pub mod config;
pub use config::ConfigCheck;

/// Restores the database from newly published snapshots.
pub mod snapshot;
pub use snapshot::SnapshotCheck;

/// What a single loop iteration ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// The loop's toggle is off; nothing was looked up.
  Disabled,

  /// No marker is recorded, so there is no baseline to compare against.
  MissingMarker,

  /// Local and remote agree.
  UpToDate,

  /// The remote version cannot be compared with ours (e.g. a tag for another network).
  Incomparable(String),

  /// The remote config no longer lists this node; applying it would evict us.
  SelfEvicted,

  /// The remediation was applied; carries the new marker.
  Updated(String),
}

/// A failed iteration. The marker is left untouched, so the same drift is retried next time.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
  /// The remote version could not be determined.
  #[error("unable to resolve remote version - {0}")]
  Resolve(#[from] ResolveError),

  /// The recorded or remote version did not parse.
  #[error("invalid version - {0}")]
  Version(#[from] VersionError),

  /// The remediation failed.
  #[error("remediation failed - {0}")]
  Remediation(#[from] RemediationError),
}

/// One kind of update check.
#[async_trait]
pub trait UpdateCheck: Send + Sync {
  /// The tag used to prefix this loop's log lines.
  fn tag(&self) -> &'static str;

  /// How long to wait between iterations; read fresh before every sleep.
  fn interval(&self) -> Duration;

  /// Runs a single iteration.
  async fn check(&self) -> Result<Outcome, UpdateError>;
}

/// Records a successful remediation: persist the marker, then restart the service. Neither step
/// can undo the remediation, so failures here are logged and the iteration still counts as an
/// update. A lost marker write means the same remediation runs again next interval.
pub(crate) async fn commit(tag: &str, store: &EnvStore, service: &ServiceController, key: &str, value: &str) {
  if let Err(error) = store.set(key, value).await {
    log::error!("[{tag}] update applied but unable to record '{key}={value}' - {error}");
  }

  if let Err(error) = service.restart().await {
    log::warn!("[{tag}] unable to restart darknode service - {error}");
  }
}

/// Builds the binary, config and recovery checks for the node whose home is `identity.home`. The
/// store, the config file and every remediation script resolve against that one directory.
pub fn node_checks(
  identity: NodeIdentity,
  options: NodeOptions,
  resolver: Arc<dyn Resolver>,
  runner: Arc<dyn Runner>,
) -> Vec<Arc<dyn UpdateCheck>> {
  let home = identity.home.clone();
  let network = identity.network;
  let store = Arc::new(EnvStore::new(home.join(".env")));
  let service = ServiceController::new(runner.clone());
  let scripts = ScriptHome::At(home.clone());

  vec![
    Arc::new(BinaryCheck::new(
      store.clone(),
      resolver.clone(),
      Arc::new(BinaryInstall::new(runner.clone(), scripts.clone())),
      service.clone(),
      network,
    )),
    Arc::new(ConfigCheck::new(
      store.clone(),
      resolver.clone(),
      Arc::new(ConfigWrite::new(home.join("config.json"))),
      service.clone(),
      identity,
      options,
    )),
    Arc::new(SnapshotCheck::new(
      store,
      resolver,
      Arc::new(SnapshotRestore::new(runner, network, scripts)),
      service,
      network,
    )),
  ]
}

/// The receiving half of the shutdown signal. Nothing is ever sent; closing the channel is the
/// signal.
#[derive(Clone, Debug)]
pub struct Shutdown(async_std::channel::Receiver<()>);

/// The triggering half of the shutdown signal.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger(async_std::channel::Sender<()>);

/// Creates a linked trigger/listener pair.
pub fn shutdown() -> (ShutdownTrigger, Shutdown) {
  let (sender, receiver) = async_std::channel::bounded(1);
  (ShutdownTrigger(sender), Shutdown(receiver))
}

impl ShutdownTrigger {
  /// Signals shutdown. Repeated calls are harmless.
  pub fn trigger(&self) {
    self.0.close();
  }
}

impl Shutdown {
  /// True once shutdown has been triggered.
  pub fn is_triggered(&self) -> bool {
    self.0.is_closed()
  }

  /// Resolves once shutdown has been triggered.
  pub async fn wait(&self) {
    while self.0.recv().await.is_ok() {}
  }
}

/// Drives a single check until shutdown. Shutdown is noticed before an iteration starts and
/// while sleeping, never in the middle of a remediation.
pub async fn poll(check: Arc<dyn UpdateCheck>, shutdown: Shutdown) {
  let tag = check.tag();
  log::info!("[{tag}] starting");

  loop {
    if shutdown.is_triggered() {
      break;
    }

    match check.check().await {
      Ok(Outcome::Disabled) => log::debug!("[{tag}] disabled, skipping"),
      Ok(Outcome::MissingMarker) => log::warn!("[{tag}] no installed version recorded, skipping"),
      Ok(Outcome::UpToDate) => log::debug!("[{tag}] up to date"),
      Ok(Outcome::Incomparable(remote)) => log::warn!("[{tag}] cannot compare remote version {remote}, skipping"),
      Ok(Outcome::SelfEvicted) => log::warn!("[{tag}] latest config does not list this node, skipping"),
      Ok(Outcome::Updated(marker)) => log::info!("[{tag}] successfully updated to {marker}"),
      Err(error) => log::error!("[{tag}] {error}"),
    }

    let interval = check.interval();
    log::trace!("[{tag}] sleeping for {interval:?}");

    let slept = async {
      async_std::task::sleep(interval).await;
      true
    };
    let cancelled = async {
      shutdown.wait().await;
      false
    };

    if !futures_lite::future::or(slept, cancelled).await {
      break;
    }
  }

  log::info!("[{tag}] stopped");
}

/// Owns the loops and the shutdown signal they share.
pub struct Supervisor {
  /// The checks to run, one loop each.
  checks: Vec<Arc<dyn UpdateCheck>>,
  /// Kept so callers can ask for more triggers.
  trigger: ShutdownTrigger,
  /// Cloned into every loop.
  shutdown: Shutdown,
}

impl Supervisor {
  /// Creates a supervisor for `checks`.
  pub fn new(checks: Vec<Arc<dyn UpdateCheck>>) -> Self {
    let (trigger, shutdown) = shutdown();
    Self {
      checks,
      trigger,
      shutdown,
    }
  }

  /// A handle that stops every loop when triggered.
  pub fn trigger(&self) -> ShutdownTrigger {
    self.trigger.clone()
  }

  /// Spawns one task per check and waits for all of them to stop.
  pub async fn run(self) {
    let handles = self
      .checks
      .into_iter()
      .map(|check| async_std::task::spawn(poll(check, self.shutdown.clone())))
      .collect::<Vec<_>>();

    log::info!("supervising {} update loop(s)", handles.len());

    for handle in handles {
      handle.await;
    }
  }
}

/// Test doubles shared by the loop tests.
#[cfg(test)]
pub(crate) mod fakes {
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  use crate::options::{Network, NodeOptions};
  use crate::resolver::{ResolveError, Resolver};
  use crate::runner::{RunError, Runner};
  use crate::store::EnvStore;
  use crate::version::ReleaseTag;

  /// Serves canned remote versions and counts lookups.
  #[derive(Default)]
  pub struct FakeResolver {
    pub release: Option<String>,
    pub object_version: Option<String>,
    pub template: Option<NodeOptions>,
    pub release_calls: AtomicUsize,
    pub object_calls: AtomicUsize,
    pub template_calls: AtomicUsize,
  }

  fn unavailable() -> ResolveError {
    ResolveError::Transport {
      url: "fake".to_string(),
      reason: "unavailable".to_string(),
    }
  }

  #[async_trait]
  impl Resolver for FakeResolver {
    async fn latest_release(&self, _network: Network) -> Result<ReleaseTag, ResolveError> {
      self.release_calls.fetch_add(1, Ordering::SeqCst);
      let release = self.release.as_ref().ok_or_else(unavailable)?;
      Ok(ReleaseTag::parse(release).expect("fake release is not a tag"))
    }

    async fn latest_object_version(&self, _key: &str) -> Result<String, ResolveError> {
      self.object_calls.fetch_add(1, Ordering::SeqCst);
      self.object_version.clone().ok_or_else(unavailable)
    }

    async fn options_template(&self, _network: Network) -> Result<NodeOptions, ResolveError> {
      self.template_calls.fetch_add(1, Ordering::SeqCst);
      self.template.clone().ok_or_else(unavailable)
    }
  }

  /// Records every script, along with the value a watched store key held when it ran.
  #[derive(Default)]
  pub struct RecordingRunner {
    pub scripts: Mutex<Vec<(String, String)>>,
    pub fail_when: Option<&'static str>,
    pub watch: Option<(Arc<EnvStore>, &'static str)>,
  }

  impl RecordingRunner {
    pub fn scripts(&self) -> Vec<String> {
      self
        .scripts
        .lock()
        .expect("poisoned")
        .iter()
        .map(|(script, _)| script.clone())
        .collect()
    }

    pub fn observed(&self) -> Vec<String> {
      self
        .scripts
        .lock()
        .expect("poisoned")
        .iter()
        .map(|(_, observed)| observed.clone())
        .collect()
    }
  }

  #[async_trait]
  impl Runner for RecordingRunner {
    fn target(&self) -> String {
      "fake".to_string()
    }

    async fn run(&self, script: &str) -> Result<(), RunError> {
      let observed = match &self.watch {
        Some((store, key)) => store.get(key).await,
        None => String::new(),
      };

      self
        .scripts
        .lock()
        .expect("poisoned")
        .push((script.to_string(), observed));

      match self.fail_when {
        Some(needle) if script.contains(needle) => Err(RunError::Exit {
          target: self.target(),
          status: Some(1),
          stderr: "fake failure".to_string(),
        }),
        _ => Ok(()),
      }
    }
  }

  /// Writes `contents` to a fresh store file inside `dir`.
  pub fn store(dir: &tempfile::TempDir, contents: &str) -> Arc<EnvStore> {
    let path = dir.path().join(".env");
    std::fs::write(&path, contents).expect("failed seeding store");
    Arc::new(EnvStore::new(path))
  }
}
