use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::{commit, Outcome, UpdateCheck, UpdateError};
use crate::constants;
use crate::options::Network;
use crate::remediation::Remediator;
use crate::resolver::Resolver;
use crate::service::ServiceController;
use crate::settings::PollInterval;
use crate::store::EnvStore;
use crate::version::ReleaseTag;

/// Log tag.
const TAG: &str = "binary";

/// Compares the installed release tag with the newest release for the node's network and installs
/// the newer one.
pub struct BinaryCheck {
  /// Toggle + marker storage.
  store: Arc<EnvStore>,
  /// Where the newest release comes from.
  resolver: Arc<dyn Resolver>,
  /// Installs a release.
  remediator: Arc<dyn Remediator<ReleaseTag>>,
  /// Restarts the darknode afterwards.
  service: ServiceController,
  /// The node's network.
  network: Network,
  /// Poll interval.
  interval: PollInterval,
}

impl BinaryCheck {
  /// Creates the check.
  pub fn new(
    store: Arc<EnvStore>,
    resolver: Arc<dyn Resolver>,
    remediator: Arc<dyn Remediator<ReleaseTag>>,
    service: ServiceController,
    network: Network,
  ) -> Self {
    Self {
      store,
      resolver,
      remediator,
      service,
      network,
      interval: PollInterval {
        var: constants::ENV_BIN_INTERVAL,
        default: constants::DEFAULT_BIN_INTERVAL,
      },
    }
  }
}

#[async_trait]
impl UpdateCheck for BinaryCheck {
  fn tag(&self) -> &'static str {
    TAG
  }

  fn interval(&self) -> Duration {
    self.interval.current()
  }

  async fn check(&self) -> Result<Outcome, UpdateError> {
    if !self.store.enabled(constants::TOGGLE_UPDATE_BIN).await {
      return Ok(Outcome::Disabled);
    }

    let latest = self.resolver.latest_release(self.network).await?;

    let installed = match self.store.marker(constants::KEY_INSTALLED_VERSION).await {
      Some(installed) => ReleaseTag::parse(&installed)?,
      None => return Ok(Outcome::MissingMarker),
    };

    match latest.compare(&installed) {
      Some(Ordering::Greater) => (),
      Some(_) => return Ok(Outcome::UpToDate),
      None => return Ok(Outcome::Incomparable(latest.to_string())),
    }

    log::info!("[{TAG}] detected new release {latest}, currently installed {installed}");
    self.remediator.apply(&latest).await?;
    commit(
      TAG,
      &self.store,
      &self.service,
      constants::KEY_INSTALLED_VERSION,
      latest.as_str(),
    )
    .await;

    Ok(Outcome::Updated(latest.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;
  use std::sync::Arc;

  use super::BinaryCheck;
  use crate::options::Network;
  use crate::remediation::{BinaryInstall, ScriptHome};
  use crate::service::ServiceController;
  use crate::updater::fakes::{store, FakeResolver, RecordingRunner};
  use crate::updater::{Outcome, UpdateCheck, UpdateError};

  fn check(store: Arc<crate::store::EnvStore>, resolver: Arc<FakeResolver>, runner: Arc<RecordingRunner>) -> BinaryCheck {
    let home = store.path().parent().expect("store has no directory").to_path_buf();
    BinaryCheck::new(
      store,
      resolver,
      Arc::new(BinaryInstall::new(runner.clone(), ScriptHome::At(home))),
      ServiceController::new(runner),
      Network::Mainnet,
    )
  }

  #[async_std::test]
  async fn test_disabled_makes_no_lookup() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "UPDATE_BIN=0\nDARKNODE_INSTALLED=0.4-mainnet10\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet12".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner::default());

    let outcome = check(store, resolver.clone(), runner.clone()).check().await.expect("failed check");

    assert_eq!(outcome, Outcome::Disabled);
    assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 0);
    assert!(runner.scripts().is_empty());
  }

  #[async_std::test]
  async fn test_newer_release_installs_records_then_restarts() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet10\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet12".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner {
      watch: Some((store.clone(), "DARKNODE_INSTALLED")),
      ..RecordingRunner::default()
    });

    let outcome = check(store.clone(), resolver, runner.clone())
      .check()
      .await
      .expect("failed check");

    assert_eq!(outcome, Outcome::Updated("0.4-mainnet12".to_string()));
    assert_eq!(store.get("DARKNODE_INSTALLED").await, "0.4-mainnet12");

    let scripts = runner.scripts();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("0.4-mainnet12"));
    assert!(scripts[0].contains(&format!("-o '{}'/bin/darknode-new", dir.path().display())));
    assert!(!scripts[0].contains("$HOME"));
    assert_eq!(scripts[1], "systemctl --user restart darknode");

    // The download ran before the marker moved; the restart after.
    assert_eq!(runner.observed(), vec!["0.4-mainnet10", "0.4-mainnet12"]);
  }

  #[async_std::test]
  async fn test_equal_release_does_nothing() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet14\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet14".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner::default());

    let outcome = check(store, resolver, runner.clone()).check().await.expect("failed check");

    assert_eq!(outcome, Outcome::UpToDate);
    assert!(runner.scripts().is_empty());
  }

  #[async_std::test]
  async fn test_newer_release_triggers_exactly_once() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet14\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet15".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner::default());
    let check = check(store, resolver, runner.clone());

    assert_eq!(
      check.check().await.expect("failed check"),
      Outcome::Updated("0.4-mainnet15".to_string())
    );
    assert_eq!(check.check().await.expect("failed check"), Outcome::UpToDate);

    let installs = runner
      .scripts()
      .into_iter()
      .filter(|script| script.contains("releases/download"))
      .count();
    assert_eq!(installs, 1);
  }

  #[async_std::test]
  async fn test_other_network_release_is_ignored() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet15\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-testnet20".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner::default());

    let outcome = check(store.clone(), resolver, runner.clone())
      .check()
      .await
      .expect("failed check");

    assert_eq!(outcome, Outcome::Incomparable("0.4-testnet20".to_string()));
    assert!(runner.scripts().is_empty());
    assert_eq!(store.get("DARKNODE_INSTALLED").await, "0.4-mainnet15");
  }

  #[async_std::test]
  async fn test_missing_marker_skips() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "UPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet15".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner::default());

    let outcome = check(store, resolver, runner.clone()).check().await.expect("failed check");

    assert_eq!(outcome, Outcome::MissingMarker);
    assert!(runner.scripts().is_empty());
  }

  #[async_std::test]
  async fn test_failed_install_keeps_marker_and_skips_restart() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet10\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet12".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner {
      fail_when: Some("curl"),
      ..RecordingRunner::default()
    });

    let result = check(store.clone(), resolver, runner.clone()).check().await;

    assert!(matches!(result, Err(UpdateError::Remediation(_))));
    assert_eq!(store.get("DARKNODE_INSTALLED").await, "0.4-mainnet10");
    assert_eq!(runner.scripts().len(), 1);
  }

  #[async_std::test]
  async fn test_resolver_failure_is_an_error() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet10\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver::default());
    let runner = Arc::new(RecordingRunner::default());

    let result = check(store, resolver, runner.clone()).check().await;

    assert!(matches!(result, Err(UpdateError::Resolve(_))));
    assert!(runner.scripts().is_empty());
  }

  #[async_std::test]
  async fn test_failed_restart_still_counts_as_update() {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, "DARKNODE_INSTALLED=0.4-mainnet10\nUPDATE_BIN=1\n");
    let resolver = Arc::new(FakeResolver {
      release: Some("0.4-mainnet11".to_string()),
      ..FakeResolver::default()
    });
    let runner = Arc::new(RecordingRunner {
      fail_when: Some("systemctl"),
      ..RecordingRunner::default()
    });

    let outcome = check(store.clone(), resolver, runner).check().await.expect("failed check");

    assert_eq!(outcome, Outcome::Updated("0.4-mainnet11".to_string()));
    assert_eq!(store.get("DARKNODE_INSTALLED").await, "0.4-mainnet11");
  }
}
