use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{commit, Outcome, UpdateCheck, UpdateError};
use crate::constants;
use crate::options::{NodeIdentity, NodeOptions};
use crate::remediation::Remediator;
use crate::resolver::{object_key, Resolver};
use crate::service::ServiceController;
use crate::settings::PollInterval;
use crate::store::EnvStore;

/// Log tag.
const TAG: &str = "config";

/// Watches the network config template's object version. On any change the template's
/// network-wide sections are merged into the node's options and written out, unless the template
/// would drop this node from its own peer list.
pub struct ConfigCheck {
  /// Toggle + marker storage.
  store: Arc<EnvStore>,
  /// Object versions and the template itself.
  resolver: Arc<dyn Resolver>,
  /// Writes merged options.
  remediator: Arc<dyn Remediator<NodeOptions>>,
  /// Restarts the darknode afterwards.
  service: ServiceController,
  /// Who we are.
  identity: NodeIdentity,
  /// The options loaded at startup, advanced after every successful write. The config file is
  /// never re-read while the daemon runs.
  options: async_std::sync::Mutex<NodeOptions>,
  /// Poll interval.
  interval: PollInterval,
}

impl ConfigCheck {
  /// Creates the check from the options loaded at startup.
  pub fn new(
    store: Arc<EnvStore>,
    resolver: Arc<dyn Resolver>,
    remediator: Arc<dyn Remediator<NodeOptions>>,
    service: ServiceController,
    identity: NodeIdentity,
    options: NodeOptions,
  ) -> Self {
    Self {
      store,
      resolver,
      remediator,
      service,
      identity,
      options: async_std::sync::Mutex::new(options),
      interval: PollInterval {
        var: constants::ENV_CONFIG_INTERVAL,
        default: constants::DEFAULT_CONFIG_INTERVAL,
      },
    }
  }
}

#[async_trait]
impl UpdateCheck for ConfigCheck {
  fn tag(&self) -> &'static str {
    TAG
  }

  fn interval(&self) -> Duration {
    self.interval.current()
  }

  async fn check(&self) -> Result<Outcome, UpdateError> {
    if !self.store.enabled(constants::TOGGLE_UPDATE_CONFIG).await {
      return Ok(Outcome::Disabled);
    }

    let key = object_key(self.identity.network, constants::CONFIG_OBJECT);
    let latest = self.resolver.latest_object_version(&key).await?;

    let installed = match self.store.marker(constants::KEY_CONFIG_VERSION_ID).await {
      Some(installed) => installed,
      None => return Ok(Outcome::MissingMarker),
    };

    // Version ids are opaque; any difference (a rollback included) is applied.
    if installed == latest {
      return Ok(Outcome::UpToDate);
    }

    let template = self.resolver.options_template(self.identity.network).await?;

    if !template.contains_peer(&self.identity.address) {
      return Ok(Outcome::SelfEvicted);
    }

    log::info!("[{TAG}] detected config update, latest version {latest}, installed {installed}");

    let mut options = self.options.lock().await;
    let merged = options.merge_template(&template);
    self.remediator.apply(&merged).await?;
    *options = merged;
    drop(options);

    commit(TAG, &self.store, &self.service, constants::KEY_CONFIG_VERSION_ID, &latest).await;

    Ok(Outcome::Updated(latest))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;
  use std::sync::Arc;

  use super::ConfigCheck;
  use crate::options::NodeOptions;
  use crate::remediation::ConfigWrite;
  use crate::service::ServiceController;
  use crate::updater::fakes::{store, FakeResolver, RecordingRunner};
  use crate::updater::{Outcome, UpdateCheck, UpdateError};

  const LOCAL: &str = r#"{
    "net": "mainnet",
    "privKey": "secret",
    "peers": ["self-address", "peer-a"],
    "chains": { "Bitcoin": { "rpc": "old" } },
    "selectors": []
  }"#;

  fn options(input: &str) -> NodeOptions {
    serde_json::from_str(input).expect("bad options")
  }

  fn template(peers: &[&str]) -> NodeOptions {
    options(&format!(
      r#"{{ "net": "mainnet", "peers": {}, "chains": {{ "Bitcoin": {{ "rpc": "new" }} }}, "selectors": ["BTC"] }}"#,
      serde_json::to_string(peers).expect("bad peers")
    ))
  }

  struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<crate::store::EnvStore>,
    resolver: Arc<FakeResolver>,
    runner: Arc<RecordingRunner>,
    check: ConfigCheck,
  }

  impl Fixture {
    fn config_path(&self) -> std::path::PathBuf {
      self.dir.path().join("config.json")
    }
  }

  fn fixture(contents: &str, remote_version: &str, remote: NodeOptions) -> Fixture {
    fixture_with(
      contents,
      FakeResolver {
        object_version: Some(remote_version.to_string()),
        template: Some(remote),
        ..FakeResolver::default()
      },
    )
  }

  fn fixture_with(contents: &str, resolver: FakeResolver) -> Fixture {
    let dir = tempfile::tempdir().expect("failed tempdir");
    let store = store(&dir, contents);
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, LOCAL).expect("failed writing config");

    let local = options(LOCAL);
    let identity = local.identity(dir.path()).expect("bad identity");
    let resolver = Arc::new(resolver);
    let runner = Arc::new(RecordingRunner::default());

    let check = ConfigCheck::new(
      store.clone(),
      resolver.clone(),
      Arc::new(ConfigWrite::new(&config_path)),
      ServiceController::new(runner.clone()),
      identity,
      local,
    );

    Fixture {
      dir,
      store,
      resolver,
      runner,
      check,
    }
  }

  #[async_std::test]
  async fn test_any_different_version_is_applied() {
    // "v2" -> "v1" sorts backwards; it is applied anyway.
    let fixture = fixture(
      "UPDATE_CONFIG=1\nDARKNODE_CONFIG_VERSIONID=v2\n",
      "v1",
      template(&["peer-a", "self-address", "peer-b"]),
    );

    let outcome = fixture.check.check().await.expect("failed check");

    assert_eq!(outcome, Outcome::Updated("v1".to_string()));
    assert_eq!(fixture.store.get("DARKNODE_CONFIG_VERSIONID").await, "v1");
    assert_eq!(fixture.runner.scripts(), vec!["systemctl --user restart darknode"]);

    let written = NodeOptions::load(fixture.config_path()).await.expect("bad config");
    assert_eq!(written.peers.len(), 3);
    assert_eq!(written.chains, Some(serde_json::json!({ "Bitcoin": { "rpc": "new" } })));
    assert_eq!(written.rest.get("privKey"), Some(&serde_json::json!("secret")));
  }

  #[async_std::test]
  async fn test_same_version_does_nothing() {
    let fixture = fixture(
      "UPDATE_CONFIG=1\nDARKNODE_CONFIG_VERSIONID=v1\n",
      "v1",
      template(&["self-address"]),
    );

    assert_eq!(fixture.check.check().await.expect("failed check"), Outcome::UpToDate);
    assert_eq!(fixture.resolver.template_calls.load(Ordering::SeqCst), 0);
    assert!(fixture.runner.scripts().is_empty());
  }

  #[async_std::test]
  async fn test_never_evicts_self() {
    let fixture = fixture(
      "UPDATE_CONFIG=1\nDARKNODE_CONFIG_VERSIONID=v1\n",
      "v2",
      template(&["peer-a", "peer-b"]),
    );

    assert_eq!(fixture.check.check().await.expect("failed check"), Outcome::SelfEvicted);
    assert_eq!(fixture.store.get("DARKNODE_CONFIG_VERSIONID").await, "v1");
    assert_eq!(
      std::fs::read_to_string(fixture.config_path()).expect("failed read"),
      LOCAL
    );
    assert!(fixture.runner.scripts().is_empty());
  }

  #[async_std::test]
  async fn test_disabled_makes_no_lookup() {
    let fixture = fixture("DARKNODE_CONFIG_VERSIONID=v1\n", "v2", template(&["self-address"]));

    assert_eq!(fixture.check.check().await.expect("failed check"), Outcome::Disabled);
    assert_eq!(fixture.resolver.object_calls.load(Ordering::SeqCst), 0);
  }

  #[async_std::test]
  async fn test_missing_marker_skips() {
    let fixture = fixture("UPDATE_CONFIG=1\n", "v2", template(&["self-address"]));

    assert_eq!(fixture.check.check().await.expect("failed check"), Outcome::MissingMarker);
    assert_eq!(fixture.resolver.template_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
      std::fs::read_to_string(fixture.config_path()).expect("failed read"),
      LOCAL
    );
  }

  #[async_std::test]
  async fn test_unrecorded_marker_still_restarts() {
    let fixture = fixture(
      "UPDATE_CONFIG=1\nDARKNODE_CONFIG_VERSIONID=v1\n",
      "v2",
      template(&["self-address", "peer-b"]),
    );
    // The store stages writes in `.env.tmp`; a directory there makes every write fail.
    std::fs::create_dir(fixture.dir.path().join(".env.tmp")).expect("failed blocking store");

    let outcome = fixture.check.check().await.expect("failed check");

    assert_eq!(outcome, Outcome::Updated("v2".to_string()));
    assert_eq!(fixture.store.get("DARKNODE_CONFIG_VERSIONID").await, "v1");
    assert_eq!(fixture.runner.scripts(), vec!["systemctl --user restart darknode"]);

    let written = NodeOptions::load(fixture.config_path()).await.expect("bad config");
    assert_eq!(written.peers.len(), 2);
  }

  #[async_std::test]
  async fn test_failed_write_keeps_marker_and_skips_restart() {
    let fixture = fixture(
      "UPDATE_CONFIG=1\nDARKNODE_CONFIG_VERSIONID=v1\n",
      "v2",
      template(&["self-address", "peer-b"]),
    );
    std::fs::create_dir(fixture.dir.path().join("config.json.new")).expect("failed blocking config");

    let result = fixture.check.check().await;

    assert!(matches!(result, Err(UpdateError::Remediation(_))));
    assert_eq!(fixture.store.get("DARKNODE_CONFIG_VERSIONID").await, "v1");
    assert!(fixture.runner.scripts().is_empty());
    assert_eq!(
      std::fs::read_to_string(fixture.config_path()).expect("failed read"),
      LOCAL
    );
  }

  #[async_std::test]
  async fn test_resolver_failure_is_an_error() {
    let fixture = fixture_with("UPDATE_CONFIG=1\nDARKNODE_CONFIG_VERSIONID=v1\n", FakeResolver::default());

    assert!(matches!(fixture.check.check().await, Err(UpdateError::Resolve(_))));
    assert_eq!(fixture.resolver.template_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.store.get("DARKNODE_CONFIG_VERSIONID").await, "v1");
    assert!(fixture.runner.scripts().is_empty());
  }
}
