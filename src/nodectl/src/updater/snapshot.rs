use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{commit, Outcome, UpdateCheck, UpdateError};
use crate::constants;
use crate::options::Network;
use crate::remediation::Remediator;
use crate::resolver::{object_key, Resolver};
use crate::service::ServiceController;
use crate::settings::PollInterval;
use crate::store::EnvStore;

/// Log tag.
const TAG: &str = "recovery";

/// Watches the network's latest snapshot object and restores it whenever its version id changes.
pub struct SnapshotCheck {
  /// Toggle + marker storage.
  store: Arc<EnvStore>,
  /// Object versions.
  resolver: Arc<dyn Resolver>,
  /// Restores a snapshot, identified by version id.
  remediator: Arc<dyn Remediator<str>>,
  /// Restarts the darknode afterwards.
  service: ServiceController,
  /// The node's network.
  network: Network,
  /// Poll interval.
  interval: PollInterval,
}

impl SnapshotCheck {
  /// Creates the check.
  pub fn new(
    store: Arc<EnvStore>,
    resolver: Arc<dyn Resolver>,
    remediator: Arc<dyn Remediator<str>>,
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
        var: constants::ENV_RECOVERY_INTERVAL,
        default: constants::DEFAULT_RECOVERY_INTERVAL,
      },
    }
  }
}

#[async_trait]
impl UpdateCheck for SnapshotCheck {
  fn tag(&self) -> &'static str {
    TAG
  }

  fn interval(&self) -> Duration {
    self.interval.current()
  }

  async fn check(&self) -> Result<Outcome, UpdateError> {
    if !self.store.enabled(constants::TOGGLE_UPDATE_RECOVERY).await {
      return Ok(Outcome::Disabled);
    }

    let key = object_key(self.network, constants::SNAPSHOT_OBJECT);
    let latest = self.resolver.latest_object_version(&key).await?;

    let installed = match self.store.marker(constants::KEY_SNAPSHOT_VERSION_ID).await {
      Some(installed) => installed,
      None => return Ok(Outcome::MissingMarker),
    };

    if installed == latest {
      return Ok(Outcome::UpToDate);
    }

    log::info!("[{TAG}] detected new snapshot, old = {installed}, new = {latest}");
    self.remediator.apply(&latest).await?;
    commit(TAG, &self.store, &self.service, constants::KEY_SNAPSHOT_VERSION_ID, &latest).await;

    Ok(Outcome::Updated(latest))
  }
}
