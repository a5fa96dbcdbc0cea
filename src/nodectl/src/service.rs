use std::sync::Arc;

use crate::runner::{RunError, Runner};

/// The lifecycle operations supported on the darknode unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
  /// `systemctl --user start`
  Start,
  /// `systemctl --user stop`
  Stop,
  /// `systemctl --user restart`
  Restart,
}

impl ServiceAction {
  /// The systemctl verb.
  fn verb(&self) -> &'static str {
    match self {
      ServiceAction::Start => "start",
      ServiceAction::Stop => "stop",
      ServiceAction::Restart => "restart",
    }
  }

  /// Used when reporting the outcome to an operator.
  pub fn past_tense(&self) -> &'static str {
    match self {
      ServiceAction::Start => "started",
      ServiceAction::Stop => "stopped",
      ServiceAction::Restart => "restarted",
    }
  }

  /// The shell invocation for this action.
  pub fn script(&self) -> String {
    format!("systemctl --user {} {}", self.verb(), crate::constants::SERVICE_NAME)
  }
}

/// Drives the darknode's systemd unit through a runner.
#[derive(Clone)]
pub struct ServiceController {
  /// Where systemctl is invoked.
  runner: Arc<dyn Runner>,
}

impl ServiceController {
  /// Creates a controller acting through `runner`.
  pub fn new(runner: Arc<dyn Runner>) -> Self {
    Self { runner }
  }

  /// Applies a lifecycle action.
  pub async fn apply(&self, action: ServiceAction) -> Result<(), RunError> {
    log::info!("{} darknode service on {}", action.verb(), self.runner.target());
    self.runner.run(&action.script()).await
  }

  /// Shorthand for [`ServiceAction::Restart`].
  pub async fn restart(&self) -> Result<(), RunError> {
    self.apply(ServiceAction::Restart).await
  }
}
