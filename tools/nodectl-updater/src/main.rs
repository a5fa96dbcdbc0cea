#![warn(clippy::missing_docs_in_private_items)]

//! This daemon runs on a darknode's own machine and keeps it current: the darknode binary follows
//! the newest release for its network, the config follows the published network template and the
//! database is restored whenever a new snapshot is published. Each of these is toggled through the
//! `.env` file in the darknode's home directory and can be switched on or off while running.

use clap::Parser;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;

use nodectl::options::NodeOptions;
use nodectl::resolver::RemoteResolver;
use nodectl::runner::LocalRunner;
use nodectl::updater::{self, Supervisor};

/// Command line options struct, provided by clap.
#[derive(Parser)]
#[clap(author, version = option_env!("NODECTL_VERSION").unwrap_or("dev"), about, long_about = None)]
struct UpdaterCommandLineOptions {
  /// The darknode home directory. Defaults to `~/.darknode`.
  #[clap(long, value_parser)]
  home: Option<std::path::PathBuf>,
}

/// Loads the node's options and wires the three update loops together.
async fn build(home: std::path::PathBuf) -> Result<Supervisor> {
  let config_path = home.join("config.json");
  let options = NodeOptions::load(&config_path).await.map_err(|error| {
    log::error!("unable to load darknode config - {error}");
    Error::new(ErrorKind::Other, format!("{error}"))
  })?;

  let identity = options.identity(&home).map_err(|error| {
    log::error!("invalid darknode config - {error}");
    Error::new(ErrorKind::Other, format!("{error}"))
  })?;

  log::info!("darknode on {} at {:?}", identity.network, identity.home);

  let checks = updater::node_checks(
    identity,
    options,
    Arc::new(RemoteResolver::from_env()),
    Arc::new(LocalRunner),
  );

  Ok(Supervisor::new(checks))
}

fn main() -> Result<()> {
  let _ = dotenv::dotenv();
  env_logger::init();
  log::info!("env loaded");

  let options = UpdaterCommandLineOptions::parse();
  let home = options.home.unwrap_or_else(nodectl::settings::default_home);

  let mut signals = signal_hook::iterator::Signals::new([SIGHUP, SIGINT, SIGTERM, SIGQUIT])?;

  async_std::task::block_on(async move {
    let supervisor = build(home).await?;
    let trigger = supervisor.trigger();

    async_std::task::spawn_blocking(move || {
      if let Some(signal) = signals.forever().next() {
        log::warn!("received signal {signal}, stopping update loops");
        trigger.trigger();
      }
    });

    supervisor.run().await;
    log::info!("all update loops stopped, exiting");
    Ok::<(), Error>(())
  })
}
