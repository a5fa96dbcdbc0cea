#![warn(clippy::missing_docs_in_private_items)]

//! The operator's tool for managing deployed darknodes over ssh: pushing binary and config
//! updates, restoring snapshots and driving the service lifecycle.

use clap::{Parser, Subcommand};

/// Subcommand implementations.
mod cli;

/// Command line options struct, provided by clap.
#[derive(Parser)]
#[command(author, version = option_env!("NODECTL_VERSION").unwrap_or("dev"), about, long_about = None)]
struct CommandLineOptions {
  /// The darknode home directory holding the node registry. Defaults to `~/.darknode`.
  #[arg(long, global = true)]
  home: Option<std::path::PathBuf>,

  /// What to do.
  #[command(subcommand)]
  command: CommandLineCommand,
}

/// The supported operations.
#[derive(Subcommand)]
enum CommandLineCommand {
  /// Installs a release (and optionally the network config) on nodes, then restarts them.
  Update(cli::UpdateCommand),

  /// Replaces the database of nodes with a published snapshot.
  Recover(cli::RecoverCommand),

  /// Starts the darknode service.
  Start(cli::Selection),

  /// Stops the darknode service.
  Stop(cli::Selection),

  /// Restarts the darknode service.
  Restart(cli::Selection),
}

/// Dispatches a parsed command.
async fn run(options: CommandLineOptions) -> anyhow::Result<()> {
  let registry = nodectl::nodes::NodeRegistry::new(options.home.unwrap_or_else(nodectl::settings::default_home));

  match options.command {
    CommandLineCommand::Update(command) => cli::update(&registry, command).await,
    CommandLineCommand::Recover(command) => cli::recover(&registry, command).await,
    CommandLineCommand::Start(selection) => {
      cli::service(&registry, selection, nodectl::service::ServiceAction::Start).await
    }
    CommandLineCommand::Stop(selection) => cli::service(&registry, selection, nodectl::service::ServiceAction::Stop).await,
    CommandLineCommand::Restart(selection) => {
      cli::service(&registry, selection, nodectl::service::ServiceAction::Restart).await
    }
  }
}

fn main() -> anyhow::Result<()> {
  let _ = dotenv::dotenv();
  env_logger::init();
  log::debug!("environment + logger ready");

  let options = CommandLineOptions::parse();
  async_std::task::block_on(run(options))
}
