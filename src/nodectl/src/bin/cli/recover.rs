use async_std::io::prelude::BufReadExt;
use async_std::io::WriteExt;
use clap::Parser;

use nodectl::nodes::NodeRegistry;
use nodectl::remediation::{restore_snapshot_script, ScriptHome};
use nodectl::runner::Runner;
use nodectl::service::{ServiceAction, ServiceController};

/// Options for `nodectl recover`.
#[derive(Parser, Debug, PartialEq)]
pub struct RecoverCommand {
  /// Which nodes.
  #[command(flatten)]
  pub selection: super::Selection,

  /// Skip the confirmation prompt.
  #[arg(short, long)]
  pub force: bool,

  /// A specific snapshot object to restore instead of the latest one.
  #[arg(short, long)]
  pub snapshot: Option<String>,
}

/// Whether an operator's answer to the prompt counts as a yes.
fn confirmed(answer: &str) -> bool {
  matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Asks the operator to confirm wiping the databases of `names`.
async fn confirm(names: &[String]) -> anyhow::Result<bool> {
  let mut stdout = async_std::io::stdout();
  stdout
    .write_all(
      format!(
        "this will replace the database of {} with a snapshot, continue? [y/N] ",
        names.join(", ")
      )
      .as_bytes(),
    )
    .await?;
  stdout.flush().await?;

  let mut answer = String::new();
  async_std::io::BufReader::new(async_std::io::stdin())
    .read_line(&mut answer)
    .await?;

  Ok(confirmed(&answer))
}

/// Stops every selected node, restores a snapshot in place of its database and restarts it.
pub async fn recover(registry: &NodeRegistry, command: RecoverCommand) -> anyhow::Result<()> {
  let names = command.selection.resolve(registry)?;

  if !command.force && !confirm(&names).await? {
    println!("aborted");
    return Ok(());
  }

  let snapshot = command.snapshot;

  super::each_node(registry, names, move |registry, name| {
    let snapshot = snapshot.clone();
    async move { recover_node(registry, name, snapshot).await }
  })
  .await
}

/// Restores a single node.
async fn recover_node(registry: NodeRegistry, name: String, snapshot: Option<String>) -> anyhow::Result<String> {
  let network = registry.options(&name).await?.network;
  let backup = uuid::Uuid::new_v4().to_string();
  let script = restore_snapshot_script(&ScriptHome::Default, network, snapshot.as_deref(), &backup)?;

  let runner = super::connect(&registry, &name).await?;
  let service = ServiceController::new(runner.clone());

  service.apply(ServiceAction::Stop).await?;
  runner.run(&script).await?;
  service.apply(ServiceAction::Restart).await?;

  Ok(format!("recovered, previous database kept as db-bak-{backup}"))
}
