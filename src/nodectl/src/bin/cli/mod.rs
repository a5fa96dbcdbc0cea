use clap::Parser;
use std::future::Future;
use std::sync::Arc;

use nodectl::nodes::NodeRegistry;
use nodectl::runner::Runner;

/// Every command operates on a set of nodes picked either by name or by tags.
#[derive(Parser, Debug, PartialEq)]
pub struct Selection {
  /// The name of a single node.
  pub name: Option<String>,

  /// Comma separated tags; every node carrying all of them is selected.
  #[arg(short, long)]
  pub tags: Option<String>,
}

impl Selection {
  /// Resolves the selection against the registry.
  fn resolve(&self, registry: &NodeRegistry) -> anyhow::Result<Vec<String>> {
    Ok(registry.select(self.name.as_deref(), self.tags.as_deref())?)
  }
}

/// Pushing releases and config.
mod update;
pub use update::{update, UpdateCommand};

/// Snapshot recovery.
mod recover;
pub use recover::{recover, RecoverCommand};

/// Service lifecycle.
mod service;
pub use service::service;

/// An ssh runner for `name`, boxed for the library's trait objects.
async fn connect(registry: &NodeRegistry, name: &str) -> anyhow::Result<Arc<dyn Runner>> {
  let runner = registry.runner(name).await?;
  log::debug!("[{name}] reachable at {}", runner.target());
  Ok(Arc::new(runner))
}

/// Runs `operation` against every selected node concurrently, printing a line per node. Fails if
/// any node failed, after all of them have finished.
async fn each_node<F, O>(registry: &NodeRegistry, names: Vec<String>, operation: F) -> anyhow::Result<()>
where
  F: Fn(NodeRegistry, String) -> O,
  O: Future<Output = anyhow::Result<String>> + Send + 'static,
{
  let handles = names
    .into_iter()
    .map(|name| {
      let work = operation(registry.clone(), name.clone());
      (name, async_std::task::spawn(work))
    })
    .collect::<Vec<_>>();

  let mut failures = 0;

  for (name, handle) in handles {
    match handle.await {
      Ok(message) => println!("[{name}] {message}"),
      Err(error) => {
        failures += 1;
        eprintln!("[{name}] failed - {error:#}");
      }
    }
  }

  if failures > 0 {
    anyhow::bail!("{failures} node(s) failed");
  }

  Ok(())
}
