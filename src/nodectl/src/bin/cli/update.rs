use clap::Parser;
use std::sync::Arc;

use nodectl::nodes::NodeRegistry;
use nodectl::constants;
use nodectl::remediation::{install_binary_script, record_marker_script, write_config_script, ScriptHome};
use nodectl::resolver::{object_key, RemoteResolver, Resolver};
use nodectl::runner::Runner;
use nodectl::service::ServiceController;
use nodectl::version::ReleaseTag;

/// Options for `nodectl update`.
#[derive(Parser, Debug, PartialEq)]
pub struct UpdateCommand {
  /// Which nodes.
  #[command(flatten)]
  pub selection: super::Selection,

  /// A specific release tag to install instead of the newest one.
  #[arg(short, long)]
  pub version: Option<String>,

  /// Also apply the network's config template.
  #[arg(short, long)]
  pub config: bool,
}

/// Installs a release on every selected node, optionally pushing the network config along with it,
/// and restarts the service.
pub async fn update(registry: &NodeRegistry, command: UpdateCommand) -> anyhow::Result<()> {
  let names = command.selection.resolve(registry)?;
  let resolver = Arc::new(RemoteResolver::from_env());

  let pinned = match command.version.as_deref() {
    Some(raw) => {
      let tag = ReleaseTag::parse(raw)?;

      if !resolver.release_exists(&tag).await? {
        anyhow::bail!("release '{tag}' does not exist");
      }

      Some(tag)
    }
    None => None,
  };

  let with_config = command.config;

  super::each_node(registry, names, move |registry, name| {
    let resolver = resolver.clone();
    let pinned = pinned.clone();
    async move { update_node(registry, name, resolver, pinned, with_config).await }
  })
  .await
}

/// Installs `tag` and records it as the node's installed release, so an updater running on the node
/// does not redo (or undo) the install.
fn release_scripts(home: &ScriptHome, tag: &ReleaseTag) -> Vec<String> {
  vec![
    install_binary_script(home, tag),
    record_marker_script(home, constants::KEY_INSTALLED_VERSION, tag.as_str()),
  ]
}

/// Brings one node to `pinned` (or the newest release of its network).
async fn update_node(
  registry: NodeRegistry,
  name: String,
  resolver: Arc<RemoteResolver>,
  pinned: Option<ReleaseTag>,
  with_config: bool,
) -> anyhow::Result<String> {
  let options = registry.options(&name).await?;
  let network = options.network;

  let tag = match pinned {
    Some(tag) if tag.network() != Some(network.as_str()) => {
      anyhow::bail!("release '{tag}' is not a {network} release");
    }
    Some(tag) => tag,
    None => resolver.latest_release(network).await?,
  };

  let home = ScriptHome::Default;
  let mut scripts = release_scripts(&home, &tag);

  if with_config {
    let version = resolver
      .latest_object_version(&object_key(network, constants::CONFIG_OBJECT))
      .await?;
    let template = resolver.options_template(network).await?;
    let merged = options.adopt_template(&template)?;
    merged.write(registry.config_path(&name)).await?;
    log::info!("[{name}] local config updated from the {network} template ({version})");
    scripts.push(write_config_script(&home, &merged)?);
    scripts.push(record_marker_script(&home, constants::KEY_CONFIG_VERSION_ID, &version));
  }

  let runner = super::connect(&registry, &name).await?;

  for script in scripts {
    runner.run(&script).await?;
  }

  ServiceController::new(runner).restart().await?;

  Ok(format!("updated to {tag}"))
}

#[cfg(test)]
mod tests {
  use nodectl::remediation::ScriptHome;
  use nodectl::version::ReleaseTag;

  #[test]
  fn test_release_scripts_record_installed_tag() {
    let tag = ReleaseTag::parse("0.4-testnet7").expect("bad tag");
    let scripts = super::release_scripts(&ScriptHome::Default, &tag);

    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("releases/download/0.4-testnet7/darknode"));
    assert!(scripts[1].contains("'DARKNODE_INSTALLED=0.4-testnet7'"));
    assert!(scripts[1].contains("'^DARKNODE_INSTALLED='"));
  }
}
