//! Deployed nodes live under `~/.darknode/darknodes/<name>/`, each directory holding the node's
//! `config.json`, the `ssh_keypair` used to reach it, its `tags.out` and the terraform state that
//! knows its ip.

use std::path::PathBuf;

use crate::options::{NodeOptions, OptionsError};
use crate::runner::SshRunner;

/// Problems selecting or reaching deployed nodes.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  /// Neither a name nor tags were given.
  #[error("please provide name or tags of the node you want to operate")]
  EmptySelection,

  /// Both a name and tags were given.
  #[error("too many arguments, cannot have both name and tags")]
  AmbiguousSelection,

  /// No node with that name exists.
  #[error("darknode [{0}] not found")]
  NotFound(String),

  /// No node carries all of the requested tags.
  #[error("cannot find any node with tags '{0}'")]
  NoTagMatch(String),

  /// The node directory could not be read.
  #[error("unable to read '{path:?}' - {source}")]
  Io {
    /// What we tried to read.
    path: PathBuf,
    /// Why it failed.
    source: std::io::Error,
  },

  /// The node's config could not be loaded.
  #[error(transparent)]
  Options(#[from] OptionsError),

  /// terraform did not report an ip.
  #[error("unable to determine ip of [{name}] - {reason}")]
  MissingIp {
    /// The node.
    name: String,
    /// What terraform said.
    reason: String,
  },
}

/// The local record of deployed nodes.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
  /// The `~/.darknode` directory.
  root: PathBuf,
}

impl NodeRegistry {
  /// A registry rooted at `root` (normally `~/.darknode`).
  pub fn new<P>(root: P) -> Self
  where
    P: Into<PathBuf>,
  {
    Self { root: root.into() }
  }

  /// The directory holding every node.
  fn nodes_directory(&self) -> PathBuf {
    self.root.join("darknodes")
  }

  /// The directory of a single node.
  pub fn node_path(&self, name: &str) -> PathBuf {
    self.nodes_directory().join(name)
  }

  /// Resolves the operator's selection to node names: exactly one of `name` or `tags` must be
  /// given.
  pub fn select(&self, name: Option<&str>, tags: Option<&str>) -> Result<Vec<String>, NodeError> {
    let name = name.map(str::trim).filter(|name| !name.is_empty());
    let tags = tags.map(str::trim).filter(|tags| !tags.is_empty());

    match (name, tags) {
      (None, None) => Err(NodeError::EmptySelection),
      (Some(_), Some(_)) => Err(NodeError::AmbiguousSelection),
      (Some(name), None) => self.validate(name).map(|_| vec![name.to_string()]),
      (None, Some(tags)) => self.by_tags(tags),
    }
  }

  /// Errors unless a node directory named `name` exists.
  fn validate(&self, name: &str) -> Result<(), NodeError> {
    let found = self
      .list()?
      .into_iter()
      .any(|candidate| candidate == name);

    if found {
      Ok(())
    } else {
      Err(NodeError::NotFound(name.to_string()))
    }
  }

  /// All nodes carrying every tag in the comma separated `required` list.
  fn by_tags(&self, required: &str) -> Result<Vec<String>, NodeError> {
    let mut matches = self
      .list()?
      .into_iter()
      .filter(|name| match std::fs::read_to_string(self.node_path(name).join("tags.out")) {
        Ok(have) => tags_match(&have, required),
        Err(error) => {
          log::debug!("skipping [{name}], no readable tags - {error}");
          false
        }
      })
      .collect::<Vec<String>>();

    if matches.is_empty() {
      return Err(NodeError::NoTagMatch(required.to_string()));
    }

    matches.sort();
    Ok(matches)
  }

  /// Every node directory name.
  fn list(&self) -> Result<Vec<String>, NodeError> {
    let directory = self.nodes_directory();
    let to_error = |source| NodeError::Io {
      path: directory.clone(),
      source,
    };

    let mut names = Vec::new();

    for entry in std::fs::read_dir(&directory).map_err(to_error)? {
      let entry = entry.map_err(to_error)?;

      if entry.path().is_dir() {
        names.push(entry.file_name().to_string_lossy().into_owned());
      }
    }

    Ok(names)
  }

  /// The local copy of a node's config.
  pub async fn options(&self, name: &str) -> Result<NodeOptions, NodeError> {
    Ok(NodeOptions::load(self.config_path(name)).await?)
  }

  /// Where the local copy of a node's config lives.
  pub fn config_path(&self, name: &str) -> PathBuf {
    self.node_path(name).join("config.json")
  }

  /// Asks terraform for the node's ip.
  pub async fn ip(&self, name: &str) -> Result<String, NodeError> {
    let path = self.node_path(name);
    let output = async_std::process::Command::new("terraform")
      .arg("output")
      .arg("ip")
      .current_dir(&path)
      .output()
      .await
      .map_err(|source| NodeError::Io { path, source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let ip = stdout.trim().trim_matches('"');

    if !output.status.success() || ip.is_empty() || ip.contains("Warning") {
      return Err(NodeError::MissingIp {
        name: name.to_string(),
        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    Ok(ip.to_string())
  }

  /// An ssh runner for the node, connecting as the darknode user.
  pub async fn runner(&self, name: &str) -> Result<SshRunner, NodeError> {
    let ip = self.ip(name).await?;
    Ok(SshRunner::new(
      ip,
      crate::constants::NODE_USER,
      self.key_path(name),
    ))
  }

  /// The private key used to reach a node.
  fn key_path(&self, name: &str) -> PathBuf {
    self.node_path(name).join("ssh_keypair")
  }
}

/// True if every comma separated tag in `required` appears in the comma separated `have` list.
pub fn tags_match(have: &str, required: &str) -> bool {
  let have = have.split(',').map(str::trim).collect::<Vec<&str>>();

  required
    .split(',')
    .map(str::trim)
    .filter(|tag| !tag.is_empty())
    .all(|tag| have.contains(&tag))
}
