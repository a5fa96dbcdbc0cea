//! The darknode reads its configuration from `config.json`. Only a handful of fields matter to
//! this crate; everything else is carried through untouched so a rewrite never drops settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors loading, validating or writing node options.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
  /// The file could not be read or written.
  #[error("unable to access '{path:?}' - {source}")]
  Io {
    /// The config location.
    path: PathBuf,
    /// The io failure.
    source: std::io::Error,
  },

  /// The contents are not valid node options.
  #[error("invalid node options in '{path:?}' - {source}")]
  Decode {
    /// The config location.
    path: PathBuf,
    /// Why decoding failed.
    source: serde_json::Error,
  },

  /// The options could not be serialized.
  #[error("unable to encode node options - {0}")]
  Encode(#[from] serde_json::Error),

  /// The peer list is empty, so the node's own address is unknown.
  #[error("node options list no peers; unable to determine our own address")]
  NoSelfAddress,
}

/// The networks darknodes can be deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
  /// Production.
  Mainnet,
  /// Public test network.
  Testnet,
  /// Internal development network.
  Devnet,
}

impl Network {
  /// The lowercase name used in tags, object keys and config files.
  pub fn as_str(&self) -> &'static str {
    match self {
      Network::Mainnet => "mainnet",
      Network::Testnet => "testnet",
      Network::Devnet => "devnet",
    }
  }
}

impl fmt::Display for Network {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    write!(formatter, "{}", self.as_str())
  }
}

/// A peer address exactly as it appears in the config. It is compared structurally and never
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(serde_json::Value);

impl PeerAddress {
  /// Wraps an arbitrary json value.
  pub fn new(value: serde_json::Value) -> Self {
    Self(value)
  }
}

/// The darknode's `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOptions {
  /// The network this node participates in.
  #[serde(rename = "net")]
  pub network: Network,

  /// Bootstrap peers; by convention the first entry is the node itself.
  #[serde(default)]
  pub peers: Vec<PeerAddress>,

  /// Per-chain settings, replaced wholesale from the network template.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chains: Option<serde_json::Value>,

  /// Supported selectors, replaced wholesale from the network template.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub selectors: Option<serde_json::Value>,

  /// Everything else (keys, home, host/port, ...), preserved verbatim.
  #[serde(flatten)]
  pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Who this node is; loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeIdentity {
  /// The node's network, fixed for the life of the process.
  pub network: Network,
  /// The node's own (signed) peer address.
  pub address: PeerAddress,
  /// The darknode home directory.
  pub home: PathBuf,
}

impl NodeOptions {
  /// Reads and decodes options from disk.
  pub async fn load<P>(path: P) -> Result<Self, OptionsError>
  where
    P: AsRef<Path>,
  {
    let path = path.as_ref();
    let contents = async_std::fs::read(path).await.map_err(|source| OptionsError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_slice(&contents).map_err(|source| OptionsError::Decode {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Writes the options to `path`, via a sibling file and a rename.
  pub async fn write<P>(&self, path: P) -> Result<(), OptionsError>
  where
    P: AsRef<Path>,
  {
    let path = path.as_ref();
    let to_error = |source| OptionsError::Io {
      path: path.to_path_buf(),
      source,
    };

    let mut staging = path.as_os_str().to_owned();
    staging.push(".new");
    let staging = PathBuf::from(staging);

    async_std::fs::write(&staging, self.to_pretty_json()?)
      .await
      .map_err(to_error)?;
    async_std::fs::rename(&staging, path).await.map_err(to_error)
  }

  /// Four-space indented json, matching what the darknode itself writes.
  pub fn to_pretty_json(&self) -> Result<String, OptionsError> {
    let mut buffer = Vec::with_capacity(4096);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    self.serialize(&mut serializer)?;
    buffer.push(b'\n');

    // serde_json only ever emits utf-8.
    Ok(String::from_utf8_lossy(&buffer).into_owned())
  }

  /// The node's own address (the first peer).
  pub fn self_address(&self) -> Result<&PeerAddress, OptionsError> {
    self.peers.first().ok_or(OptionsError::NoSelfAddress)
  }

  /// Builds the node identity used by the update loops.
  pub fn identity<P>(&self, home: P) -> Result<NodeIdentity, OptionsError>
  where
    P: Into<PathBuf>,
  {
    Ok(NodeIdentity {
      network: self.network,
      address: self.self_address()?.clone(),
      home: home.into(),
    })
  }

  /// True if `peer` is in the peer list.
  pub fn contains_peer(&self, peer: &PeerAddress) -> bool {
    self.peers.iter().any(|candidate| candidate == peer)
  }

  /// Returns a copy of these options with the network-wide sections (`chains`, `selectors`,
  /// `peers`) taken from `template`. Everything node specific is kept.
  pub fn merge_template(&self, template: &NodeOptions) -> NodeOptions {
    NodeOptions {
      chains: template.chains.clone(),
      selectors: template.selectors.clone(),
      peers: template.peers.clone(),
      ..self.clone()
    }
  }

  /// Like [`NodeOptions::merge_template`], but if the template does not list this node it is put
  /// back at the front of the peer list. Used when an operator explicitly asks for the template.
  pub fn adopt_template(&self, template: &NodeOptions) -> Result<NodeOptions, OptionsError> {
    let address = self.self_address()?.clone();
    let mut merged = self.merge_template(template);

    if !merged.contains_peer(&address) {
      log::warn!("template does not list this node, keeping our own address as the first peer");
      merged.peers.insert(0, address);
    }

    Ok(merged)
  }
}
