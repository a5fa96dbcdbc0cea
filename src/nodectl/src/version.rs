//! Darknode releases are tagged `<major>.<minor>-<network><build>` (e.g. `0.4-mainnet15`), with
//! the occasional plain semantic version. Tags from different networks never compare.

use std::cmp::Ordering;
use std::fmt;

/// Failures parsing a version or release tag.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
  /// The version core is not a semantic version, even after padding.
  #[error("'{input}' is not a valid version - {source}")]
  Invalid {
    /// The rejected input.
    input: String,
    /// Why semver rejected it.
    source: semver::Error,
  },
}

/// Parses a version leniently: a leading `v` is dropped and missing minor/patch components are
/// filled with zeros, so `0.4` reads as `0.4.0`.
pub fn parse_semver(input: &str) -> Result<semver::Version, VersionError> {
  let trimmed = input.trim().trim_start_matches('v');
  let split = trimmed.find(|c: char| c == '-' || c == '+').unwrap_or(trimmed.len());
  let (core, rest) = trimmed.split_at(split);

  let padded = match core.split('.').count() {
    1 => format!("{core}.0.0{rest}"),
    2 => format!("{core}.0{rest}"),
    _ => trimmed.to_string(),
  };

  semver::Version::parse(&padded).map_err(|source| VersionError::Invalid {
    input: input.to_string(),
    source,
  })
}

/// Orders two versions semantically (`0.4.9 < 0.4.10`), never lexically.
pub fn compare_semver(a: &str, b: &str) -> Result<Ordering, VersionError> {
  Ok(parse_semver(a)?.cmp(&parse_semver(b)?))
}

/// A parsed release tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTag {
  /// The tag exactly as published.
  raw: String,

  /// The version core, e.g. `0.4.0` for `0.4-mainnet15`.
  version: semver::Version,

  /// The network name and build number, when the tag carries a network suffix.
  channel: Option<(String, u64)>,
}

impl ReleaseTag {
  /// Parses a tag. Suffixes of the form `<letters><digits>` are read as a network channel;
  /// anything else falls through to plain semver parsing (pre-release and all).
  pub fn parse(input: &str) -> Result<Self, VersionError> {
    let raw = input.trim().to_string();

    if let Some((core, suffix)) = raw.split_once('-') {
      if let Some(channel) = parse_channel(suffix) {
        return Ok(Self {
          version: parse_semver(core)?,
          raw,
          channel: Some(channel),
        });
      }
    }

    Ok(Self {
      version: parse_semver(&raw)?,
      raw,
      channel: None,
    })
  }

  /// The network this release was built for, if the tag names one.
  pub fn network(&self) -> Option<&str> {
    self.channel.as_ref().map(|(network, _)| network.as_str())
  }

  /// The tag exactly as published.
  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Compares two tags. Returns `None` when they are not comparable: different networks, or one
  /// tag scoped to a network and the other not.
  pub fn compare(&self, other: &Self) -> Option<Ordering> {
    match (&self.channel, &other.channel) {
      (Some((ours, build)), Some((theirs, other_build))) if ours == theirs => {
        Some(self.version.cmp(&other.version).then(build.cmp(other_build)))
      }
      (None, None) => Some(self.version.cmp(&other.version)),
      _ => None,
    }
  }

  /// True only when `self` is strictly newer and comparable.
  pub fn is_newer_than(&self, other: &Self) -> bool {
    matches!(self.compare(other), Some(Ordering::Greater))
  }
}

impl fmt::Display for ReleaseTag {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    write!(formatter, "{}", self.raw)
  }
}

/// Splits `mainnet15` into `("mainnet", 15)`.
fn parse_channel(suffix: &str) -> Option<(String, u64)> {
  let digits = suffix.find(|c: char| c.is_ascii_digit())?;
  let (name, build) = suffix.split_at(digits);

  if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic()) {
    return None;
  }

  build.parse::<u64>().ok().map(|build| (name.to_string(), build))
}
