//! The store is a flat `KEY=VALUE` file (the darknode's `.env`) that doubles as the record of what
//! has been applied to the node. Every write reads the whole file, merges a single key and rewrites
//! the file, so keys this crate knows nothing about are carried along untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Errors surfaced when writing to the store. Reads never fail; see [`EnvStore::get`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The existing file could not be read or parsed.
  #[error("unable to read store '{path:?}' - {source}")]
  Read {
    /// Location of the store.
    path: PathBuf,
    /// The underlying parse or io failure.
    source: dotenv::Error,
  },

  /// The merged contents could not be written back.
  #[error("unable to write store '{path:?}' - {source}")]
  Write {
    /// Location of the store.
    path: PathBuf,
    /// The underlying io failure.
    source: std::io::Error,
  },

  /// The key or value cannot be represented in a dotenv file.
  #[error("cannot store '{key}' - {reason}")]
  Invalid {
    /// The rejected key.
    key: String,
    /// Why it was rejected.
    reason: &'static str,
  },
}

/// A mutex-guarded handle on the store file. All reads and writes go through the same lock, which
/// keeps one loop's read-merge-write from interleaving with another's. The file io itself runs on
/// the blocking pool.
#[derive(Debug)]
pub struct EnvStore {
  /// Location of the backing file.
  path: PathBuf,

  /// Serializes access to the file.
  lock: async_std::sync::Mutex<()>,
}

impl EnvStore {
  /// Creates a handle; the file itself is not touched until the first read.
  pub fn new<P>(path: P) -> Self
  where
    P: Into<PathBuf>,
  {
    Self {
      path: path.into(),
      lock: async_std::sync::Mutex::new(()),
    }
  }

  /// Location of the backing file.
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Returns the value stored for `key`, or an empty string if the key is absent or the file
  /// cannot be read. Callers treat an empty value as "unknown/disabled".
  pub async fn get(&self, key: &str) -> String {
    let _guard = self.lock.lock().await;
    let path = self.path.clone();

    match async_std::task::spawn_blocking(move || read_entries(&path)).await {
      Ok(mut entries) => entries.remove(key).unwrap_or_default(),
      Err(error) => {
        log::debug!("treating '{key}' as unset - {error}");
        String::new()
      }
    }
  }

  /// A feature toggle is enabled only when its value is exactly `"1"`.
  pub async fn enabled(&self, key: &str) -> bool {
    self.get(key).await.trim() == "1"
  }

  /// Reads a version marker, mapping blank values to `None`.
  pub async fn marker(&self, key: &str) -> Option<String> {
    let value = self.get(key).await;
    let trimmed = value.trim();

    if trimmed.is_empty() {
      None
    } else {
      Some(trimmed.to_string())
    }
  }

  /// Merges `key=value` into the file, preserving every other entry.
  pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    validate(key, value)?;

    let _guard = self.lock.lock().await;
    let path = self.path.clone();
    let (key, value) = (key.to_string(), value.to_string());

    async_std::task::spawn_blocking(move || {
      let mut entries = read_entries(&path)?;
      entries.insert(key, value);
      write_entries(&path, &entries)
    })
    .await
  }
}

/// Loads every entry of the file. A missing file is an error, same as a malformed one.
fn read_entries(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
  let to_error = |source| StoreError::Read {
    path: path.to_path_buf(),
    source,
  };

  dotenv::from_path_iter(path)
    .map_err(to_error)?
    .collect::<Result<BTreeMap<String, String>, dotenv::Error>>()
    .map_err(to_error)
}

/// Rewrites the file by writing a sibling and renaming it over the original, so concurrent readers
/// (including other processes) see either the old or the new contents.
fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
  let to_error = |source| StoreError::Write {
    path: path.to_path_buf(),
    source,
  };

  let mut staging = path.as_os_str().to_owned();
  staging.push(".tmp");
  let staging = PathBuf::from(staging);

  std::fs::write(&staging, render(entries)).map_err(to_error)?;
  std::fs::rename(&staging, path).map_err(to_error)
}

/// Serializes entries one per line. Values outside a conservative character set are single
/// quoted, which dotenv reads literally (no escapes, no `$` expansion).
fn render(entries: &BTreeMap<String, String>) -> String {
  entries
    .iter()
    .map(|(key, value)| {
      if value.chars().all(is_plain) {
        format!("{key}={value}\n")
      } else {
        format!("{key}='{value}'\n")
      }
    })
    .collect()
}

/// Characters that can appear unquoted in a value.
fn is_plain(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/' | '+' | '@' | ',')
}

/// Rejects anything `render` could not write in a form that reads back identically.
fn validate(key: &str, value: &str) -> Result<(), StoreError> {
  let invalid = |reason| {
    Err(StoreError::Invalid {
      key: key.to_string(),
      reason,
    })
  };

  if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return invalid("keys may only contain letters, digits and underscores");
  }

  if value.contains(|c| matches!(c, '\'' | '\n' | '\r')) {
    return invalid("values may not contain quotes or line breaks");
  }

  Ok(())
}
