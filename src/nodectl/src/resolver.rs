//! Remote lookups. Binary releases are discovered by listing the github releases of the release
//! repository; configs and snapshots are objects in a versioned bucket, and their version id (read
//! from a `HEAD` response) is what gets compared.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::constants;
use crate::options::{Network, NodeOptions};
use crate::version::ReleaseTag;

/// Why a remote lookup failed.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// The request could not be made.
  #[error("request to '{url}' failed - {reason}")]
  Transport {
    /// The requested url.
    url: String,
    /// What went wrong.
    reason: String,
  },

  /// The server answered with a non-success status.
  #[error("'{url}' responded with {status}")]
  Status {
    /// The requested url.
    url: String,
    /// The http status code.
    status: u16,
  },

  /// The body could not be decoded.
  #[error("unable to decode response from '{url}' - {reason}")]
  Decode {
    /// The requested url.
    url: String,
    /// What went wrong.
    reason: String,
  },

  /// The lookup took longer than allowed.
  #[error("lookup timed out after {0:?}")]
  Timeout(Duration),

  /// No release tag matched the network.
  #[error("cannot find any release for {0}")]
  NoRelease(Network),

  /// The object exists but carries no version id.
  #[error("object '{0}' has no version id")]
  MissingVersion(String),
}

/// The remote sources of truth the update loops compare against.
#[async_trait]
pub trait Resolver: Send + Sync {
  /// The newest release tag published for `network`.
  async fn latest_release(&self, network: Network) -> Result<ReleaseTag, ResolveError>;

  /// The current version id of the object at `key` (e.g. `mainnet/config.json`).
  async fn latest_object_version(&self, key: &str) -> Result<String, ResolveError>;

  /// The network-wide config template.
  async fn options_template(&self, network: Network) -> Result<NodeOptions, ResolveError>;
}

/// The object key for `name` under `network`.
pub fn object_key(network: Network, name: &str) -> String {
  format!("{}/{name}", network.as_str())
}

/// The public url of an object key.
pub fn object_url(key: &str) -> String {
  format!("{}/{key}", constants::OBJECT_STORAGE_ROOT)
}

/// Where the darknode binary of a release can be downloaded.
pub fn release_download_url(tag: &ReleaseTag) -> String {
  format!("{}/{tag}/darknode", constants::RELEASE_DOWNLOAD_ROOT)
}

/// The github api schema for a single release; only the tag matters.
#[derive(Deserialize, Debug)]
struct GithubRelease {
  /// The git tag of the release.
  tag_name: String,
}

/// The production resolver: github releases + versioned object storage over https.
#[derive(Debug, Clone)]
pub struct RemoteResolver {
  /// Optional github token.
  token: Option<String>,
  /// Upper bound on a single lookup.
  timeout: Duration,
}

impl Default for RemoteResolver {
  fn default() -> Self {
    Self {
      token: None,
      timeout: constants::RESOLVE_TIMEOUT,
    }
  }
}

impl RemoteResolver {
  /// Builds a resolver, picking up a github token from the environment if present.
  pub fn from_env() -> Self {
    let token = std::env::var(constants::GITHUB_TOKEN_VAR)
      .ok()
      .filter(|token| !token.trim().is_empty());

    Self {
      token,
      ..Self::default()
    }
  }

  /// Checks that a release with exactly this tag exists.
  pub async fn release_exists(&self, tag: &ReleaseTag) -> Result<bool, ResolveError> {
    let url = format!(
      "{}/{}/releases/tags/{tag}",
      constants::RELEASE_API_ROOT,
      constants::RELEASE_REPO
    );

    let response = self.bounded(self.github_request(surf::get(&url), &url)).await?;

    match response.status() {
      surf::StatusCode::NotFound => Ok(false),
      _ => checked(&url, response).map(|_| true),
    }
  }

  /// Runs `future`, giving up after the configured timeout.
  async fn bounded<F, T>(&self, future: F) -> Result<T, ResolveError>
  where
    F: std::future::Future<Output = Result<T, ResolveError>>,
  {
    async_std::future::timeout(self.timeout, future)
      .await
      .map_err(|_| ResolveError::Timeout(self.timeout))?
  }

  /// Sends a request to the github api with the headers it expects.
  async fn github_request(&self, request: surf::RequestBuilder, url: &str) -> Result<surf::Response, ResolveError> {
    let request = request
      .header("User-Agent", "nodectl")
      .header("Accept", "application/vnd.github+json");

    let request = match &self.token {
      Some(token) => request.header("Authorization", format!("token {token}")),
      None => request,
    };

    request.await.map_err(|error| transport(url, error))
  }

  /// Walks every page of the release listing, keeping the newest tag for `network`.
  async fn list_latest(&self, network: Network) -> Result<ReleaseTag, ResolveError> {
    let mut next = Some(format!(
      "{}/{}/releases?per_page=100",
      constants::RELEASE_API_ROOT,
      constants::RELEASE_REPO
    ));
    let mut latest = None;

    while let Some(url) = next.take() {
      let mut response = self
        .github_request(surf::get(&url), &url)
        .await
        .and_then(|res| checked(&url, res))?;

      let releases = response
        .body_json::<Vec<GithubRelease>>()
        .await
        .map_err(|error| ResolveError::Decode {
          url: url.clone(),
          reason: format!("{error}"),
        })?;

      log::trace!("found {} release(s) on '{url}'", releases.len());

      latest = newest_for_network(latest, releases.iter().map(|release| release.tag_name.as_str()), network);

      next = response
        .header("Link")
        .and_then(|value| value.get(0))
        .and_then(|value| next_page(value.as_str()));
    }

    latest.ok_or(ResolveError::NoRelease(network))
  }

  /// Issues a `HEAD` for the object and reads its version id header.
  async fn head_version(&self, key: &str) -> Result<String, ResolveError> {
    let url = object_url(key);

    let response = send(surf::head(&url), &url).await?;

    response
      .header(constants::OBJECT_VERSION_HEADER)
      .and_then(|value| value.get(0))
      .map(|value| value.as_str().trim().to_string())
      .filter(|value| !value.is_empty())
      .ok_or_else(|| ResolveError::MissingVersion(key.to_string()))
  }

  /// Downloads and decodes the config template.
  async fn fetch_template(&self, network: Network) -> Result<NodeOptions, ResolveError> {
    let url = object_url(&object_key(network, constants::CONFIG_OBJECT));

    let mut response = send(surf::get(&url), &url).await?;

    response
      .body_json::<NodeOptions>()
      .await
      .map_err(|error| ResolveError::Decode {
        url,
        reason: format!("{error}"),
      })
  }
}

#[async_trait]
impl Resolver for RemoteResolver {
  async fn latest_release(&self, network: Network) -> Result<ReleaseTag, ResolveError> {
    self.bounded(self.list_latest(network)).await
  }

  async fn latest_object_version(&self, key: &str) -> Result<String, ResolveError> {
    self.bounded(self.head_version(key)).await
  }

  async fn options_template(&self, network: Network) -> Result<NodeOptions, ResolveError> {
    self.bounded(self.fetch_template(network)).await
  }
}

/// Sends a plain request, failing on transport errors and non-success statuses.
async fn send(request: surf::RequestBuilder, url: &str) -> Result<surf::Response, ResolveError> {
  request
    .await
    .map_err(|error| transport(url, error))
    .and_then(|res| checked(url, res))
}

/// A request to `url` never produced a response.
fn transport(url: &str, error: surf::Error) -> ResolveError {
  ResolveError::Transport {
    url: url.to_string(),
    reason: format!("{error}"),
  }
}

/// Passes successful responses through; anything else becomes [`ResolveError::Status`].
fn checked(url: &str, response: surf::Response) -> Result<surf::Response, ResolveError> {
  if response.status().is_success() {
    Ok(response)
  } else {
    Err(ResolveError::Status {
      url: url.to_string(),
      status: response.status() as u16,
    })
  }
}

/// Folds a page of tags into the newest tag seen so far for `network`. Tags for other networks,
/// and tags that do not parse, are ignored.
fn newest_for_network<'a, I>(current: Option<ReleaseTag>, tags: I, network: Network) -> Option<ReleaseTag>
where
  I: IntoIterator<Item = &'a str>,
{
  tags
    .into_iter()
    .filter_map(|tag| ReleaseTag::parse(tag).ok())
    .filter(|tag| tag.network() == Some(network.as_str()))
    .fold(current, |best, candidate| match best {
      Some(best) if !candidate.is_newer_than(&best) => Some(best),
      _ => Some(candidate),
    })
}

/// Extracts the `rel="next"` target from a github `Link` header.
fn next_page(link: &str) -> Option<String> {
  link.split(',').find_map(|part| {
    let (target, params) = part.split_once(';')?;

    if !params.split(';').any(|param| param.trim() == r#"rel="next""#) {
      return None;
    }

    let target = target.trim();
    target
      .strip_prefix('<')
      .and_then(|target| target.strip_suffix('>'))
      .map(|target| target.to_string())
  })
}
