use std::time::Duration;

/// The `owner/repo` that darknode binaries are released from.
pub const RELEASE_REPO: &str = "renproject/darknode-release";

/// The github api root used when listing releases.
pub const RELEASE_API_ROOT: &str = "https://api.github.com/repos";

/// Where release artifacts can be downloaded from, by tag.
pub const RELEASE_DOWNLOAD_ROOT: &str = "https://github.com/renproject/darknode-release/releases/download";

/// The object storage bucket holding config templates and snapshots, keyed by network.
pub const OBJECT_STORAGE_ROOT: &str = "https://s3.ap-southeast-1.amazonaws.com/darknode.renproject.io";

/// The response header carrying an object's version id.
pub const OBJECT_VERSION_HEADER: &str = "x-amz-version-id";

/// Name of the config template object.
pub const CONFIG_OBJECT: &str = "config.json";

/// Name of the most recent snapshot object.
pub const SNAPSHOT_OBJECT: &str = "latest.tar.gz";

/// Optional github token, used to avoid api rate limits.
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_ACCESS_TOKEN";

/// How long a single remote version lookup may take.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// STORE: the release tag currently installed.
pub const KEY_INSTALLED_VERSION: &str = "DARKNODE_INSTALLED";

/// STORE: the object version id of the last applied config.
pub const KEY_CONFIG_VERSION_ID: &str = "DARKNODE_CONFIG_VERSIONID";

/// STORE: the object version id of the last applied snapshot.
pub const KEY_SNAPSHOT_VERSION_ID: &str = "DARKNODE_SNAPSHOT_VERSIONID";

/// STORE: "1" enables the binary loop.
pub const TOGGLE_UPDATE_BIN: &str = "UPDATE_BIN";

/// STORE: "1" enables the config loop.
pub const TOGGLE_UPDATE_CONFIG: &str = "UPDATE_CONFIG";

/// STORE: "1" enables the snapshot recovery loop.
pub const TOGGLE_UPDATE_RECOVERY: &str = "UPDATE_RECOVERY";

/// ENV: poll interval override for the binary loop.
pub const ENV_BIN_INTERVAL: &str = "BIN_INTERVAL";

/// ENV: poll interval override for the config loop.
pub const ENV_CONFIG_INTERVAL: &str = "CONFIG_INTERVAL";

/// ENV: poll interval override for the recovery loop.
pub const ENV_RECOVERY_INTERVAL: &str = "RECOVERY_INTERVAL";

/// Binary releases are infrequent; check hourly.
pub const DEFAULT_BIN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default config poll interval.
pub const DEFAULT_CONFIG_INTERVAL: Duration = Duration::from_secs(60);

/// Default snapshot poll interval.
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(60);

/// The systemd (user) unit running the darknode.
pub const SERVICE_NAME: &str = "darknode";

/// The unprivileged user the darknode runs as on provisioned instances.
pub const NODE_USER: &str = "darknode";

/// Name of the darknode's home directory, relative to the user's home.
pub const HOME_DIRECTORY: &str = ".darknode";
