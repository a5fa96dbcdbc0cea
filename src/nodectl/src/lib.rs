#![warn(clippy::missing_docs_in_private_items)]

//! Shared library code for the `nodectl` operator cli and the `nodectl-updater` daemon. The
//! interesting part lives in [`updater`]: three independent polling loops that keep a darknode's
//! binary, configuration and database snapshot in line with what has been published remotely.

/// Fixed keys, urls and defaults.
pub mod constants;

/// The dotenv-style file that records toggles and applied version markers.
pub mod store;

/// Release tags and semantic version comparison.
pub mod version;

/// The darknode `config.json` schema (the parts we care about).
pub mod options;

/// Runtime settings sourced from the environment.
pub mod settings;

/// Remote lookups: github releases and object storage version ids.
pub mod resolver;

/// Running shell scripts locally or over ssh.
pub mod runner;

/// Controlling the darknode systemd unit.
pub mod service;

/// The actions that bring a node up to date.
pub mod remediation;

/// The update-check loops and their supervisor.
pub mod updater;

/// The operator side registry of deployed nodes.
pub mod nodes;
