// (c) 2024 sendplz contributors
//! # Configuration management
//!
//! sendplz obtains run-time configuration from the following sources, highest priority first:
//! 1. Command-line options
//! 1. A file named with `--config` (which must exist)
//! 1. The user's configuration file (`~/.sendplz.toml`)
//! 1. The system-wide configuration file (`/etc/sendplz.toml`)
//! 1. Hard-wired defaults
//!
//! Each option may appear in multiple places; the highest priority source wins.
//!
//! ## File format
//!
//! Configuration files are [TOML](https://toml.io/).
//!
//! ```toml
//! # Where received files go
//! directory = "/home/me/Downloads"
//! # Only accept transfers from the local network
//! allow = ["192.168.1.*", "fe80::*"]
//! # Larger chunks for fast links
//! chunk_size = "16M"
//! # Give up on a stalled sender after a minute
//! idle_timeout = 60
//! ```
//!
//! The full list of supported fields is defined by [Configuration].
//!
//! On the command line:
//! * `sendplz --show-config` outputs the supported fields, their current values, and where each value came from.
//! * `sendplz --config-files` outputs the list of configuration files consulted for the current user.

mod structure;
pub use structure::{Configuration, ConfigurationOverrides};

mod manager;
pub use manager::Manager;
