//! Configuration structure
// (c) 2024 sendplz contributors

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::wire::DEFAULT_CHUNK_SIZE;
use crate::util::ByteCount;

/// The set of configurable options supported by sendplz.
///
/// **Note:** The implementation of `default()` for this struct returns the hard-wired defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    /// Maximum size of each file chunk sent.
    /// This may be an integer or an SI quantity like `8M` or `256k`.
    pub chunk_size: ByteCount,
    /// Directory in which received files are created
    pub directory: String,
    /// Wildcard patterns matched against the sender's IP address.
    /// A connection is accepted if any pattern matches.
    pub allow: Vec<String>,
    /// Receiver gives up on a session after this many seconds without a message. 0 means never.
    pub idle_timeout: u64,
}

impl Configuration {
    /// Names of the fields in this struct
    pub const FIELDS: &'static [&'static str] = &["chunk_size", "directory", "allow", "idle_timeout"];

    /// The idle timeout as a Duration, if there is one
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout))
    }

    /// Checks the values make sense
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(*self.chunk_size > 0, "chunk_size must be at least 1 byte");
        anyhow::ensure!(!self.directory.is_empty(), "directory must not be empty");
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            chunk_size: ByteCount::new(DEFAULT_CHUNK_SIZE),
            directory: ".".into(),
            allow: vec!["*".into()],
            idle_timeout: 0,
        }
    }
}

/// Command-line overrides for [Configuration].
///
/// Anything not given on the command line is left to lower priority sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::Args, Serialize)]
pub struct ConfigurationOverrides {
    /// Maximum size of each file chunk sent [default: 8M]
    ///
    /// This may be given as a number of bytes or an SI quantity like `256k`.
    #[arg(long, global = true, value_name = "bytes", help_heading("Configuration"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<ByteCount>,

    /// Directory in which received files are created [default: .]
    #[arg(long, global = true, value_name = "dir", help_heading("Configuration"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Accepts connections only from IP addresses matching this pattern [default: *]
    ///
    /// `*` and `?` wildcards are supported. Repeat to allow several patterns.
    #[arg(
        short,
        long = "allow",
        global = true,
        value_name = "pattern",
        help_heading("Configuration")
    )]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,

    /// Drops a receiving session after this many seconds without a message (0 = never)
    #[arg(long, global = true, value_name = "sec", help_heading("Configuration"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,
}

impl figment::Provider for ConfigurationOverrides {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("command line")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Configuration;

    #[test]
    fn defaults() {
        let c = Configuration::default();
        assert_eq!(*c.chunk_size, 8 * 1024 * 1024);
        assert_eq!(c.allow, vec!["*".to_string()]);
        assert_eq!(c.idle_timeout(), None);
        c.validate().unwrap();
    }

    #[test]
    fn idle_timeout() {
        let c = Configuration {
            idle_timeout: 30,
            ..Default::default()
        };
        assert_eq!(c.idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let c = Configuration {
            chunk_size: 0.into(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn field_list_is_complete() {
        let json = serde_json::to_value(Configuration::default()).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        let mut fields: Vec<_> = Configuration::FIELDS.iter().map(ToString::to_string).collect();
        keys.sort();
        fields.sort();
        assert_eq!(keys, fields);
    }
}
