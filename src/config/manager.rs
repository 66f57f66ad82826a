//! Configuration file wrangling
// (c) 2024 sendplz contributors

use std::fmt::Display;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Serialized, Toml},
    value::Value,
    Figment, Metadata, Provider,
};
use serde::Deserialize;
use tabled::{settings::style::Style, Table, Tabled};
use tracing::{trace, warn};

use super::Configuration;

// PATHS /////////////////////////////////////////////////////////////////////////////////////////////////////

const BASE_CONFIG_FILENAME: &str = "sendplz.toml";

fn user_config_path() -> Option<PathBuf> {
    // ~/.<filename> for now
    dirs::home_dir().map(|mut d| {
        d.push(format!(".{BASE_CONFIG_FILENAME}"));
        d
    })
}

fn system_config_path() -> PathBuf {
    let mut p = PathBuf::from("/etc");
    p.push(BASE_CONFIG_FILENAME);
    p
}

// SYSTEM DEFAULTS //////////////////////////////////////////////////////////////////////////////////////////////

/// A [`figment::Provider`] that holds our fixed system default options
#[derive(Default)]
struct SystemDefault {}

impl SystemDefault {
    const META_NAME: &str = "default";
}

impl Provider for SystemDefault {
    fn metadata(&self) -> Metadata {
        Metadata::named(Self::META_NAME)
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Configuration::default()).data()
    }
}

// CONFIG MANAGER /////////////////////////////////////////////////////////////////////////////////////////////

/// Processes and merges all possible configuration sources.
///
/// To see which files apply for the current user, run `sendplz --config-files`.
#[derive(Debug, Default)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

fn add_optional_file(f: Figment, path: &Path, what: &str) -> Figment {
    if !path.exists() {
        trace!("{what} configuration file {} not present", path.display());
        return f;
    }
    f.merge(Toml::file(path))
}

impl Manager {
    /// Initialises this structure, reading the system and user configuration files if present.
    #[must_use]
    pub fn new() -> Self {
        let mut data = Figment::new().merge(SystemDefault::default());
        data = add_optional_file(data, &system_config_path(), "system");
        // N.B. This may leave data in a fused-error state, if a data file isn't parseable.
        match user_config_path() {
            Some(path) => data = add_optional_file(data, &path, "user"),
            None => warn!("could not determine user configuration file path"),
        }
        Self { data }
    }

    /// Returns the list of configuration files we look for, whether or not they exist.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        std::iter::once(Some(system_config_path()))
            .chain(std::iter::once(user_config_path()))
            .flatten()
            .map(|p| p.into_os_string().to_string_lossy().into())
            .collect()
    }

    /// Testing/internal constructor, does not read files from system
    #[must_use]
    pub fn without_files() -> Self {
        Self {
            data: Figment::new().merge(SystemDefault::default()),
        }
    }

    /// Merges in a higher priority [`figment::Provider`].
    ///
    /// Command-line options come in this way, via [`ConfigurationOverrides`](super::ConfigurationOverrides).
    /// A provider which fails leaves the data in an error state, reported by [`get`](Self::get).
    pub fn merge_provider<T: Provider>(&mut self, provider: T) {
        self.data = std::mem::take(&mut self.data).merge(provider);
    }

    /// Merges in a data set from a TOML file, which must exist
    pub fn merge_toml_file<T>(&mut self, toml: T)
    where
        T: AsRef<Path>,
    {
        self.merge_provider(Toml::file_exact(toml.as_ref()));
    }

    /// Attempts to extract a particular struct from the data.
    ///
    /// Within sendplz, `T` is usually [Configuration], but it isn't intrinsically required to be.
    pub fn get<'de, T>(&self) -> Result<T, figment::Error>
    where
        T: Deserialize<'de>,
    {
        self.data.extract::<T>()
    }

    /// Extracts and validates the [Configuration]
    pub fn configuration(&self) -> anyhow::Result<Configuration> {
        let config: Configuration = self.get()?;
        config.validate()?;
        Ok(config)
    }

    /// Returns any fields present in the merged data which [Configuration] does not use,
    /// with where they came from.
    #[must_use]
    pub fn unknown_fields(&self) -> Vec<(String, String)> {
        let Ok(data) = self.data.data() else {
            return Vec::new();
        };
        data.get(&figment::Profile::Default)
            .map(|dict| {
                dict.keys()
                    .filter(|k| !Configuration::FIELDS.contains(&k.as_str()))
                    .map(|k| {
                        (
                            k.clone(),
                            describe_source(self.data.find_metadata(k)),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// DISPLAY ////////////////////////////////////////////////////////////////////////////////////////////////////

/// One row of `--show-config` output
#[derive(Tabled)]
struct Row {
    field: String,
    value: String,
    source: String,
}

/// Where a value came from: a file path, or the provider's name
fn describe_source(meta: Option<&Metadata>) -> String {
    meta.map(|m| match &m.source {
        Some(source) => source.to_string(),
        None => m.name.to_string(),
    })
    .unwrap_or_default()
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(_, s) => s.clone(),
        Value::Char(_, c) => c.to_string(),
        Value::Bool(_, b) => b.to_string(),
        Value::Num(_, n) => n
            .to_u128()
            .map(|u| u.to_string())
            .or_else(|| n.to_i128().map(|i| i.to_string()))
            .or_else(|| n.to_f64().map(|f| f.to_string()))
            .unwrap_or_default(),
        Value::Empty(..) => "<empty>".into(),
        Value::Dict(..) => "<table>".into(),
        Value::Array(_, items) => {
            let inner: Vec<_> = items.iter().map(describe_value).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

impl Display for Manager {
    /// Tabulates the known fields, with their values and where they came from
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rows = Vec::with_capacity(Configuration::FIELDS.len());
        for &field in Configuration::FIELDS {
            match self.data.find_value(field) {
                Ok(value) => rows.push(Row {
                    field: field.into(),
                    value: describe_value(&value),
                    source: describe_source(self.data.find_metadata(field)),
                }),
                Err(e) => writeln!(f, "{field}: {e}")?,
            }
        }
        write!(f, "{}", Table::new(rows).with(Style::sharp()))
    }
}

#[cfg(test)]
mod test {
    use serde::Deserialize;

    use crate::config::{Configuration, ConfigurationOverrides, Manager};
    use crate::util::{make_test_tempfile, ByteCount};

    #[test]
    fn defaults() {
        let mgr = Manager::without_files();
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(Configuration::default(), result);
    }

    #[test]
    fn cli_beats_file_beats_default() {
        let (path, _tempdir) = make_test_tempfile(
            r#"
            chunk_size = "1M"
            directory = "/srv/incoming"
            allow = ["10.*"]
        "#,
            "test.toml",
        );
        let cli = ConfigurationOverrides {
            directory: Some("/tmp".into()),
            ..Default::default()
        };
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        mgr.merge_provider(cli);
        let result = mgr.configuration().unwrap();
        assert_eq!(
            result,
            Configuration {
                chunk_size: ByteCount::new(1_000_000),
                directory: "/tmp".into(),
                allow: vec!["10.*".into()],
                idle_timeout: 0,
            }
        );
    }

    #[test]
    fn empty_overrides_change_nothing() {
        let mut mgr = Manager::without_files();
        mgr.merge_provider(ConfigurationOverrides::default());
        assert_eq!(mgr.configuration().unwrap(), Configuration::default());
    }

    #[test]
    fn repeated_allow_replaces_default() {
        let mut mgr = Manager::without_files();
        mgr.merge_provider(ConfigurationOverrides {
            allow: vec!["127.0.0.1".into(), "::1".into()],
            ..Default::default()
        });
        let result = mgr.configuration().unwrap();
        assert_eq!(result.allow, vec!["127.0.0.1", "::1"]);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(dir.path().join("nonexistent.toml"));
        assert!(mgr.get::<Configuration>().is_err());
    }

    #[test]
    fn invalid_values_are_refused() {
        let (path, _tempdir) = make_test_tempfile("chunk_size = 0\n", "test.toml");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        let err = mgr.configuration().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn unparseable_toml() {
        let (path, _tempdir) = make_test_tempfile(
            r"
            a = 1
            chunk_size 123 # this line is a syntax error
        ",
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        let get = mgr.get::<Configuration>();
        assert!(get.is_err());
        println!("{}", get.unwrap_err());
    }

    #[test]
    fn type_error() {
        #[derive(Deserialize)]
        struct Test {
            magic_: i32,
        }

        let (path, _tempdir) = make_test_tempfile(
            r"
            idle_timeout = true # invalid
            magic_ = 42
        ",
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        let _ = mgr.get::<Configuration>().unwrap_err();

        // The config as a whole is not broken and other things can be extracted:
        let other_struct = mgr.get::<Test>().unwrap();
        assert_eq!(other_struct.magic_, 42);
    }

    #[test]
    fn unknown_fields_are_reported() {
        let (path, _tempdir) = make_test_tempfile("chunksize = 4\n", "test.toml");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(&path);
        let unknown = mgr.unknown_fields();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].0, "chunksize");
        assert!(unknown[0].1.contains("test.toml"), "{}", unknown[0].1);
    }

    #[test]
    fn display_shows_sources() {
        let mut mgr = Manager::without_files();
        mgr.merge_provider(ConfigurationOverrides {
            idle_timeout: Some(9),
            ..Default::default()
        });
        let s = mgr.to_string();
        assert!(s.contains("idle_timeout"));
        assert!(s.contains("command line"));
        assert!(s.contains("default"));
    }

    #[test]
    fn config_files_are_listed() {
        let files = Manager::config_files();
        assert!(files.iter().any(|f| f.ends_with("sendplz.toml")));
    }
}
