//! Tracing helpers
// (c) 2024 sendplz contributors

use std::{
    fs::File,
    io::Write,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use indicatif::MultiProgress;
use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter, Layer};

const STANDARD_ENV_VAR: &str = "RUST_LOG";
const LOG_FILE_DETAIL_ENV_VAR: &str = "RUST_LOG_FILE_DETAIL";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// A log filter, and whether it came from the environment
struct Filter {
    filter: EnvFilter,
    from_env: bool,
}

impl Filter {
    /// Reads the filter from `key` in the environment.
    /// If unset, we log only our own events at `level`; if set but invalid, that's an error.
    fn from_env_or(key: &str, level: &str) -> anyhow::Result<Self> {
        match EnvFilter::try_from_env(key) {
            Ok(filter) => Ok(Self {
                filter,
                from_env: true,
            }),
            Err(e) if std::env::var(key).is_ok() => {
                anyhow::bail!("{key} (set in environment) was invalid: {e}")
            }
            Err(_) => Ok(Self {
                filter: EnvFilter::new(format!("{}={level}", env!("CARGO_CRATE_NAME"))),
                from_env: false,
            }),
        }
    }
}

fn console_layer(level: &str, display: Option<&MultiProgress>) -> anyhow::Result<BoxedLayer> {
    let Filter { filter, from_env } = Filter::from_env_or(STANDARD_ENV_VAR, level)?;
    // Targets are only interesting when the user has asked for other crates' events
    let format = fmt::layer().compact().with_target(from_env);
    Ok(match display {
        None => format
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        Some(mp) => format
            .with_writer(ProgressWriter::wrap(mp))
            .with_filter(filter)
            .boxed(),
    })
}

fn file_layer(level: &str, filename: &str) -> anyhow::Result<BoxedLayer> {
    let out_file = Arc::new(
        File::create(filename).with_context(|| format!("failed to open log file {filename}"))?,
    );
    let Filter { filter, from_env } = if std::env::var(LOG_FILE_DETAIL_ENV_VAR).is_ok() {
        Filter::from_env_or(LOG_FILE_DETAIL_ENV_VAR, level)?
    } else {
        Filter::from_env_or(STANDARD_ENV_VAR, level)?
    };
    Ok(fmt::layer()
        .with_writer(out_file)
        .with_target(from_env)
        .compact()
        .with_ansi(false)
        .with_filter(filter)
        .boxed())
}

/// Sets up tracing to the console (via a `MultiProgress`, if there is one) and optionally to file.
///
/// By default we log only our own events, at the given level.
/// This can be overridden by setting `RUST_LOG`; the file output can be separately
/// controlled by `RUST_LOG_FILE_DETAIL`.
///
/// For examples, see <https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables>
///
/// **CAUTION:** If this function fails, tracing won't be set up; callers must take extra care to report the error.
pub fn setup(
    level: &str,
    display: Option<&MultiProgress>,
    filename: Option<&str>,
) -> anyhow::Result<()> {
    let mut layers = vec![console_layer(level, display)?];
    if let Some(filename) = filename {
        layers.push(file_layer(level, filename)?);
    }
    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("failed to initialise tracing")
}

/// A wrapper type so tracing can output in a way that doesn't mess up `MultiProgress`
struct ProgressWriter {
    display: MultiProgress,
}

impl ProgressWriter {
    fn wrap(display: &MultiProgress) -> Mutex<Self> {
        Mutex::new(Self {
            display: display.clone(),
        })
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = std::str::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let msg = msg.trim_end_matches('\n');
        if self.display.is_hidden() {
            eprintln!("{msg}");
        } else {
            self.display.println(msg)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn setup_tracing_for_tests() {
    // Several tests may race to do this; only the first wins
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
