// Transfer kind selector
// (c) 2024 sendplz contributors

use std::str::FromStr as _;

/// The transfer kind governing a connection.
///
/// This travels out-of-band, as the path component of the connection URI,
/// and is fixed for the lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Selector {
    /// Clipboard text replication
    Clipboard,
    /// Whole-file streaming
    File,
}

impl Selector {
    /// Interprets a connection path (e.g. `/file`).
    ///
    /// Returns `None` for anything that isn't a known selector.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.strip_prefix('/')?;
        Self::from_str(name).ok()
    }

    /// The connection path for this selector
    #[must_use]
    pub fn path(self) -> String {
        format!("/{self}")
    }
}
