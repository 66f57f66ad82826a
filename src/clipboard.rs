// Local clipboard access
// (c) 2024 sendplz contributors

use std::sync::Mutex;

use anyhow::Context as _;

/// Access to a clipboard holding a single text value.
///
/// The clipboard is a process-wide resource. Concurrent writers race, last write wins.
pub trait Clipboard: Send + Sync {
    /// Reads the current text content
    fn read(&self) -> anyhow::Result<String>;
    /// Replaces the text content
    fn write(&self, text: &str) -> anyhow::Result<()>;
}

/// The operating system clipboard.
///
/// The underlying handle is opened lazily and then kept for the life of this object.
/// Some platforms (notably X11) only serve clipboard contents while the owning handle is alive.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<arboard::Clipboard>>,
}

impl std::fmt::Debug for SystemClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemClipboard").finish_non_exhaustive()
    }
}

impl SystemClipboard {
    fn with_handle<T>(
        &self,
        f: impl FnOnce(&mut arboard::Clipboard) -> Result<T, arboard::Error>,
    ) -> anyhow::Result<T> {
        let mut guard = self
            .handle
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(arboard::Clipboard::new().context("failed to access clipboard")?);
        }
        let handle = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("clipboard unavailable"))?;
        Ok(f(handle)?)
    }
}

impl Clipboard for SystemClipboard {
    fn read(&self) -> anyhow::Result<String> {
        self.with_handle(arboard::Clipboard::get_text)
            .context("failed to read clipboard")
    }

    fn write(&self, text: &str) -> anyhow::Result<()> {
        self.with_handle(|c| c.set_text(text))
            .context("failed to write clipboard")
    }
}

/// A clipboard which lives only in memory
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<String>,
}

impl MemoryClipboard {
    /// Constructor with initial content
    #[must_use]
    pub fn new(content: &str) -> Self {
        Self {
            content: Mutex::new(content.to_owned()),
        }
    }
}

impl Clipboard for MemoryClipboard {
    fn read(&self) -> anyhow::Result<String> {
        Ok(self
            .content
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?
            .clone())
    }

    fn write(&self, text: &str) -> anyhow::Result<()> {
        *self
            .content
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))? = text.to_owned();
        Ok(())
    }
}
