use arboard::Clipboard;

use crate::errors::{ClipError, Result};

/// What the clipboard held at one poll. A flavor that is not on the
/// clipboard reads as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    pub text: String,
    pub html: String,
}

pub trait ClipboardSource {
    fn snapshot(&mut self) -> Result<ClipboardSnapshot>;
}

/// The OS clipboard, via `arboard`.
pub struct SystemClipboard {
    inner: Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let inner = Clipboard::new().map_err(|e| ClipError::Clipboard(e.to_string()))?;
        Ok(Self { inner })
    }
}

fn flavor(result: std::result::Result<String, arboard::Error>) -> Result<String> {
    match result {
        Ok(s) => Ok(s),
        Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
        Err(e) => Err(ClipError::Clipboard(e.to_string())),
    }
}

impl ClipboardSource for SystemClipboard {
    fn snapshot(&mut self) -> Result<ClipboardSnapshot> {
        let html = flavor(self.inner.get().html())?;
        let text = flavor(self.inner.get_text())?;
        Ok(ClipboardSnapshot { text, html })
    }
}

/// Puts an entry back on the clipboard, HTML first when there is some.
pub fn write_to_clipboard(text: &str, html: &str) -> Result<()> {
    let mut cb = Clipboard::new().map_err(|e| ClipError::Clipboard(e.to_string()))?;
    let result = if html.is_empty() {
        cb.set_text(text)
    } else {
        cb.set_html(html, Some(text))
    };
    result.map_err(|e| ClipError::Clipboard(e.to_string()))
}
