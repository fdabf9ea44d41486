//! Input event emission — one character in, one synthetic key press out.
//!
//! Printable characters travel as Unicode text payloads so the active
//! keyboard layout, shift state, and whether the character has a physical
//! key at all are irrelevant. Newline, tab, and backspace use dedicated
//! virtual keys.

pub mod clipboard;
pub mod enigo;

use std::future::Future;

pub use self::clipboard::XclipClipboard;
pub use self::enigo::EnigoEmitter;

/// Injection failure.
///
/// The engine treats every injection as fire-and-forget; these errors
/// are only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    /// The keystroke backend could not be initialised or rejected an event.
    #[error("keystroke backend: {0}")]
    Backend(String),
    /// Writing to the system clipboard failed.
    #[error("clipboard: {0}")]
    Clipboard(String),
}

/// One press/release pair delivered to the focused application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// Unicode text payload, bypassing keyboard-layout lookup.
    Text(char),
    /// Return / Enter virtual key.
    Return,
    /// Tab virtual key.
    Tab,
    /// Backspace virtual key.
    Backspace,
    /// Platform paste shortcut (Ctrl+V, ⌘V on macOS).
    Paste,
}

/// Map a character to the keystroke that reproduces it.
///
/// Returns `None` for `'\r'`: the `'\n'` of a CRLF pair already emits
/// Return, and a lone carriage return has no visible effect in text
/// fields.
pub fn keystroke_for(c: char) -> Option<Keystroke> {
    match c {
        '\n' => Some(Keystroke::Return),
        '\t' => Some(Keystroke::Tab),
        '\r' => None,
        '\u{8}' | '\u{7f}' => Some(Keystroke::Backspace),
        other => Some(Keystroke::Text(other)),
    }
}

/// Delivers synthetic keystrokes at the OS input layer.
///
/// Implementations are stateless from the engine's point of view and
/// must be callable from any worker thread.
pub trait KeyEmitter: Send + Sync {
    /// Emit a single press/release pair.
    fn send(&self, stroke: Keystroke) -> Result<(), InjectError>;

    /// Emit the keystroke reproducing `c`.
    fn emit(&self, c: char) -> Result<(), InjectError> {
        match keystroke_for(c) {
            Some(stroke) => self.send(stroke),
            None => Ok(()),
        }
    }
}

/// Places text on the system clipboard.
pub trait ClipboardWriter: Send + Sync {
    /// Replace the clipboard contents with `text`.
    fn write(&self, text: &str) -> impl Future<Output = Result<(), InjectError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_characters_use_virtual_keys() {
        assert_eq!(keystroke_for('\n'), Some(Keystroke::Return));
        assert_eq!(keystroke_for('\t'), Some(Keystroke::Tab));
        assert_eq!(keystroke_for('\u{7f}'), Some(Keystroke::Backspace));
    }

    #[test]
    fn printable_characters_use_text_payload() {
        for c in ['a', 'Z', ' ', 'é', 'ß', '😀', '中'] {
            assert_eq!(keystroke_for(c), Some(Keystroke::Text(c)));
        }
    }

    #[test]
    fn carriage_return_emits_nothing() {
        assert_eq!(keystroke_for('\r'), None);
    }
}
