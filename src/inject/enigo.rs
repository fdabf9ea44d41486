//! Keystroke delivery through the `enigo` crate.

use ::enigo::{Direction, Enigo, Key, Keyboard, Settings};

use super::{InjectError, KeyEmitter, Keystroke};

/// Emits keystrokes into the focused window via `enigo`.
///
/// A new [`Enigo`] handle is created per keystroke: the handle is not
/// `Send`, while the typing worker migrates between runtime threads at
/// every sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoEmitter;

impl EnigoEmitter {
    pub fn new() -> Self {
        Self
    }
}

fn backend(e: impl std::fmt::Display) -> InjectError {
    InjectError::Backend(e.to_string())
}

impl KeyEmitter for EnigoEmitter {
    fn send(&self, stroke: Keystroke) -> Result<(), InjectError> {
        let mut enigo = Enigo::new(&Settings::default()).map_err(backend)?;

        match stroke {
            Keystroke::Text(c) => {
                let mut buf = [0u8; 4];
                enigo.text(c.encode_utf8(&mut buf)).map_err(backend)?;
            }
            Keystroke::Return => enigo.key(Key::Return, Direction::Click).map_err(backend)?,
            Keystroke::Tab => enigo.key(Key::Tab, Direction::Click).map_err(backend)?,
            Keystroke::Backspace => enigo.key(Key::Backspace, Direction::Click).map_err(backend)?,
            Keystroke::Paste => {
                #[cfg(target_os = "macos")]
                let modifier = Key::Meta;
                #[cfg(not(target_os = "macos"))]
                let modifier = Key::Control;

                enigo.key(modifier, Direction::Press).map_err(backend)?;
                let pressed = enigo.key(Key::Unicode('v'), Direction::Click);
                // Release the modifier even if the V press failed.
                enigo.key(modifier, Direction::Release).map_err(backend)?;
                pressed.map_err(backend)?;
            }
        }

        Ok(())
    }
}
