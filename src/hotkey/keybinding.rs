//! Key combination parsing and X11 keycode resolution.
//!
//! A [`KeyCombo`] is the platform-neutral form of a user string such as
//! `"Ctrl+Alt+R"`. Resolving it against a live keyboard mapping yields a
//! [`Binding`] that can be grabbed.

use std::fmt;

use x11rb::protocol::xproto::{Keycode, Keysym};

use super::HotkeyError;
use crate::x11::X11Context;

/// Modifier bits, using the X11 core protocol values.
pub mod modifiers {
    pub const SHIFT: u16 = 0x0001;
    pub const CONTROL: u16 = 0x0004;
    pub const ALT: u16 = 0x0008; // Mod1
    pub const SUPER: u16 = 0x0040; // Mod4

    /// Every modifier a combination may carry.
    pub const ALL: u16 = SHIFT | CONTROL | ALT | SUPER;
}

/// Non-modifier key of a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Lowercase ASCII letter or digit.
    Char(char),
    /// Function key F1–F12.
    F(u8),
    Space,
    Return,
    Tab,
    Escape,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
}

impl Key {
    fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        let key = match lower.as_str() {
            "space" => Self::Space,
            "return" | "enter" => Self::Return,
            "tab" => Self::Tab,
            "escape" | "esc" => Self::Escape,
            "insert" | "ins" => Self::Insert,
            "delete" | "del" => Self::Delete,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" | "pgup" => Self::PageUp,
            "pagedown" | "pgdn" => Self::PageDown,
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => Self::Char(c),
                    (Some('f'), Some(_)) => {
                        let n: u8 = lower[1..].parse().ok()?;
                        if !(1..=12).contains(&n) {
                            return None;
                        }
                        Self::F(n)
                    }
                    _ => return None,
                }
            }
        };
        Some(key)
    }

    /// X11 keysym for this key.
    pub fn keysym(self) -> Keysym {
        match self {
            // Latin-1 keysyms equal their code points.
            Self::Char(c) => c as Keysym,
            Self::F(n) => 0xffbe + Keysym::from(n) - 1,
            Self::Space => 0x0020,
            Self::Return => 0xff0d,
            Self::Tab => 0xff09,
            Self::Escape => 0xff1b,
            Self::Insert => 0xff63,
            Self::Delete => 0xffff,
            Self::Home => 0xff50,
            Self::End => 0xff57,
            Self::PageUp => 0xff55,
            Self::PageDown => 0xff56,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Self::F(n) => write!(f, "F{n}"),
            Self::Space => f.write_str("Space"),
            Self::Return => f.write_str("Return"),
            Self::Tab => f.write_str("Tab"),
            Self::Escape => f.write_str("Escape"),
            Self::Insert => f.write_str("Insert"),
            Self::Delete => f.write_str("Delete"),
            Self::Home => f.write_str("Home"),
            Self::End => f.write_str("End"),
            Self::PageUp => f.write_str("PageUp"),
            Self::PageDown => f.write_str("PageDown"),
        }
    }
}

/// A global shortcut: modifier mask plus one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub modifiers: u16,
    pub key: Key,
}

impl KeyCombo {
    /// Parse `"Mod+Mod+Key"`, case-insensitively.
    ///
    /// Modifiers: `Ctrl`/`Control`, `Shift`, `Alt`, `Super`/`Meta`/`Cmd`/`Win`.
    pub fn parse(combo: &str) -> Result<Self, HotkeyError> {
        let invalid = || HotkeyError::InvalidBinding(combo.to_string());

        let parts: Vec<&str> = combo.split('+').map(str::trim).collect();
        let (key_part, mod_parts) = parts.split_last().ok_or_else(invalid)?;
        if key_part.is_empty() {
            return Err(invalid());
        }

        let mut mods = 0u16;
        for part in mod_parts {
            let bit = match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => modifiers::CONTROL,
                "shift" => modifiers::SHIFT,
                "alt" => modifiers::ALT,
                "super" | "meta" | "cmd" | "win" => modifiers::SUPER,
                _ => return Err(invalid()),
            };
            if mods & bit != 0 {
                return Err(invalid());
            }
            mods |= bit;
        }

        let key = Key::parse(key_part).ok_or_else(|| HotkeyError::UnknownKey(key_part.to_string()))?;

        Ok(Self { modifiers: mods, key })
    }

    /// `Ctrl+Alt+R`.
    pub fn default_resume() -> Self {
        Self {
            modifiers: modifiers::CONTROL | modifiers::ALT,
            key: Key::Char('r'),
        }
    }

    /// Resolve against the display's keyboard mapping.
    pub fn resolve(&self, ctx: &X11Context) -> Result<Binding, HotkeyError> {
        let keycode = ctx
            .keycode_for(self.key.keysym())?
            .ok_or_else(|| HotkeyError::NoKeycode(self.to_string()))?;

        Ok(Binding {
            keycode,
            modifiers: self.modifiers,
            raw: self.to_string(),
        })
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u16, &str); 4] = [
            (modifiers::CONTROL, "Ctrl"),
            (modifiers::ALT, "Alt"),
            (modifiers::SHIFT, "Shift"),
            (modifiers::SUPER, "Super"),
        ];
        for (bit, name) in NAMES {
            if self.modifiers & bit != 0 {
                write!(f, "{name}+")?;
            }
        }
        write!(f, "{}", self.key)
    }
}

impl std::str::FromStr for KeyCombo {
    type Err = HotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A combination resolved to a concrete keycode on one display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub keycode: Keycode,
    pub modifiers: u16,
    /// Canonical combination text, for logs.
    pub raw: String,
}

impl Binding {
    /// Whether a key press with `keycode` and modifier `state` triggers
    /// this binding, ignoring lock modifiers.
    pub fn matches(&self, keycode: Keycode, state: u16) -> bool {
        self.keycode == keycode && state & modifiers::ALL == self.modifiers
    }
}
