//! Resume registrar — best-effort claim of a global shortcut.
//!
//! The shortcut namespace is shared with every other process on the
//! display, so a failed claim is an expected outcome: [`ResumeRegistrar::try_claim`]
//! reports it as `false` and the caller picks a different hint for the
//! user. Platform adapters implement [`ShortcutBackend`].

pub mod keybinding;
pub mod x11;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use self::keybinding::KeyCombo;
use crate::x11::X11Error;

pub use self::x11::X11ShortcutBackend;

/// Hotkey error.
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error(transparent)]
    X11(#[from] X11Error),
    #[error("invalid key binding: {0:?}")]
    InvalidBinding(String),
    #[error("unknown key: {0:?}")]
    UnknownKey(String),
    #[error("no keycode produces {0} on this keyboard")]
    NoKeycode(String),
    #[error("event thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Caller-managed numeric shortcut identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortcutId(pub u32);

impl fmt::Display for ShortcutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registers global key combinations with the platform.
///
/// Implementations deliver the ID of each fired shortcut on the channel
/// returned by [`events`](Self::events), from whatever thread the
/// platform delivers key events on.
pub trait ShortcutBackend: Send {
    /// Grab `combo` under `id`.
    ///
    /// Returns `Ok(false)` when another consumer already owns the
    /// combination; any partial grab is released before returning.
    fn grab(&mut self, id: ShortcutId, combo: &KeyCombo) -> Result<bool, HotkeyError>;

    /// Release the grab held under `id`, if any.
    fn ungrab(&mut self, id: ShortcutId);

    /// Take the fired-shortcut channel. Returns `None` after the first call.
    fn events(&mut self) -> Option<UnboundedReceiver<ShortcutId>>;
}

type FireCallback = Arc<dyn Fn() + Send + Sync>;
type Claims = Arc<Mutex<HashMap<ShortcutId, FireCallback>>>;

/// Claims and releases global shortcuts, dispatching fired shortcuts to
/// their callbacks.
pub struct ResumeRegistrar<B: ShortcutBackend> {
    backend: B,
    claims: Claims,
    dispatcher: Option<JoinHandle<()>>,
}

impl<B: ShortcutBackend> ResumeRegistrar<B> {
    /// Wrap `backend`, spawning a dispatcher task on the current tokio
    /// runtime.
    pub fn new(mut backend: B) -> Self {
        let claims: Claims = Arc::default();

        let dispatcher = backend.events().map(|mut events| {
            let claims = claims.clone();
            tokio::spawn(async move {
                while let Some(id) = events.recv().await {
                    let callback = claims.lock().unwrap_or_else(PoisonError::into_inner).get(&id).cloned();
                    match callback {
                        Some(callback) => {
                            tracing::debug!(shortcut = %id, "shortcut fired");
                            callback();
                        }
                        None => tracing::debug!(shortcut = %id, "fired shortcut no longer claimed"),
                    }
                }
            })
        });

        Self {
            backend,
            claims,
            dispatcher,
        }
    }

    /// Attempt to claim `combo` under `id`; `on_fire` runs each time the
    /// shortcut is pressed while claimed.
    ///
    /// Re-claiming an ID this registrar already holds replaces the
    /// previous claim. Backend errors are logged and reported as `false`.
    pub fn try_claim<F>(&mut self, id: ShortcutId, combo: &KeyCombo, on_fire: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_claimed(id) {
            self.release(id);
        }

        match self.backend.grab(id, combo) {
            Ok(true) => {
                self.lock_claims().insert(id, Arc::new(on_fire));
                tracing::info!(shortcut = %id, combo = %combo, "claimed global shortcut");
                true
            }
            Ok(false) => {
                tracing::debug!(shortcut = %id, combo = %combo, "global shortcut is held by another application");
                false
            }
            Err(e) => {
                tracing::warn!(shortcut = %id, combo = %combo, error = %e, "global shortcut claim failed");
                false
            }
        }
    }

    /// Release a previously claimed shortcut. Safe if never claimed.
    pub fn release(&mut self, id: ShortcutId) {
        if self.lock_claims().remove(&id).is_some() {
            self.backend.ungrab(id);
            tracing::debug!(shortcut = %id, "released global shortcut");
        }
    }

    pub fn is_claimed(&self, id: ShortcutId) -> bool {
        self.lock_claims().contains_key(&id)
    }

    fn lock_claims(&self) -> std::sync::MutexGuard<'_, HashMap<ShortcutId, FireCallback>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: ShortcutBackend> Drop for ResumeRegistrar<B> {
    fn drop(&mut self) {
        let ids: Vec<ShortcutId> = self.lock_claims().keys().copied().collect();
        for id in ids {
            self.release(id);
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ShortcutTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn combo() -> KeyCombo {
        KeyCombo::default_resume()
    }

    const RESUME: ShortcutId = ShortcutId(7);

    #[tokio::test]
    async fn claim_and_release() {
        let table = ShortcutTable::new();
        let mut registrar = ResumeRegistrar::new(table.backend());

        assert!(registrar.try_claim(RESUME, &combo(), || {}));
        assert!(registrar.is_claimed(RESUME));
        assert!(table.is_held(&combo()));

        registrar.release(RESUME);
        assert!(!registrar.is_claimed(RESUME));
        assert!(!table.is_held(&combo()));
    }

    #[tokio::test]
    async fn release_without_claim_is_harmless() {
        let table = ShortcutTable::new();
        let mut registrar = ResumeRegistrar::new(table.backend());
        registrar.release(RESUME);
        registrar.release(RESUME);
        assert!(!registrar.is_claimed(RESUME));
    }

    #[tokio::test]
    async fn second_registrar_is_refused_until_first_releases() {
        let table = ShortcutTable::new();
        let mut first = ResumeRegistrar::new(table.backend());
        let mut second = ResumeRegistrar::new(table.backend());

        assert!(first.try_claim(RESUME, &combo(), || {}));
        assert!(!second.try_claim(RESUME, &combo(), || {}));
        assert!(first.is_claimed(RESUME));
        assert!(!second.is_claimed(RESUME));

        first.release(RESUME);
        assert!(second.try_claim(RESUME, &combo(), || {}));
    }

    #[tokio::test]
    async fn reclaim_by_same_registrar_replaces_claim() {
        let table = ShortcutTable::new();
        let mut registrar = ResumeRegistrar::new(table.backend());
        assert!(registrar.try_claim(RESUME, &combo(), || {}));
        assert!(registrar.try_claim(RESUME, &combo(), || {}));
        assert!(table.is_held(&combo()));
    }

    #[tokio::test]
    async fn pressing_claimed_shortcut_runs_callback() {
        let table = ShortcutTable::new();
        let mut registrar = ResumeRegistrar::new(table.backend());
        let fired = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(tokio::sync::Notify::new());

        let callback = {
            let fired = fired.clone();
            let notify = notify.clone();
            move || {
                fired.fetch_add(1, Ordering::SeqCst);
                notify.notify_one();
            }
        };
        assert!(registrar.try_claim(RESUME, &combo(), callback));

        assert!(table.press(&combo()));
        notify.notified().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_releases_all_claims() {
        let table = ShortcutTable::new();
        {
            let mut registrar = ResumeRegistrar::new(table.backend());
            assert!(registrar.try_claim(RESUME, &combo(), || {}));
        }
        assert!(!table.is_held(&combo()));
    }
}
