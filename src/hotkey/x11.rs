//! X11 shortcut backend — root-window key grabs plus an event thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use x11rb::protocol::Event;

use super::keybinding::{Binding, KeyCombo};
use super::{HotkeyError, ShortcutBackend, ShortcutId};
use crate::x11::{self as x, X11Context};

type Grabs = Arc<Mutex<HashMap<ShortcutId, Binding>>>;

/// Grabs shortcuts on the root window of the default display.
///
/// Owns a dedicated connection, so two backends in one process contend
/// for a combination exactly like two separate applications would.
pub struct X11ShortcutBackend {
    ctx: X11Context,
    grabs: Grabs,
    events: Option<UnboundedReceiver<ShortcutId>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl X11ShortcutBackend {
    /// Connect and start the key event thread.
    pub fn connect() -> Result<Self, HotkeyError> {
        let ctx = X11Context::connect()?;
        let grabs: Grabs = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = {
            let grabs = grabs.clone();
            x::spawn_event_thread("x11-hotkey", ctx.conn().clone(), stop.clone(), move |event| {
                let Event::KeyPress(press) = event else {
                    return true;
                };
                let state = u16::from(press.state);
                let fired = grabs
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .find(|(_, binding)| binding.matches(press.detail, state))
                    .map(|(id, _)| *id);
                match fired {
                    // Receiver dropped — shut down.
                    Some(id) => tx.send(id).is_ok(),
                    None => true,
                }
            })?
        };

        Ok(Self {
            ctx,
            grabs,
            events: Some(rx),
            stop,
            thread: Some(thread),
        })
    }

    fn lock_grabs(&self) -> std::sync::MutexGuard<'_, HashMap<ShortcutId, Binding>> {
        self.grabs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShortcutBackend for X11ShortcutBackend {
    fn grab(&mut self, id: ShortcutId, combo: &KeyCombo) -> Result<bool, HotkeyError> {
        let binding = combo.resolve(&self.ctx)?;

        if !self.ctx.grab_key(&binding)? {
            // Drop whichever lock-mask variants did succeed.
            self.ctx.ungrab_key(&binding);
            return Ok(false);
        }

        self.lock_grabs().insert(id, binding);
        Ok(true)
    }

    fn ungrab(&mut self, id: ShortcutId) {
        let removed = self.lock_grabs().remove(&id);
        if let Some(binding) = removed {
            self.ctx.ungrab_key(&binding);
        }
    }

    fn events(&mut self) -> Option<UnboundedReceiver<ShortcutId>> {
        self.events.take()
    }
}

impl Drop for X11ShortcutBackend {
    fn drop(&mut self) {
        let bindings: Vec<Binding> = self.lock_grabs().drain().map(|(_, b)| b).collect();
        for binding in &bindings {
            self.ctx.ungrab_key(binding);
        }
        self.stop.store(true, Ordering::Relaxed);
        // The thread notices the flag within one poll timeout.
        drop(self.thread.take());
    }
}
