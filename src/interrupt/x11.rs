//! X11 pointer watch via XInput2 raw button events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use x11rb::protocol::Event;

use super::{InterruptError, PointerButton, PointerWatch, PressCallback};
use crate::x11::{X11Context, spawn_event_thread};

/// Observes button presses on every master pointer of the default display.
///
/// Each `start` opens a fresh connection; dropping it on `stop` removes
/// the event selection server-side.
#[derive(Default)]
pub struct X11PointerWatch {
    stop: Option<Arc<AtomicBool>>,
    thread: Option<JoinHandle<()>>,
}

impl X11PointerWatch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PointerWatch for X11PointerWatch {
    fn start(&mut self, on_press: PressCallback) -> Result<(), InterruptError> {
        self.stop();

        let ctx = X11Context::connect()?;
        ctx.select_raw_button_press()?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = spawn_event_thread("x11-pointer", ctx.conn().clone(), stop.clone(), move |event| {
            if let Event::XinputRawButtonPress(press) = event {
                if let Some(button) = PointerButton::from_x11(press.detail) {
                    tracing::debug!(?button, "pointer button down");
                    on_press(button);
                }
            }
            true
        })?;

        self.stop = Some(stop);
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        // Detach: the thread exits within one poll timeout and drops the
        // connection with it.
        drop(self.thread.take());
    }
}

impl Drop for X11PointerWatch {
    fn drop(&mut self) {
        self.stop();
    }
}
