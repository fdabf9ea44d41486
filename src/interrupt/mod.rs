//! Interruption coordinator — pause typing on any pointer click.
//!
//! While a session is active a system-wide observer watches for pointer
//! button-down events, whichever application has focus. Any press raises
//! the session's stop flag. Keyboard events are deliberately not
//! observed: the engine's own synthetic key presses would immediately
//! interrupt every session.

pub mod x11;

use std::sync::Arc;

use crate::engine::StopSignal;
use crate::x11::X11Error;

pub use self::x11::X11PointerWatch;

/// Pointer observer error.
#[derive(Debug, thiserror::Error)]
pub enum InterruptError {
    #[error(transparent)]
    X11(#[from] X11Error),
    #[error("event thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Which button went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    /// Middle or any extra button, by platform button number.
    Other(u32),
}

impl PointerButton {
    /// Classify an X11 core button number.
    ///
    /// Buttons 4–7 are scroll wheel steps, not presses, and yield `None`.
    pub fn from_x11(button: u32) -> Option<Self> {
        match button {
            1 => Some(Self::Left),
            3 => Some(Self::Right),
            4..=7 | 0 => None,
            n => Some(Self::Other(n)),
        }
    }
}

/// Callback run on the platform's event thread for every button-down.
pub type PressCallback = Box<dyn Fn(PointerButton) + Send + Sync>;

/// Platform hook delivering global pointer button-down events.
pub trait PointerWatch: Send {
    /// Begin delivering presses to `on_press`.
    fn start(&mut self, on_press: PressCallback) -> Result<(), InterruptError>;

    /// Stop delivering presses. Safe to call when not started.
    fn stop(&mut self);
}

/// Installs the pointer observer for the lifetime of a session.
pub struct InterruptionCoordinator<W: PointerWatch> {
    watch: W,
    stop: StopSignal,
    on_interrupt: Arc<dyn Fn(PointerButton) + Send + Sync>,
    armed: bool,
}

impl<W: PointerWatch> InterruptionCoordinator<W> {
    /// `on_interrupt` runs after the stop flag is raised, on the
    /// observer's thread.
    pub fn new<F>(watch: W, stop: StopSignal, on_interrupt: F) -> Self
    where
        F: Fn(PointerButton) + Send + Sync + 'static,
    {
        Self {
            watch,
            stop,
            on_interrupt: Arc::new(on_interrupt),
            armed: false,
        }
    }

    /// Install the observer. Redundant calls are no-ops.
    pub fn arm(&mut self) -> Result<(), InterruptError> {
        if self.armed {
            return Ok(());
        }

        let stop = self.stop.clone();
        let on_interrupt = self.on_interrupt.clone();
        self.watch.start(Box::new(move |button| {
            stop.request();
            on_interrupt(button);
        }))?;

        self.armed = true;
        tracing::debug!("pointer interruption armed");
        Ok(())
    }

    /// Remove the observer. Redundant calls are no-ops.
    pub fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        self.watch.stop();
        self.armed = false;
        tracing::debug!("pointer interruption disarmed");
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl<W: PointerWatch> Drop for InterruptionCoordinator<W> {
    fn drop(&mut self) {
        self.disarm();
    }
}
