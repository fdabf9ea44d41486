//! X11 integration — connection, key grabs, raw pointer events, event thread.
//!
//! Wraps `x11rb::rust_connection::RustConnection` for the two OS-facing
//! observers of a typing session: the resume shortcut grab and the
//! system-wide pointer button observer. Each observer owns its own
//! connection so their grabs and event selections are independent.

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::Event;
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{self, ConnectionExt as _, GrabMode, Keycode, Keysym, ModMask, Window};
use x11rb::rust_connection::RustConnection;

use crate::hotkey::keybinding::Binding;

/// X11 request or connection failure.
#[derive(Debug, thiserror::Error)]
#[error("x11: {0}")]
pub struct X11Error(pub String);

fn x11_err(context: &str, e: impl std::fmt::Display) -> X11Error {
    X11Error(format!("{context}: {e}"))
}

/// Lock modifier bits to mask during XGrabKey registration.
///
/// NumLock = Mod2 (bit 4), CapsLock = Lock (bit 1).
/// Each grab is registered 4 times with all combinations of these bits
/// so the shortcut fires regardless of lock state.
pub const LOCK_MASK: u16 = 0x0002;
pub const NUM_LOCK_MASK: u16 = 0x0010;
const LOCK_MASKS: [u16; 4] = [0, LOCK_MASK, NUM_LOCK_MASK, LOCK_MASK | NUM_LOCK_MASK];

/// X11 connection context for one observer.
pub struct X11Context {
    conn: Arc<RustConnection>,
    root: Window,
}

impl X11Context {
    /// Connect to the default display.
    pub fn connect() -> Result<Self, X11Error> {
        let (conn, screen_num) = RustConnection::connect(None).map_err(|e| x11_err("connect failed", e))?;
        let root = conn.setup().roots[screen_num].root;

        Ok(Self {
            conn: Arc::new(conn),
            root,
        })
    }

    /// Register a global key grab on the root window.
    ///
    /// Registers 4 grabs per binding (with/without NumLock/CapsLock).
    /// Returns `Ok(true)` on success, `Ok(false)` if any grab failed
    /// (another application holds it), `Err` on connection error.
    pub fn grab_key(&self, binding: &Binding) -> Result<bool, X11Error> {
        let mut all_ok = true;

        for &lock_mask in &LOCK_MASKS {
            let mods = ModMask::from(binding.modifiers | lock_mask);

            let cookie = xproto::grab_key(
                &*self.conn,
                true, // owner_events
                self.root,
                mods,
                binding.keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(|e| x11_err("grab_key send", e))?;

            // An error reply here means another client owns the combination.
            if let Err(e) = cookie.check() {
                tracing::warn!(
                    binding = %binding.raw,
                    lock_mask,
                    error = %e,
                    "XGrabKey failed, combination is held by another application"
                );
                all_ok = false;
            }
        }

        Ok(all_ok)
    }

    /// Unregister a global key grab from the root window.
    ///
    /// Ungrabs all 4 lock-mask variants. Best-effort, errors are logged.
    pub fn ungrab_key(&self, binding: &Binding) {
        for &lock_mask in &LOCK_MASKS {
            let mods = ModMask::from(binding.modifiers | lock_mask);

            if let Err(e) = xproto::ungrab_key(&*self.conn, binding.keycode, self.root, mods) {
                tracing::debug!(binding = %binding.raw, error = %e, "XUngrabKey failed");
            }
        }

        if let Err(e) = self.conn.flush() {
            tracing::debug!(error = %e, "flush after ungrab failed");
        }
    }

    /// Find the first keycode whose mapping produces `keysym`.
    pub fn keycode_for(&self, keysym: Keysym) -> Result<Option<Keycode>, X11Error> {
        let setup = self.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);

        let mapping = self
            .conn
            .get_keyboard_mapping(min, max - min + 1)
            .map_err(|e| x11_err("get_keyboard_mapping", e))?
            .reply()
            .map_err(|e| x11_err("get_keyboard_mapping reply", e))?;

        let per = usize::from(mapping.keysyms_per_keycode);
        if per == 0 {
            return Ok(None);
        }

        Ok(mapping
            .keysyms
            .chunks(per)
            .position(|syms| syms.contains(&keysym))
            .and_then(|i| u8::try_from(i).ok())
            .map(|i| min + i))
    }

    /// Ask for XInput2 raw button-press events from every master device.
    ///
    /// Raw events are delivered to the root window regardless of which
    /// client has focus or an active pointer grab.
    pub fn select_raw_button_press(&self) -> Result<(), X11Error> {
        if self
            .conn
            .extension_information(xinput::X11_EXTENSION_NAME)
            .map_err(|e| x11_err("query XInputExtension", e))?
            .is_none()
        {
            return Err(X11Error("XInputExtension not available".into()));
        }

        self.conn
            .xinput_xi_query_version(2, 0)
            .map_err(|e| x11_err("xi_query_version", e))?
            .reply()
            .map_err(|e| x11_err("xi_query_version reply", e))?;

        let mask = xinput::EventMask {
            deviceid: xinput::Device::ALL_MASTER.into(),
            mask: vec![xinput::XIEventMask::RAW_BUTTON_PRESS.into()],
        };
        self.conn
            .xinput_xi_select_events(self.root, &[mask])
            .map_err(|e| x11_err("xi_select_events", e))?
            .check()
            .map_err(|e| x11_err("xi_select_events reply", e))?;

        Ok(())
    }

    /// Get a shared reference to the X11 connection.
    pub fn conn(&self) -> &Arc<RustConnection> {
        &self.conn
    }
}

/// Spawn a dedicated thread that polls the X11 connection for events.
///
/// Uses `nix::poll()` on the connection fd with a 100ms timeout. When
/// readable, drains all available events via `poll_for_event()` and
/// hands each to `on_event`; returning `false` ends the thread. Checks
/// the `stop` flag each iteration for clean shutdown.
pub fn spawn_event_thread<F>(
    name: &str,
    conn: Arc<RustConnection>,
    stop: Arc<AtomicBool>,
    mut on_event: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut(Event) -> bool + Send + 'static,
{
    std::thread::Builder::new().name(name.into()).spawn(move || {
        let raw_fd = conn.stream().as_raw_fd();

        while !stop.load(Ordering::Relaxed) {
            // SAFETY: raw_fd is the X11 connection fd, valid while conn is alive.
            let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
            let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];

            match poll(&mut fds, PollTimeout::from(100u16)) {
                Ok(0) => continue, // Timeout — check stop flag.
                Ok(_) => loop {
                    match conn.poll_for_event() {
                        Ok(Some(event)) => {
                            if !on_event(event) {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "X11 connection error");
                            return;
                        }
                    }
                },
                Err(nix::Error::EINTR) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "poll error on X11 fd");
                    return;
                }
            }
        }
    })
}
