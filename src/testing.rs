//! In-memory doubles for the OS-facing seams.
//!
//! Lets the engine, coordinator, registrar and controller run without a
//! display: keystrokes are recorded, the clipboard is a string, pointer
//! presses are triggered by hand, and the global shortcut namespace is a
//! shared table.
//!
//! ```
//! use humantype::inject::KeyEmitter;
//! use humantype::testing::RecordingEmitter;
//!
//! let emitter = RecordingEmitter::new();
//! for c in "hi!".chars() {
//!     emitter.emit(c).unwrap();
//! }
//! assert_eq!(emitter.visible_text(), "hi!");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::controller::{ResumeHint, SessionObserver};
use crate::hotkey::keybinding::KeyCombo;
use crate::hotkey::{HotkeyError, ShortcutBackend, ShortcutId};
use crate::inject::{ClipboardWriter, InjectError, KeyEmitter, Keystroke};
use crate::interrupt::{InterruptError, PointerButton, PointerWatch, PressCallback};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every keystroke instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    strokes: Arc<Mutex<Vec<Keystroke>>>,
    fail: bool,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// An emitter whose every send fails (after recording the attempt).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn strokes(&self) -> Vec<Keystroke> {
        lock(&self.strokes).clone()
    }

    /// Characters carried by text, return and tab keystrokes, in order,
    /// including mistyped ones.
    pub fn typed_chars(&self) -> Vec<char> {
        lock(&self.strokes)
            .iter()
            .filter_map(|s| match s {
                Keystroke::Text(c) => Some(*c),
                Keystroke::Return => Some('\n'),
                Keystroke::Tab => Some('\t'),
                Keystroke::Backspace | Keystroke::Paste => None,
            })
            .collect()
    }

    /// What a text field would show after replaying every keystroke.
    pub fn visible_text(&self) -> String {
        let mut out = String::new();
        for stroke in lock(&self.strokes).iter() {
            match stroke {
                Keystroke::Text(c) => out.push(*c),
                Keystroke::Return => out.push('\n'),
                Keystroke::Tab => out.push('\t'),
                Keystroke::Backspace => {
                    out.pop();
                }
                Keystroke::Paste => {}
            }
        }
        out
    }

    pub fn clear(&self) {
        lock(&self.strokes).clear();
    }
}

impl KeyEmitter for RecordingEmitter {
    fn send(&self, stroke: Keystroke) -> Result<(), InjectError> {
        lock(&self.strokes).push(stroke);
        if self.fail {
            return Err(InjectError::Backend("recording emitter set to fail".into()));
        }
        Ok(())
    }
}

/// Clipboard held in memory.
#[derive(Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        lock(&self.contents).clone()
    }
}

impl ClipboardWriter for MemoryClipboard {
    async fn write(&self, text: &str) -> Result<(), InjectError> {
        *lock(&self.contents) = Some(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct PointerState {
    callback: Option<PressCallback>,
    starts: usize,
}

/// Pointer watch driven by [`press`](Self::press).
#[derive(Clone, Default)]
pub struct ManualPointer {
    state: Arc<Mutex<PointerState>>,
}

impl ManualPointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a button-down. Returns whether an observer received it.
    pub fn press(&self, button: PointerButton) -> bool {
        let state = lock(&self.state);
        match &state.callback {
            Some(callback) => {
                callback(button);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).callback.is_some()
    }

    /// Number of times an observer was installed.
    pub fn starts(&self) -> usize {
        lock(&self.state).starts
    }
}

impl PointerWatch for ManualPointer {
    fn start(&mut self, on_press: PressCallback) -> Result<(), InterruptError> {
        let mut state = lock(&self.state);
        state.callback = Some(on_press);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.state).callback = None;
    }
}

struct Holder {
    owner: u64,
    id: ShortcutId,
    tx: UnboundedSender<ShortcutId>,
}

/// A shared global shortcut namespace, standing in for the display.
///
/// Every [`backend`](Self::backend) behaves like a separate application:
/// a combination held by one cannot be grabbed by another.
#[derive(Clone, Default)]
pub struct ShortcutTable {
    held: Arc<Mutex<HashMap<KeyCombo, Holder>>>,
    next_owner: Arc<AtomicU64>,
}

impl ShortcutTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> TableBackend {
        let (tx, rx) = mpsc::unbounded_channel();
        TableBackend {
            table: self.clone(),
            owner: self.next_owner.fetch_add(1, Ordering::Relaxed),
            tx,
            rx: Some(rx),
        }
    }

    /// Occupy `combo` on behalf of some other application.
    pub fn occupy(&self, combo: KeyCombo) {
        let (tx, _rx) = mpsc::unbounded_channel();
        lock(&self.held).insert(
            combo,
            Holder {
                owner: u64::MAX,
                id: ShortcutId(u32::MAX),
                tx,
            },
        );
    }

    /// Free a combination, whoever holds it.
    pub fn vacate(&self, combo: &KeyCombo) {
        lock(&self.held).remove(combo);
    }

    pub fn is_held(&self, combo: &KeyCombo) -> bool {
        lock(&self.held).contains_key(combo)
    }

    /// Simulate the user pressing `combo`. Returns whether a holder got it.
    pub fn press(&self, combo: &KeyCombo) -> bool {
        match lock(&self.held).get(combo) {
            Some(holder) => holder.tx.send(holder.id).is_ok(),
            None => false,
        }
    }
}

/// One application's view of a [`ShortcutTable`].
pub struct TableBackend {
    table: ShortcutTable,
    owner: u64,
    tx: UnboundedSender<ShortcutId>,
    rx: Option<UnboundedReceiver<ShortcutId>>,
}

impl ShortcutBackend for TableBackend {
    fn grab(&mut self, id: ShortcutId, combo: &KeyCombo) -> Result<bool, HotkeyError> {
        let mut held = lock(&self.table.held);
        if let Some(holder) = held.get(combo) {
            return Ok(holder.owner == self.owner && holder.id == id);
        }
        held.insert(
            *combo,
            Holder {
                owner: self.owner,
                id,
                tx: self.tx.clone(),
            },
        );
        Ok(true)
    }

    fn ungrab(&mut self, id: ShortcutId) {
        lock(&self.table.held).retain(|_, h| !(h.owner == self.owner && h.id == id));
    }

    fn events(&mut self) -> Option<UnboundedReceiver<ShortcutId>> {
        self.rx.take()
    }
}

/// Status notification seen by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Paused { offset: usize, resume_available: bool },
    Completed,
    Failed,
}

/// Observer that records status callbacks and lets tests await them.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SessionEvent>>,
    last_progress: AtomicUsize,
    notify: Notify,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        lock(&self.events).clone()
    }

    pub fn last_progress(&self) -> usize {
        self.last_progress.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` events were recorded; returns the
    /// `count`-th. Counting starts at 1; `nth(0)` waits for the first.
    pub async fn nth(&self, count: usize) -> SessionEvent {
        let index = count.saturating_sub(1);
        loop {
            if let Some(event) = lock(&self.events).get(index) {
                return event.clone();
            }
            self.notify.notified().await;
        }
    }

    fn record(&self, event: SessionEvent) {
        lock(&self.events).push(event);
        self.notify.notify_one();
    }
}

impl SessionObserver for RecordingObserver {
    fn on_paused(&self, offset: usize, hint: &ResumeHint) {
        self.record(SessionEvent::Paused {
            offset,
            resume_available: hint.is_available(),
        });
    }

    fn on_completed(&self) {
        self.record(SessionEvent::Completed);
    }

    fn on_progress(&self, offset: usize) {
        self.last_progress.store(offset, Ordering::SeqCst);
    }

    fn on_failed(&self) {
        self.record(SessionEvent::Failed);
    }
}
