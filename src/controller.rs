//! Session controller — owns the text buffer and cursor between runs.
//!
//! Runs as a single tokio task fed by a command channel. External
//! triggers (new text, resume shortcut, explicit stop, pointer press)
//! arrive as [`Command`]s; the controller starts at most one typing
//! worker at a time, always stopping and awaiting the previous worker
//! before a new one begins so two workers never race on the keyboard.
//!
//! ```text
//!  type_text ─┐                         ┌─► on_completed
//!  resume ────┼─► Command ─► controller ┤
//!  stop ──────┘        ▲        │       └─► on_paused(offset, hint)
//!                      │        ▼
//!         pointer / shortcut   worker (TypingEngine::run_session)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, ConfigError, RESUME_SHORTCUT_ID};
use crate::engine::TypingEngine;
use crate::hotkey::keybinding::KeyCombo;
use crate::hotkey::{ResumeRegistrar, ShortcutBackend};
use crate::inject::{ClipboardWriter, KeyEmitter};
use crate::interrupt::{InterruptionCoordinator, PointerButton, PointerWatch};

/// How a text is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingStyle {
    /// Paced synthetic keystrokes, pausable and resumable.
    Humanlike { allow_typos: bool },
    /// Clipboard plus a single paste shortcut.
    Paste,
}

/// User-facing instruction for continuing a paused session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeHint {
    /// The resume shortcut is claimed and will continue typing.
    Available(KeyCombo),
    /// Another application holds the shortcut.
    InUse(KeyCombo),
}

impl ResumeHint {
    pub fn new(combo: KeyCombo, claimed: bool) -> Self {
        if claimed {
            Self::Available(combo)
        } else {
            Self::InUse(combo)
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl fmt::Display for ResumeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(combo) => write!(f, "Press {combo} to resume typing"),
            Self::InUse(combo) => write!(
                f,
                "{combo} is in use by another application; free it first, then resume"
            ),
        }
    }
}

/// How often a paused session retries a resume shortcut held elsewhere.
pub const CLAIM_RETRY: Duration = Duration::from_secs(1);

/// Status callbacks for the consumer. Called from the controller task.
pub trait SessionObserver: Send + Sync {
    /// A session stopped before the end of its text. Called again with an
    /// available hint if the shortcut was in use and has since been freed.
    fn on_paused(&self, offset: usize, hint: &ResumeHint);

    /// The staged text has been fully delivered.
    fn on_completed(&self);

    /// Called after every typed character, from the worker.
    fn on_progress(&self, _offset: usize) {}

    /// The typing worker died; the staged text was dropped.
    fn on_failed(&self) {}
}

#[derive(Debug)]
enum Command {
    Type { text: String, style: TypingStyle },
    Resume,
    Stop,
    PointerPressed(PointerButton),
    Shutdown,
}

/// Cloneable front-end to a running [`SessionController`].
///
/// Every method returns `false` once the controller has shut down.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Replace whatever is staged with `text` and start delivering it.
    pub fn type_text(&self, text: impl Into<String>, style: TypingStyle) -> bool {
        self.send(Command::Type {
            text: text.into(),
            style,
        })
    }

    /// Continue a paused session from where it stopped.
    pub fn resume(&self) -> bool {
        self.send(Command::Resume)
    }

    /// Pause the running session at the next character boundary.
    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    /// Stop any running session and end the controller task.
    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }

    fn send(&self, cmd: Command) -> bool {
        self.tx.send(cmd).is_ok()
    }
}

/// Text staged for delivery and how far it got.
struct Staged {
    id: Uuid,
    text: Arc<[char]>,
    cursor: usize,
    allow_typos: bool,
}

enum Wake {
    Command(Option<Command>),
    Worker(Result<usize, JoinError>),
    RetryClaim,
}

pub struct SessionController<E, C, W, B>
where
    W: PointerWatch,
    B: ShortcutBackend,
{
    engine: Arc<TypingEngine<E, C>>,
    coordinator: InterruptionCoordinator<W>,
    registrar: ResumeRegistrar<B>,
    resume_key: KeyCombo,
    observer: Arc<dyn SessionObserver>,
    staged: Option<Staged>,
    worker: Option<JoinHandle<usize>>,
    commands: UnboundedReceiver<Command>,
    self_tx: WeakUnboundedSender<Command>,
    claim_retry: Option<Interval>,
}

impl<E, C, W, B> SessionController<E, C, W, B>
where
    E: KeyEmitter + 'static,
    C: ClipboardWriter + 'static,
    W: PointerWatch,
    B: ShortcutBackend,
{
    /// Build a controller and its handle. Must be called inside a tokio
    /// runtime; drive it with [`run`](Self::run).
    ///
    /// Fails if `config` does not pass [`Config::validate`].
    pub fn new(
        emitter: E,
        clipboard: C,
        pointer: W,
        shortcuts: B,
        config: &Config,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<(Self, ControllerHandle), ConfigError> {
        config.validate()?;

        let (tx, commands) = mpsc::unbounded_channel();
        let self_tx = tx.downgrade();

        let engine = {
            let observer = observer.clone();
            TypingEngine::new(emitter, clipboard, config.timing.clone())
                .with_progress(Arc::new(move |offset| observer.on_progress(offset)))
        };

        let coordinator = {
            let tx = self_tx.clone();
            InterruptionCoordinator::new(pointer, engine.stop_signal(), move |button| {
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(Command::PointerPressed(button));
                }
            })
        };

        let controller = Self {
            engine: Arc::new(engine),
            coordinator,
            registrar: ResumeRegistrar::new(shortcuts),
            resume_key: config.resume_key,
            observer,
            staged: None,
            worker: None,
            commands,
            self_tx,
            claim_retry: None,
        };

        Ok((controller, ControllerHandle { tx }))
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            let wake = {
                let worker = &mut self.worker;
                let retry = &mut self.claim_retry;
                tokio::select! {
                    cmd = self.commands.recv() => Wake::Command(cmd),
                    joined = async {
                        match worker {
                            Some(handle) => handle.await,
                            None => std::future::pending().await,
                        }
                    } => Wake::Worker(joined),
                    _ = async {
                        match retry {
                            Some(interval) => interval.tick().await,
                            None => std::future::pending().await,
                        }
                    } => Wake::RetryClaim,
                }
            };

            match wake {
                Wake::Worker(joined) => {
                    self.worker = None;
                    match joined {
                        Ok(offset) => self.on_worker_finished(offset),
                        Err(e) => self.on_worker_failed(e),
                    }
                }
                Wake::RetryClaim => self.retry_claim(),
                Wake::Command(Some(Command::Shutdown)) | Wake::Command(None) => break,
                Wake::Command(Some(cmd)) => self.handle(cmd).await,
            }
        }

        self.stop_worker().await;
        self.claim_retry = None;
        self.registrar.release(RESUME_SHORTCUT_ID);
        tracing::debug!("session controller stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Type { text, style } => {
                if let Some(offset) = self.stop_worker().await {
                    tracing::info!(offset, "replacing running session");
                }
                self.claim_retry = None;
                self.registrar.release(RESUME_SHORTCUT_ID);
                self.staged = None;

                match style {
                    TypingStyle::Paste => {
                        if let Err(e) = self.engine.paste_text(&text).await {
                            tracing::warn!(error = %e, "paste failed");
                        }
                        self.observer.on_completed();
                    }
                    TypingStyle::Humanlike { allow_typos } => {
                        self.staged = Some(Staged {
                            id: Uuid::new_v4(),
                            text: text.chars().collect(),
                            cursor: 0,
                            allow_typos,
                        });
                        self.start_worker();
                    }
                }
            }
            Command::Resume => {
                if self.worker.is_some() {
                    tracing::debug!("resume ignored, session already running");
                } else if self.staged.is_some() {
                    self.start_worker();
                } else {
                    tracing::debug!("resume ignored, nothing staged");
                }
            }
            Command::Stop => {
                if self.worker.is_some() {
                    self.engine.request_stop();
                }
            }
            Command::PointerPressed(button) => {
                tracing::info!(?button, "pointer press, pausing typing");
            }
            Command::Shutdown => {}
        }
    }

    fn start_worker(&mut self) {
        let Some(staged) = &self.staged else {
            return;
        };
        let len = staged.text.len();
        if staged.cursor >= len {
            self.on_worker_finished(len);
            return;
        }

        let span = tracing::info_span!("session", id = %staged.id, start_at = staged.cursor);
        let text = staged.text.clone();
        let (start_at, allow_typos) = (staged.cursor, staged.allow_typos);

        self.claim_retry = None;
        self.registrar.release(RESUME_SHORTCUT_ID);
        self.engine.begin_session();
        if let Err(e) = self.coordinator.arm() {
            tracing::warn!(error = %e, "pointer interruption unavailable");
        }

        span.in_scope(|| tracing::info!(remaining = len - start_at, allow_typos, "typing started"));
        let engine = self.engine.clone();
        self.worker = Some(tokio::spawn(
            async move { engine.run_session(&text, start_at, allow_typos).await }.instrument(span),
        ));
    }

    fn on_worker_finished(&mut self, offset: usize) {
        self.coordinator.disarm();

        let Some(staged) = self.staged.as_mut() else {
            return;
        };
        staged.cursor = offset;
        let len = staged.text.len();

        if offset >= len {
            tracing::info!(id = %staged.id, len, "typing completed");
            self.staged = None;
            self.registrar.release(RESUME_SHORTCUT_ID);
            self.observer.on_completed();
            return;
        }

        let id = staged.id;
        let claimed = self.claim_resume();
        if !claimed {
            let start = Instant::now() + CLAIM_RETRY;
            let mut interval = tokio::time::interval_at(start, CLAIM_RETRY);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.claim_retry = Some(interval);
        }

        let hint = ResumeHint::new(self.resume_key, claimed);
        tracing::info!(%id, offset, remaining = len - offset, %hint, "typing paused");
        self.observer.on_paused(offset, &hint);
    }

    fn on_worker_failed(&mut self, error: JoinError) {
        tracing::error!(error = %error, "typing worker failed, dropping staged text");
        self.coordinator.disarm();
        self.staged = None;
        self.claim_retry = None;
        self.registrar.release(RESUME_SHORTCUT_ID);
        self.observer.on_failed();
    }

    fn claim_resume(&mut self) -> bool {
        let tx = self.self_tx.clone();
        self.registrar.try_claim(RESUME_SHORTCUT_ID, &self.resume_key, move || {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Resume);
            }
        })
    }

    /// Paused with the shortcut held elsewhere: try again, and tell the
    /// observer once it is ours.
    fn retry_claim(&mut self) {
        let Some(offset) = self.staged.as_ref().map(|s| s.cursor) else {
            self.claim_retry = None;
            return;
        };
        if self.worker.is_some() || !self.claim_resume() {
            return;
        }

        self.claim_retry = None;
        let hint = ResumeHint::new(self.resume_key, true);
        tracing::info!(offset, %hint, "resume shortcut became available");
        self.observer.on_paused(offset, &hint);
    }

    /// Request stop and wait for the running worker, if any. Returns the
    /// offset it reached.
    async fn stop_worker(&mut self) -> Option<usize> {
        let handle = self.worker.take()?;
        self.engine.request_stop();
        let reached = match handle.await {
            Ok(offset) => Some(offset),
            Err(e) => {
                tracing::error!(error = %e, "typing worker failed");
                None
            }
        };
        self.coordinator.disarm();
        reached
    }
}
