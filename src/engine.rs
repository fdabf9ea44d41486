//! Typing session engine.
//!
//! Drives the emitter and the timing model over a text buffer from a
//! start offset. The stop flag is checked before every character and
//! before and during every long pause; the engine returns the offset it
//! reached.
//! It never retains the text or cursor between runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::TimingProfile;
use crate::inject::{ClipboardWriter, InjectError, KeyEmitter, Keystroke};
use crate::timing::TimingModel;

/// Cooperative cancellation flag shared between the typing worker and
/// whoever may ask it to stop (pointer observer thread, controller).
///
/// Only ever transitions false → true → false, polled once per character.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the current session to stop. Idempotent.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Granularity at which long pauses re-check the stop flag.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Callback invoked with the new cursor after every emitted character.
pub type ProgressHook = Arc<dyn Fn(usize) + Send + Sync>;

pub struct TypingEngine<E, C> {
    emitter: E,
    clipboard: C,
    profile: TimingProfile,
    stop: StopSignal,
    progress: Option<ProgressHook>,
}

impl<E: KeyEmitter, C: ClipboardWriter> TypingEngine<E, C> {
    pub fn new(emitter: E, clipboard: C, profile: TimingProfile) -> Self {
        Self {
            emitter,
            clipboard,
            profile,
            stop: StopSignal::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    /// Handle to the stop flag, for observers that must raise it.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Reset cancellation state. Call once before each [`run_session`].
    ///
    /// [`run_session`]: Self::run_session
    pub fn begin_session(&self) {
        self.stop.reset();
    }

    /// Ask the running session to stop at the next character boundary.
    pub fn request_stop(&self) {
        self.stop.request();
    }

    /// Type `text` from `start_at` until stopped or finished.
    ///
    /// Returns the offset of the next character to type: `text.len()`
    /// when finished. An empty remainder returns immediately without
    /// sleeping. Empty text returns `start_at` unchanged; otherwise a
    /// `start_at` past the end is clamped to `text.len()`.
    ///
    /// The profile must pass [`TimingProfile::validate`]: empty word-count
    /// ranges panic here.
    pub async fn run_session(&self, text: &[char], start_at: usize, allow_typos: bool) -> usize {
        if text.is_empty() {
            return start_at;
        }
        let len = text.len();
        let mut cursor = start_at.min(len);
        if cursor == len {
            return cursor;
        }

        tracing::debug!(start_at = cursor, len, allow_typos, "typing session settling");
        tokio::time::sleep(self.profile.settle).await;

        let rng = match self.profile.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut model = TimingModel::new(&self.profile, len, allow_typos, rng);

        while cursor < len {
            if self.stopped_at(cursor) {
                return cursor;
            }

            let c = text[cursor];
            let plan = model.plan(c);
            tokio::time::sleep(plan.delay).await;

            for pause in plan.pauses {
                if !self.pause(pause, cursor).await {
                    return cursor;
                }
            }

            if let Some(wrong) = plan.typo {
                tracing::trace!(offset = cursor, intended = %c, wrong = %wrong, "injecting typo");
                self.emit(wrong);
                tokio::time::sleep(model.typo_notice()).await;
                self.delete_backward(1).await;
                tokio::time::sleep(model.typo_fix()).await;
            }

            self.emit(c);
            cursor += 1;

            if let Some(progress) = &self.progress {
                progress(cursor);
            }
        }

        tracing::debug!(len, "typing session completed");
        cursor
    }

    /// Delete `times` characters before the caret, pausing a fixed
    /// interval between presses.
    pub async fn delete_backward(&self, times: usize) {
        for i in 0..times {
            if i > 0 {
                tokio::time::sleep(self.profile.backspace_interval).await;
            }
            self.send(Keystroke::Backspace);
        }
    }

    /// Non-simulated fast path: put `text` on the clipboard and press the
    /// paste shortcut once.
    pub async fn paste_text(&self, text: &str) -> Result<(), InjectError> {
        self.clipboard.write(text).await?;
        // Let the clipboard owner settle before the paste request.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.emitter.send(Keystroke::Paste)?;
        tracing::info!(chars = text.chars().count(), "pasted text");
        Ok(())
    }

    /// Sleep through a long pause in slices, giving up early on a stop
    /// request. Returns `false` if the session should stop.
    async fn pause(&self, total: Duration, cursor: usize) -> bool {
        let deadline = tokio::time::Instant::now() + total;
        loop {
            if self.stopped_at(cursor) {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(PAUSE_SLICE)).await;
        }
    }

    fn stopped_at(&self, cursor: usize) -> bool {
        let stopped = self.stop.is_requested();
        if stopped {
            tracing::debug!(offset = cursor, "stop requested, pausing session");
        }
        stopped
    }

    fn emit(&self, c: char) {
        if let Err(e) = self.emitter.emit(c) {
            tracing::warn!(error = %e, "keystroke injection failed");
        }
    }

    fn send(&self, stroke: Keystroke) {
        if let Err(e) = self.emitter.send(stroke) {
            tracing::warn!(error = %e, ?stroke, "keystroke injection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryClipboard, RecordingEmitter};

    fn engine(profile: TimingProfile) -> (Arc<TypingEngine<RecordingEmitter, MemoryClipboard>>, RecordingEmitter) {
        let emitter = RecordingEmitter::new();
        let engine = TypingEngine::new(emitter.clone(), MemoryClipboard::new(), profile);
        (Arc::new(engine), emitter)
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn stop_signal_transitions() {
        let stop = StopSignal::new();
        assert!(!stop.is_requested());
        stop.request();
        stop.request();
        assert!(stop.is_requested());
        stop.reset();
        assert!(!stop.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_returns_immediately() {
        let (engine, emitter) = engine(TimingProfile::session().with_seed(1));
        let started = tokio::time::Instant::now();
        assert_eq!(engine.run_session(&[], 0, true).await, 0);
        assert_eq!(engine.run_session(&[], 5, true).await, 5);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(emitter.strokes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_offset_returns_immediately() {
        let (engine, emitter) = engine(TimingProfile::session().with_seed(1));
        let text = chars("done");
        assert_eq!(engine.run_session(&text, 4, true).await, 4);
        assert_eq!(engine.run_session(&text, 9, true).await, 4);
        assert!(emitter.strokes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn uninterrupted_run_returns_text_length() {
        let (engine, emitter) = engine(TimingProfile::session().with_seed(3));
        let text = chars("Hello, world.\n\tIndented line!");
        engine.begin_session();
        assert_eq!(engine.run_session(&text, 0, false).await, text.len());
        assert_eq!(emitter.visible_text(), "Hello, world.\n\tIndented line!");
    }

    #[tokio::test(start_paused = true)]
    async fn typos_disabled_emits_exactly_the_text() {
        let profile = TimingProfile {
            typo_every_words: 0..=0,
            ..TimingProfile::session().with_seed(5)
        };
        let (engine, emitter) = engine(profile);
        let text = chars("several ordinary words typed without mistakes");
        engine.begin_session();
        engine.run_session(&text, 0, false).await;
        assert_eq!(emitter.typed_chars(), text);
        assert!(!emitter.strokes().contains(&Keystroke::Backspace));
    }

    #[tokio::test(start_paused = true)]
    async fn typos_are_corrected_in_final_text() {
        let profile = TimingProfile {
            typo_every_words: 0..=1,
            ..TimingProfile::session().with_seed(11)
        };
        let (engine, emitter) = engine(profile);
        let source = "the quick brown fox jumps over the lazy dog ".repeat(4);
        let text = chars(&source);
        engine.begin_session();
        assert_eq!(engine.run_session(&text, 0, true).await, text.len());

        let strokes = emitter.strokes();
        assert!(strokes.contains(&Keystroke::Backspace), "expected at least one typo");
        assert_eq!(emitter.visible_text(), source);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_pause_precedes_first_keystroke() {
        let profile = TimingProfile {
            base_delay: crate::config::DelayRange::millis(10, 10),
            slowdown: 1.0,
            ..TimingProfile::session().with_seed(1)
        };
        let (engine, emitter) = engine(profile);
        let text = chars("ab");
        let started = tokio::time::Instant::now();
        engine.begin_session();
        engine.run_session(&text, 0, false).await;
        assert_eq!(started.elapsed(), Duration::from_millis(120));
        assert_eq!(emitter.visible_text(), "ab");
    }

    #[tokio::test(start_paused = true)]
    async fn pre_raised_stop_returns_start_offset() {
        let (engine, emitter) = engine(TimingProfile::session().with_seed(1));
        let text = chars("never typed");
        engine.request_stop();
        assert_eq!(engine.run_session(&text, 3, true).await, 3);
        assert!(emitter.strokes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn begin_session_clears_stale_stop() {
        let (engine, _) = engine(TimingProfile::session().with_seed(1));
        engine.request_stop();
        for _ in 0..3 {
            engine.begin_session();
        }
        assert!(!engine.stop_signal().is_requested());
        let text = chars("go");
        assert_eq!(engine.run_session(&text, 0, false).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_sentence_pause_is_honored_before_pause_ends() {
        let profile = TimingProfile {
            base_delay: crate::config::DelayRange::millis(10, 10),
            slowdown: 1.0,
            sentence_pause: crate::config::DelayRange::millis(5_000, 5_000),
            ..TimingProfile::session().with_seed(1)
        };
        let (engine, emitter) = engine(profile);
        let text: Arc<[char]> = chars("ab.cd").into();

        engine.begin_session();
        let worker = {
            let engine = engine.clone();
            let text = text.clone();
            tokio::spawn(async move { engine.run_session(&text, 0, false).await })
        };

        // settle 100ms + 'a' 10ms + 'b' 10ms + '.' baseline 10ms, then the
        // worker enters the 5s sentence pause.
        tokio::time::sleep(Duration::from_millis(500)).await;
        engine.request_stop();
        let reached = worker.await.unwrap();
        assert_eq!(reached, 2);
        assert_eq!(emitter.visible_text(), "ab");
    }

    #[tokio::test(start_paused = true)]
    async fn progress_hook_sees_every_offset() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hook: ProgressHook = {
            let seen = seen.clone();
            Arc::new(move |offset| seen.lock().unwrap().push(offset))
        };
        let emitter = RecordingEmitter::new();
        let engine = TypingEngine::new(emitter, MemoryClipboard::new(), TimingProfile::session().with_seed(2))
            .with_progress(hook);
        let text = chars("abc");
        engine.run_session(&text, 1, false).await;
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_backward_presses_backspace_n_times() {
        let (engine, emitter) = engine(TimingProfile::session());
        let started = tokio::time::Instant::now();
        engine.delete_backward(3).await;
        assert_eq!(emitter.strokes(), vec![Keystroke::Backspace; 3]);
        assert_eq!(started.elapsed(), Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn paste_text_writes_clipboard_then_presses_paste() {
        let emitter = RecordingEmitter::new();
        let clipboard = MemoryClipboard::new();
        let engine = TypingEngine::new(emitter.clone(), clipboard.clone(), TimingProfile::session());
        engine.paste_text("pasted as is").await.unwrap();
        assert_eq!(clipboard.contents().as_deref(), Some("pasted as is"));
        assert_eq!(emitter.strokes(), vec![Keystroke::Paste]);
    }

    #[tokio::test(start_paused = true)]
    async fn injection_failures_do_not_abort_the_session() {
        let emitter = RecordingEmitter::failing();
        let engine = TypingEngine::new(emitter.clone(), MemoryClipboard::new(), TimingProfile::session().with_seed(1));
        let text = chars("still advances");
        assert_eq!(engine.run_session(&text, 0, false).await, text.len());
    }
}
