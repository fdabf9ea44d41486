//! Runtime configuration — typing style, resume shortcut, timing profile.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

use crate::controller::TypingStyle;
use crate::hotkey::ShortcutId;
use crate::hotkey::keybinding::KeyCombo;

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name}: minimum {min:?} exceeds maximum {max:?}")]
    InvertedRange {
        name: &'static str,
        min: Duration,
        max: Duration,
    },
    #[error("{name}: empty count range")]
    EmptyCount { name: &'static str },
    #[error("slowdown multiplier must be positive and finite, got {0}")]
    Slowdown(f64),
}

/// A closed range of durations, sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }

    pub fn contains(&self, d: Duration) -> bool {
        self.min <= d && d <= self.max
    }

    fn check(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Every pacing constant of the timing model, as data.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingProfile {
    /// Per-character baseline, roughly 50 words per minute.
    pub base_delay: DelayRange,
    /// Multiplier applied to the baseline.
    pub slowdown: f64,
    /// Extra pause on top of the baseline before a space.
    pub word_gap: DelayRange,
    /// Texts at least this many characters long get thinking and
    /// reflective pauses.
    pub long_text_threshold: usize,
    pub thinking_pause: DelayRange,
    /// Words between thinking pauses, re-drawn after each one.
    pub thinking_every_words: RangeInclusive<u32>,
    /// Pause before `.`, `?` and `!`.
    pub sentence_pause: DelayRange,
    /// Additional pause before sentence punctuation in long texts.
    pub reflective_pause: DelayRange,
    /// Characters already typed in the current word before a typo may occur.
    pub typo_min_word_chars: usize,
    /// Words between typos, re-drawn after each one.
    pub typo_every_words: RangeInclusive<u32>,
    /// Pause after the wrong key, before deleting it.
    pub typo_notice: DelayRange,
    /// Pause after deleting, before the correct key.
    pub typo_fix: DelayRange,
    /// Grace pause before the first keystroke of a run.
    pub settle: Duration,
    /// Fixed interval between repeated backspaces.
    pub backspace_interval: Duration,
    /// Seed for reproducible runs; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl TimingProfile {
    /// Cadence for controller-driven, resumable sessions.
    pub fn session() -> Self {
        Self {
            base_delay: DelayRange::millis(180, 300),
            slowdown: 2.0,
            word_gap: DelayRange::millis(30, 120),
            long_text_threshold: 250,
            thinking_pause: DelayRange::millis(400, 1000),
            thinking_every_words: 8..=20,
            sentence_pause: DelayRange::millis(450, 900),
            reflective_pause: DelayRange::millis(500, 1200),
            typo_min_word_chars: 2,
            typo_every_words: 6..=10,
            typo_notice: DelayRange::millis(80, 220),
            typo_fix: DelayRange::millis(40, 120),
            settle: Duration::from_millis(100),
            backspace_interval: Duration::from_millis(30),
            seed: None,
        }
    }

    /// Same as [`session`](Self::session) with a wider typo interval.
    pub fn standard() -> Self {
        Self {
            typo_every_words: 5..=12,
            ..Self::session()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.slowdown.is_finite() && self.slowdown > 0.0) {
            return Err(ConfigError::Slowdown(self.slowdown));
        }
        self.base_delay.check("base_delay")?;
        self.word_gap.check("word_gap")?;
        self.thinking_pause.check("thinking_pause")?;
        self.sentence_pause.check("sentence_pause")?;
        self.reflective_pause.check("reflective_pause")?;
        self.typo_notice.check("typo_notice")?;
        self.typo_fix.check("typo_fix")?;
        if self.thinking_every_words.is_empty() || *self.thinking_every_words.start() == 0 {
            return Err(ConfigError::EmptyCount {
                name: "thinking_every_words",
            });
        }
        if self.typo_every_words.is_empty() {
            return Err(ConfigError::EmptyCount {
                name: "typo_every_words",
            });
        }
        Ok(())
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::session()
    }
}

/// Numeric ID the controller reserves for its resume shortcut.
pub const RESUME_SHORTCUT_ID: ShortcutId = ShortcutId(0x5245);

/// Top-level configuration for one controller.
#[derive(Debug, Clone)]
pub struct Config {
    pub style: TypingStyle,
    pub resume_key: KeyCombo,
    /// Delay before the first session starts, so the user can focus the
    /// target window.
    pub start_delay: Duration,
    pub timing: TimingProfile,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            style: TypingStyle::Humanlike { allow_typos: true },
            resume_key: KeyCombo::default_resume(),
            start_delay: Duration::from_secs(3),
            timing: TimingProfile::session(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn presets_differ_only_in_typo_cadence() {
        let session = TimingProfile::session();
        let standard = TimingProfile::standard();
        assert_eq!(session.typo_every_words, 6..=10);
        assert_eq!(standard.typo_every_words, 5..=12);
        assert_eq!(
            TimingProfile {
                typo_every_words: 6..=10,
                ..standard
            },
            session
        );
    }

    #[test]
    fn default_profile_is_valid() {
        assert!(TimingProfile::default().validate().is_ok());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn inverted_range_rejected() {
        let profile = TimingProfile {
            sentence_pause: DelayRange::millis(900, 450),
            ..TimingProfile::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(ConfigError::InvertedRange {
                name: "sentence_pause",
                ..
            })
        ));
    }

    #[test]
    fn non_positive_slowdown_rejected() {
        for slowdown in [0.0, -1.0, f64::NAN] {
            let profile = TimingProfile {
                slowdown,
                ..TimingProfile::default()
            };
            assert!(matches!(profile.validate(), Err(ConfigError::Slowdown(_))));
        }
    }

    #[test]
    fn zero_thinking_interval_rejected() {
        let profile = TimingProfile {
            thinking_every_words: 0..=4,
            ..TimingProfile::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn delay_range_samples_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = DelayRange::millis(80, 220);
        for _ in 0..200 {
            assert!(range.contains(range.sample(&mut rng)));
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = DelayRange::millis(50, 50);
        assert_eq!(range.sample(&mut rng), Duration::from_millis(50));
    }
}
