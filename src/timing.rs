//! Timing and typo model.
//!
//! A pure function of the character about to be typed and a handful of
//! running counters. Produces the pre-delay for each character, any
//! longer pauses that precede it, and whether a neighboring wrong key is
//! typed (and corrected) first.
//!
//! Counters live in [`TimingState`] and are rebuilt at the start of every
//! run, so a resumed session restarts its word and typo cadence from a
//! neutral state.

use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;

use crate::config::TimingProfile;

/// Running counters threaded through one typing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingState {
    /// Words completed since the last injected typo.
    pub words_since_typo: usize,
    /// Words that must pass before the next typo; `usize::MAX` disables typos.
    pub next_typo_after: usize,
    /// Characters typed in the current word.
    pub chars_in_word: usize,
    /// Words since the last thinking pause.
    pub words_since_pause: usize,
    /// Words that must pass before the next thinking pause.
    pub next_pause_after: usize,
}

/// What to do before typing one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharPlan {
    /// Baseline pre-delay (plus word gap at word boundaries).
    pub delay: Duration,
    /// Thinking, sentence and reflective pauses, each preceded by a stop
    /// check.
    pub pauses: Vec<Duration>,
    /// Wrong neighbor key to type and correct before the real character.
    pub typo: Option<char>,
}

/// Characters that end a word: space, newline and tab. A lone `'\r'`
/// does not, so CRLF counts once.
fn ends_word(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\t')
}

/// Sentence-terminating punctuation.
fn ends_sentence(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}

pub struct TimingModel<'a> {
    profile: &'a TimingProfile,
    state: TimingState,
    rng: StdRng,
    long_text: bool,
}

impl<'a> TimingModel<'a> {
    /// Fresh model for a run over a text of `text_len` characters.
    ///
    /// With `allow_typos = false` the typo threshold is unreachable, so the
    /// typo path never triggers.
    pub fn new(profile: &'a TimingProfile, text_len: usize, allow_typos: bool, mut rng: StdRng) -> Self {
        let next_typo_after = if allow_typos {
            rng.gen_range(profile.typo_every_words.clone()) as usize
        } else {
            usize::MAX
        };
        let next_pause_after = rng.gen_range(profile.thinking_every_words.clone()) as usize;

        Self {
            profile,
            state: TimingState {
                words_since_typo: 0,
                next_typo_after,
                chars_in_word: 0,
                words_since_pause: 0,
                next_pause_after,
            },
            rng,
            long_text: text_len >= profile.long_text_threshold,
        }
    }

    pub fn state(&self) -> &TimingState {
        &self.state
    }

    pub fn is_long_text(&self) -> bool {
        self.long_text
    }

    /// Plan the next character and advance the counters.
    pub fn plan(&mut self, c: char) -> CharPlan {
        let p = self.profile;
        let base = p.base_delay.sample(&mut self.rng).mul_f64(p.slowdown);
        let mut plan = CharPlan {
            delay: base,
            pauses: Vec::new(),
            typo: None,
        };

        if ends_word(c) {
            self.state.chars_in_word = 0;
            self.state.words_since_typo = self.state.words_since_typo.saturating_add(1);
            self.state.words_since_pause += 1;
            plan.delay += p.word_gap.sample(&mut self.rng);

            if self.long_text && self.state.words_since_pause >= self.state.next_pause_after {
                plan.pauses.push(p.thinking_pause.sample(&mut self.rng));
                self.state.words_since_pause = 0;
                self.state.next_pause_after = self.rng.gen_range(p.thinking_every_words.clone()) as usize;
            }
            return plan;
        }

        if c.is_whitespace() {
            self.state.chars_in_word = 0;
            return plan;
        }

        if ends_sentence(c) {
            plan.pauses.push(p.sentence_pause.sample(&mut self.rng));
            if self.long_text {
                plan.pauses.push(p.reflective_pause.sample(&mut self.rng));
            }
            self.state.words_since_pause = 0;
        }

        if c.is_alphabetic()
            && self.state.chars_in_word >= p.typo_min_word_chars
            && self.state.words_since_typo >= self.state.next_typo_after
        {
            if let Some(wrong) = typo_for(c, &mut self.rng) {
                plan.typo = Some(wrong);
                self.state.words_since_typo = 0;
                self.state.next_typo_after = self.rng.gen_range(p.typo_every_words.clone()) as usize;
            }
        }

        self.state.chars_in_word += 1;
        plan
    }

    /// Pause between the wrong key and its deletion.
    pub fn typo_notice(&mut self) -> Duration {
        self.profile.typo_notice.sample(&mut self.rng)
    }

    /// Pause between the deletion and the correct key.
    pub fn typo_fix(&mut self) -> Duration {
        self.profile.typo_fix.sample(&mut self.rng)
    }
}

/// Physically adjacent keys on a US QWERTY layout.
fn neighbors(c: char) -> Option<&'static [char]> {
    let keys: &'static [char] = match c {
        'q' => &['w', 'a'],
        'w' => &['q', 'e', 's'],
        'e' => &['w', 'r', 'd'],
        'r' => &['e', 't', 'f'],
        't' => &['r', 'y', 'g'],
        'y' => &['t', 'u', 'h'],
        'u' => &['y', 'i', 'j'],
        'i' => &['u', 'o', 'k'],
        'o' => &['i', 'p', 'l'],
        'p' => &['o', 'l'],
        'a' => &['q', 's', 'z'],
        's' => &['a', 'd', 'w', 'x'],
        'd' => &['s', 'f', 'e', 'c'],
        'f' => &['d', 'g', 'r', 'v'],
        'g' => &['f', 'h', 't', 'b'],
        'h' => &['g', 'j', 'y', 'n'],
        'j' => &['h', 'k', 'u', 'm'],
        'k' => &['j', 'l', 'i'],
        'l' => &['k', 'o', 'p'],
        'z' => &['a', 'x'],
        'x' => &['z', 'c', 's'],
        'c' => &['x', 'v', 'd'],
        'v' => &['c', 'b', 'f'],
        'b' => &['v', 'n', 'g'],
        'n' => &['b', 'm', 'h'],
        'm' => &['n', 'j'],
        _ => return None,
    };
    Some(keys)
}

/// Pick the wrong character typed in place of `c`.
///
/// Mapped letters yield a random physical neighbor. Unmapped letters with
/// a distinct lowercase form (capitals) yield that lowercase form, a
/// missed Shift. Anything else, including non-Latin scripts, yields
/// `None`: no typo this round.
pub fn typo_for<R: Rng + ?Sized>(c: char, rng: &mut R) -> Option<char> {
    if let Some(keys) = neighbors(c) {
        return Some(keys[rng.gen_range(0..keys.len())]);
    }

    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) if l != c => Some(l),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn eager_typos() -> TimingProfile {
        TimingProfile {
            typo_every_words: 0..=0,
            ..TimingProfile::session()
        }
    }

    #[test]
    fn baseline_delay_is_scaled_by_slowdown() {
        let profile = TimingProfile::session();
        let mut model = TimingModel::new(&profile, 10, false, rng());
        let lo = profile.base_delay.min.mul_f64(2.0);
        let hi = profile.base_delay.max.mul_f64(2.0);
        for c in "abcdefgh".chars() {
            let plan = model.plan(c);
            assert!(plan.delay >= lo && plan.delay <= hi, "{:?}", plan.delay);
            assert!(plan.pauses.is_empty());
        }
    }

    #[test]
    fn space_resets_word_and_adds_gap() {
        let profile = TimingProfile {
            base_delay: DelayRange::millis(100, 100),
            word_gap: DelayRange::millis(50, 50),
            ..TimingProfile::session()
        };
        let mut model = TimingModel::new(&profile, 10, false, rng());
        model.plan('a');
        model.plan('b');
        assert_eq!(model.state().chars_in_word, 2);

        let plan = model.plan(' ');
        assert_eq!(plan.delay, Duration::from_millis(250));
        assert_eq!(model.state().chars_in_word, 0);
        assert_eq!(model.state().words_since_pause, 1);
    }

    #[test]
    fn newline_and_tab_end_words() {
        let profile = TimingProfile {
            typo_every_words: 3..=3,
            ..TimingProfile::session()
        };
        let mut model = TimingModel::new(&profile, 100, true, rng());
        let typos: Vec<usize> = "asdf\nasdf\r\nasdf\tasdf"
            .chars()
            .enumerate()
            .filter_map(|(i, c)| model.plan(c).typo.map(|_| i))
            .collect();
        // Third letter of the fourth word; the CRLF pair counted once.
        assert_eq!(typos, vec![18]);
        assert_eq!(model.state().words_since_typo, 0);

        model.plan('\n');
        assert_eq!(model.state().words_since_typo, 1);
        assert_eq!(model.state().chars_in_word, 0);
    }

    #[test]
    fn short_text_never_gets_thinking_pauses() {
        let profile = TimingProfile::session();
        let text = "a ".repeat(100);
        let mut model = TimingModel::new(&profile, 249, false, rng());
        for c in text.chars() {
            assert!(model.plan(c).pauses.is_empty());
        }
    }

    #[test]
    fn long_text_gets_thinking_pause_within_interval() {
        let profile = TimingProfile::session();
        let mut model = TimingModel::new(&profile, 250, false, rng());
        assert!(model.is_long_text());

        let mut spaces = 0;
        let first = loop {
            model.plan('w');
            spaces += 1;
            let plan = model.plan(' ');
            if let Some(&pause) = plan.pauses.first() {
                break pause;
            }
            assert!(spaces <= 20, "no thinking pause within 20 words");
        };
        assert!(spaces >= 8);
        assert!(profile.thinking_pause.contains(first));
        assert_eq!(model.state().words_since_pause, 0);
        assert!(profile.thinking_every_words.contains(&(model.state().next_pause_after as u32)));
    }

    #[test]
    fn sentence_punctuation_pauses_and_resets_word_counter() {
        let profile = TimingProfile::session();

        let mut short = TimingModel::new(&profile, 20, false, rng());
        short.plan(' ');
        let plan = short.plan('.');
        assert_eq!(plan.pauses.len(), 1);
        assert!(profile.sentence_pause.contains(plan.pauses[0]));
        assert_eq!(short.state().words_since_pause, 0);

        let mut long = TimingModel::new(&profile, 300, false, rng());
        for c in ['?', '!'] {
            let plan = long.plan(c);
            assert_eq!(plan.pauses.len(), 2);
            assert!(profile.sentence_pause.contains(plan.pauses[0]));
            assert!(profile.reflective_pause.contains(plan.pauses[1]));
        }
    }

    #[test]
    fn typos_disabled_never_plan_a_typo() {
        let profile = eager_typos();
        let mut model = TimingModel::new(&profile, 400, false, rng());
        assert_eq!(model.state().next_typo_after, usize::MAX);
        for c in "the quick brown fox jumps over the lazy dog ".repeat(20).chars() {
            assert_eq!(model.plan(c).typo, None);
        }
    }

    #[test]
    fn typo_needs_two_characters_into_the_word() {
        let profile = eager_typos();
        let mut model = TimingModel::new(&profile, 10, true, rng());
        assert_eq!(model.plan('s').typo, None);
        assert_eq!(model.plan('d').typo, None);
        let typo = model.plan('f').typo.expect("third letter may be mistyped");
        assert!(neighbors('f').unwrap().contains(&typo));
    }

    #[test]
    fn typo_cadence_respects_word_threshold() {
        let profile = TimingProfile {
            typo_every_words: 3..=3,
            ..TimingProfile::session()
        };
        let mut model = TimingModel::new(&profile, 100, true, rng());
        let mut typo_words = Vec::new();
        for word in 0..12 {
            for c in "asdf".chars() {
                if model.plan(c).typo.is_some() {
                    typo_words.push(word);
                }
            }
            model.plan(' ');
        }
        assert_eq!(typo_words, vec![3, 6, 9]);
    }

    #[test]
    fn punctuation_and_digits_are_never_mistyped() {
        let profile = eager_typos();
        let mut model = TimingModel::new(&profile, 10, true, rng());
        for c in "ab1234,;:-".chars() {
            assert_eq!(model.plan(c).typo, None);
        }
    }

    #[test]
    fn capital_without_entry_falls_back_to_lowercase() {
        let mut r = rng();
        assert_eq!(typo_for('Q', &mut r), Some('q'));
        assert_eq!(typo_for('É', &mut r), Some('é'));
    }

    #[test]
    fn unmapped_scripts_have_no_typo() {
        let mut r = rng();
        for c in ['é', 'ж', '中', 'ß', '7'] {
            assert_eq!(typo_for(c, &mut r), None, "{c}");
        }
    }

    #[test]
    fn mapped_letters_pick_a_neighbor() {
        let mut r = rng();
        for _ in 0..50 {
            let wrong = typo_for('g', &mut r).unwrap();
            assert!(['f', 'h', 't', 'b'].contains(&wrong));
        }
    }
}
