//! `humantype` — type a text into the focused window like a person would.
//!
//! Reads the text from a file or stdin, waits briefly so the target
//! window can be focused, then types it. Clicking anywhere pauses;
//! the resume shortcut (or SIGUSR1) continues from where it stopped.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use humantype::config::{Config, TimingProfile};
use humantype::controller::{ResumeHint, SessionController, SessionObserver, TypingStyle};
use humantype::hotkey::X11ShortcutBackend;
use humantype::hotkey::keybinding::KeyCombo;
use humantype::inject::{EnigoEmitter, XclipClipboard};
use humantype::interrupt::X11PointerWatch;

#[derive(Parser, Debug)]
#[command(name = "humantype", version, about = "Type text into the focused window like a person")]
struct Cli {
    /// File to type; reads stdin when omitted.
    file: Option<PathBuf>,

    /// Paste the text in one go instead of typing it.
    #[arg(long)]
    paste: bool,

    /// Never inject and correct typos.
    #[arg(long)]
    no_typos: bool,

    /// Global shortcut that resumes a paused session.
    #[arg(long, default_value = "Ctrl+Alt+R")]
    resume_key: KeyCombo,

    /// Milliseconds to wait before typing starts.
    #[arg(long, default_value_t = 3000)]
    start_delay_ms: u64,

    /// Multiplier on the per-character baseline delay.
    #[arg(long, default_value_t = 2.0)]
    slowdown: f64,

    /// Typo cadence preset.
    #[arg(long, value_enum, default_value_t = Cadence::Session)]
    cadence: Cadence,

    /// Seed for reproducible timing.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Cadence {
    /// A typo every 6 to 10 words.
    Session,
    /// A typo every 5 to 12 words.
    Standard,
}

impl Cadence {
    fn profile(self) -> TimingProfile {
        match self {
            Self::Session => TimingProfile::session(),
            Self::Standard => TimingProfile::standard(),
        }
    }
}

impl Cli {
    fn config(&self) -> Config {
        let style = if self.paste {
            TypingStyle::Paste
        } else {
            TypingStyle::Humanlike {
                allow_typos: !self.no_typos,
            }
        };

        Config {
            style,
            resume_key: self.resume_key,
            start_delay: Duration::from_millis(self.start_delay_ms),
            timing: TimingProfile {
                slowdown: self.slowdown,
                seed: self.seed,
                ..self.cadence.profile()
            },
        }
    }

    fn read_text(&self) -> std::io::Result<String> {
        match &self.file {
            Some(path) => std::fs::read_to_string(path),
            None => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                Ok(text)
            }
        }
    }
}

/// Reports session status on stderr and wakes `main` on completion.
struct CliObserver {
    done: Notify,
}

impl SessionObserver for CliObserver {
    fn on_paused(&self, offset: usize, hint: &ResumeHint) {
        eprintln!("paused after {offset} characters. {hint}.");
        if !hint.is_available() {
            eprintln!("(or run `kill -USR1 {}` to resume)", std::process::id());
        }
    }

    fn on_completed(&self) {
        self.done.notify_one();
    }

    fn on_failed(&self) {
        eprintln!("typing stopped unexpectedly; see the log for details.");
        self.done.notify_one();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    config.validate()?;
    let text = cli.read_text()?;

    let shortcuts = X11ShortcutBackend::connect()?;
    let observer = Arc::new(CliObserver { done: Notify::new() });
    let (controller, handle) = SessionController::new(
        EnigoEmitter::new(),
        XclipClipboard::new(),
        X11PointerWatch::new(),
        shortcuts,
        &config,
        observer.clone(),
    )?;
    let controller = tokio::spawn(controller.run());

    tracing::info!(
        chars = text.chars().count(),
        delay_ms = config.start_delay.as_millis() as u64,
        "focus the target window"
    );
    tokio::time::sleep(config.start_delay).await;
    handle.type_text(text, config.style);

    let mut usr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())?;
    loop {
        tokio::select! {
            _ = observer.done.notified() => break,
            _ = usr1.recv() => {
                handle.resume();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    handle.shutdown();
    controller.await?;
    Ok(())
}
