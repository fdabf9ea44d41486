//! Human-like text injection.
//!
//! Types arbitrary text into whichever window has input focus as a
//! sequence of synthetic keystrokes, paced and perturbed like a person
//! typing, and pausable at any character boundary. A pointer click
//! anywhere pauses the session; a global resume shortcut continues it.

pub mod config;
pub mod controller;
pub mod engine;
pub mod hotkey;
pub mod inject;
pub mod interrupt;
pub mod testing;
pub mod timing;
pub mod x11;

pub use config::{Config, TimingProfile};
pub use controller::{ControllerHandle, ResumeHint, SessionController, SessionObserver, TypingStyle};
pub use engine::{StopSignal, TypingEngine};
