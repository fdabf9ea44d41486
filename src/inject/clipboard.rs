//! Clipboard delivery for the paste fast path.
//!
//! Best-effort, like every other injection: on failure the caller logs
//! and skips the paste keystroke.

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ClipboardWriter, InjectError};

/// Writes the X11 clipboard selection via `xclip`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XclipClipboard;

impl XclipClipboard {
    pub fn new() -> Self {
        Self
    }
}

impl ClipboardWriter for XclipClipboard {
    /// Spawns `xclip -selection clipboard`, pipes `text` to stdin, and
    /// waits for exit. Fails on non-zero exit or if xclip is not found.
    async fn write(&self, text: &str) -> Result<(), InjectError> {
        let mut child = Command::new("xclip")
            .args(["-selection", "clipboard"])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| InjectError::Clipboard(format!("spawn xclip: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| InjectError::Clipboard(format!("write to xclip: {e}")))?;
            // Drop stdin to close the pipe so xclip can finish.
        }

        let status = child
            .wait()
            .await
            .map_err(|e| InjectError::Clipboard(format!("wait for xclip: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(InjectError::Clipboard(format!("xclip exited with {status}")))
        }
    }
}
