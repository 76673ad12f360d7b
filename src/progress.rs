//! Output mode handling for transport progress.
//!
//! libgit2 reports progress through callbacks. Depending on the
//! [`OutputMode`] that text is forwarded to a live progress bar, or captured
//! so it can be attached to an error once output has been kept quiet.
//!
//! Capture hands every chunk to a dedicated drain thread over a bounded
//! channel. The drain never blocks on anything but the channel, so the
//! transport can keep writing for as long as the blocking call runs, and the
//! captured text is only read after the drain has been joined.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::error::Diagnostics;

/// Upper bound on captured bytes per stream. Anything past this is counted
/// and reported, not kept.
pub const CAPTURE_LIMIT: usize = 64 * 1024;

const CHANNEL_DEPTH: usize = 64;

/// How transport progress reaches the user.
#[derive(Clone)]
pub enum OutputMode {
    /// Progress is drawn on this bar as it arrives.
    Live(ProgressBar),
    /// Progress is kept out of sight and captured for error reports.
    Quiet,
}

impl OutputMode {
    /// Open a fresh stream for one transport call.
    pub fn stream(&self) -> ProgressStream {
        match self {
            OutputMode::Live(pb) => ProgressStream::Live(pb.clone()),
            OutputMode::Quiet => ProgressStream::Capture(Capture::start(CAPTURE_LIMIT)),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        if let OutputMode::Live(pb) = self {
            pb.set_message(msg.into());
        }
    }
}

/// Destination for one transport call's progress text.
pub enum ProgressStream {
    Discard,
    Live(ProgressBar),
    Capture(Capture),
}

impl ProgressStream {
    /// Remote sideband text ("remote: Counting objects ...").
    pub fn write(&self, data: &[u8]) {
        match self {
            ProgressStream::Discard => {}
            ProgressStream::Live(pb) => forward_live(pb, data),
            ProgressStream::Capture(c) => c.write(data),
        }
    }

    /// Object transfer counters for clone/fetch.
    pub fn objects(&self, received: usize, total: usize) {
        if let ProgressStream::Live(pb) = self {
            pb.set_length(total as u64);
            pb.set_position(received as u64);
        }
    }

    /// Stop the stream and hand back whatever was captured.
    pub fn finish(self) -> Diagnostics {
        match self {
            ProgressStream::Capture(c) => c.finish(),
            _ => Diagnostics::default(),
        }
    }
}

/// `\r`-terminated fragments redraw the bar message, completed lines are
/// printed above it.
fn forward_live(pb: &ProgressBar, data: &[u8]) {
    let text = String::from_utf8_lossy(data);
    for segment in text.split_inclusive(['\r', '\n']) {
        let line = segment.trim_end_matches(['\r', '\n']).trim_end();
        if line.is_empty() {
            continue;
        }
        if segment.ends_with('\n') {
            pb.println(line);
        } else {
            pb.set_message(line.to_string());
        }
    }
}

/// In-memory capture drained concurrently by a worker thread.
#[derive(Debug)]
pub struct Capture {
    tx: Option<SyncSender<Vec<u8>>>,
    drain: Option<JoinHandle<Diagnostics>>,
}

impl Capture {
    pub fn start(limit: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let drain = thread::spawn(move || drain(rx, limit));
        Self {
            tx: Some(tx),
            drain: Some(drain),
        }
    }

    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(data.to_vec());
        }
    }

    /// Close the channel and join the drain thread.
    pub fn finish(mut self) -> Diagnostics {
        self.tx.take();
        self.drain
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(h) = self.drain.take() {
            let _ = h.join();
        }
    }
}

fn drain(rx: Receiver<Vec<u8>>, limit: usize) -> Diagnostics {
    let mut kept: Vec<u8> = Vec::new();
    let mut dropped = 0usize;
    for chunk in rx {
        let room = limit.saturating_sub(kept.len());
        let take = room.min(chunk.len());
        kept.extend_from_slice(&chunk[..take]);
        dropped += chunk.len() - take;
    }
    Diagnostics {
        text: String::from_utf8_lossy(&kept).into_owned(),
        truncated_bytes: dropped,
    }
}

/// Spinner style used during ongoing operations.
/// - Yellow spinner with animated braille-style frames.
/// - Displays the current message (`{wide_msg}`) next to the spinner.
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

/// Style used when the deployment has been triggered.
pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[32m✔\x1b[0m {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Style used when a step fails.
pub fn err_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[31m✘\x1b[0m {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
