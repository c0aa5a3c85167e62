//! Search progress reporting.
//!
//! Reports what a running search is doing so users see how many files
//! matched and which one is being processed. Terminal output goes to
//! **stderr** so stdout remains parseable for scripts. [`ChannelProgress`]
//! publishes the same events on an in-process broadcast channel for
//! subscribers such as a push transport.

use std::io::Write;

use serde::Serialize;
use tokio::sync::broadcast;

use cinder_search_core::progress::{
    NoProgress, ProgressReporter, SearchProgressEvent, SearchStatus,
};

/// Human-friendly progress on stderr: "search 1f2e…  in progress  3 / 1,204 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, _group: &str, event: &SearchProgressEvent) {
        let line = match event.status {
            SearchStatus::Started => format!("search {}  started\n", event.id),
            SearchStatus::InProgress => format!(
                "search {}  in progress  {} / {} files\n",
                event.id,
                format_number(event.current_progress.unwrap_or(0) as u64),
                format_number(event.found_files.unwrap_or(0) as u64)
            ),
            SearchStatus::Complete => format!("search {}  complete\n", event.id),
            SearchStatus::Error => format!(
                "search {}  error: {}\n",
                event.id,
                event.error.as_deref().unwrap_or("unknown error")
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, group: &str, event: &SearchProgressEvent) {
        let message = ProgressMessage {
            group: group.to_string(),
            message: event.clone(),
        };
        if let Ok(line) = serde_json::to_string(&message) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// An event together with the group it is addressed to.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressMessage {
    pub group: String,
    pub message: SearchProgressEvent,
}

/// Publishes events on a broadcast channel. Sends without subscribers are dropped.
#[derive(Clone)]
pub struct ChannelProgress {
    sender: broadcast::Sender<ProgressMessage>,
}

impl ChannelProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressMessage> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, group: &str, event: &SearchProgressEvent) {
        let _ = self.sender.send(ProgressMessage {
            group: group.to_string(),
            message: event.clone(),
        });
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse `--progress` values: `off`, `human`, `json`.
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parsing() {
        assert_eq!(ProgressMode::parse("json").unwrap(), ProgressMode::Json);
        assert_eq!(ProgressMode::parse("off").unwrap(), ProgressMode::Off);
        assert!(ProgressMode::parse("loud").is_err());
    }

    #[tokio::test]
    async fn channel_delivers_addressed_events() {
        let channel = ChannelProgress::new(8);
        let mut rx = channel.subscribe();
        channel.report("search_c1", &SearchProgressEvent::started("s1"));
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.group, "search_c1");
        assert_eq!(msg.message.status, SearchStatus::Started);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message"]["type"], "search_status");
    }
}
