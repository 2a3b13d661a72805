//! `railsync watch`: run a full session and follow it until Ctrl-C.
//!
//! Prints registry changes, status messages, and new entries of both the
//! transport log and the command-channel log as they arrive.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use railsync_core::{
    BoundedLog, ConnectionRecord, LogEntry, PowerStatus, RegistryChange, StatusMessage, SyncConfig,
    SyncSession,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One line of `--output json` watch output.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WatchEvent<'a> {
    Log {
        source: &'a str,
        #[serde(flatten)]
        entry: &'a LogEntry,
    },
    Status(&'a StatusMessage),
    Connection(&'a ConnectionRecord),
    ConnectionRemoved { id: &'a str },
}

pub async fn handle(
    mut config: SyncConfig,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.no_events {
        config.event_stream_enabled = false;
    }
    if args.no_channel {
        config.command_channel_enabled = false;
    }

    let session = SyncSession::new(config)?;
    let store = Arc::clone(session.store());
    let mut status_rx = store.subscribe_status();
    let mut transport_rx = store.subscribe_transport_log();
    let mut channel_rx = store.subscribe_channel_log();
    let mut connections = store.subscribe_connections();

    session.start().await?;
    info!(url = %session.config().base_url, "watching controller");

    let printer = Printer::new(global);
    let mut transport_cursor = LogCursor::default();
    let mut channel_cursor = LogCursor::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        let printed = tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            Ok(()) = status_rx.changed() => {
                let status = status_rx.borrow_and_update().clone();
                status.map_or(Ok(()), |s| printer.status(&s))
            }
            Ok(()) = transport_rx.changed() => {
                let fresh = transport_cursor.take_new(&transport_rx.borrow_and_update());
                printer.logs("transport", &fresh)
            }
            Ok(()) = channel_rx.changed() => {
                let fresh = channel_cursor.take_new(&channel_rx.borrow_and_update());
                printer.logs("channel", &fresh)
            }
            Some(change) = connections.changed() => printer.connections(&change),
        };
        if let Err(e) = printed {
            break Err(e);
        }
    };

    session.shutdown().await;
    result
}

// ── Log cursor ──────────────────────────────────────────────────────

/// Remembers the last printed entry of a bounded log so only newer
/// entries are printed, even after older ones were evicted.
#[derive(Default)]
struct LogCursor {
    last: Option<LogEntry>,
}

impl LogCursor {
    fn take_new(&mut self, log: &BoundedLog<LogEntry>) -> Vec<LogEntry> {
        let entries: Vec<&LogEntry> = log.iter().collect();
        let start = self
            .last
            .as_ref()
            .and_then(|last| entries.iter().rposition(|e| *e == last))
            .map_or(0, |i| i + 1);
        let fresh: Vec<LogEntry> = entries
            .get(start..)
            .unwrap_or_default()
            .iter()
            .map(|e| (*e).clone())
            .collect();
        if let Some(newest) = fresh.last() {
            self.last = Some(newest.clone());
        }
        fresh
    }
}

// ── Printer ─────────────────────────────────────────────────────────

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn new(global: &GlobalOpts) -> Self {
        Self {
            format: global.output,
            color: global.output == OutputFormat::Table && output::should_color(global.color),
            quiet: global.quiet,
        }
    }

    fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    fn emit(&self, event: &WatchEvent<'_>) -> Result<(), CliError> {
        let line = output::render_json(event, true)?;
        output::print_output(&line, self.quiet);
        Ok(())
    }

    fn status(&self, status: &StatusMessage) -> Result<(), CliError> {
        if self.json() {
            return self.emit(&WatchEvent::Status(status));
        }
        output::print_output(
            &format!("» {}", output::status_line(status, self.color)),
            self.quiet,
        );
        Ok(())
    }

    fn logs(&self, source: &str, entries: &[LogEntry]) -> Result<(), CliError> {
        for entry in entries {
            if self.json() {
                self.emit(&WatchEvent::Log { source, entry })?;
            } else {
                output::print_output(&output::log_line(entry, self.color), self.quiet);
            }
        }
        Ok(())
    }

    /// Print connections that appeared, changed, or went away.
    fn connections(&self, change: &RegistryChange) -> Result<(), CliError> {
        for record in &change.updated {
            if self.json() {
                self.emit(&WatchEvent::Connection(record))?;
            } else {
                output::print_output(&format!("≡ {}", connection_summary(record)), self.quiet);
            }
        }
        for id in &change.removed {
            if self.json() {
                self.emit(&WatchEvent::ConnectionRemoved { id })?;
            } else {
                output::print_output(&format!("≡ {id} removed"), self.quiet);
            }
        }
        Ok(())
    }
}

fn connection_summary(c: &ConnectionRecord) -> String {
    let mut line = format!(
        "{} ({}) {} power={}",
        c.id,
        c.system_type,
        if c.connected { "connected" } else { "disconnected" },
        c.power_status.unwrap_or(PowerStatus::Unknown),
    );
    if !c.roles.is_empty() {
        let roles: Vec<String> = c.roles.iter().map(ToString::to_string).collect();
        line.push_str(&format!(" roles={}", roles.join(",")));
    }
    if let Some(station) = c.command_station.as_ref() {
        line.push_str(&format!(" station=\"{}\"", station.summary()));
    }
    line
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use railsync_core::LogCategory;

    use super::*;

    fn entry(text: &str) -> LogEntry {
        LogEntry::new(LogCategory::Info, text)
    }

    #[test]
    fn cursor_only_yields_unseen_entries() {
        let mut log = BoundedLog::new(3);
        let mut cursor = LogCursor::default();

        log.append(entry("a"));
        log.append(entry("b"));
        let first: Vec<String> = cursor.take_new(&log).into_iter().map(|e| e.text).collect();
        assert_eq!(first, ["a", "b"]);
        assert!(cursor.take_new(&log).is_empty());

        // "a" and "b" are evicted; everything left is new.
        log.append(entry("c"));
        log.append(entry("d"));
        log.append(entry("e"));
        let next: Vec<String> = cursor.take_new(&log).into_iter().map(|e| e.text).collect();
        assert_eq!(next, ["c", "d", "e"]);
    }

    #[test]
    fn cursor_survives_a_cleared_log() {
        let mut log = BoundedLog::new(10);
        let mut cursor = LogCursor::default();
        log.append(entry("a"));
        assert_eq!(cursor.take_new(&log).len(), 1);

        log.clear();
        assert!(cursor.take_new(&log).is_empty());
        log.append(entry("b"));
        assert_eq!(cursor.take_new(&log)[0].text, "b");
    }

    #[test]
    fn json_watch_events_are_tagged() {
        let entry = entry("Channel open");
        let line = output::render_json(
            &WatchEvent::Log {
                source: "channel",
                entry: &entry,
            },
            true,
        )
        .unwrap();
        assert!(line.starts_with(r#"{"type":"log","source":"channel""#), "{line}");
        assert!(line.contains(r#""category":"info""#), "{line}");
    }

    #[test]
    fn removed_connection_event_carries_the_id() {
        let line =
            output::render_json(&WatchEvent::ConnectionRemoved { id: "z21" }, true).unwrap();
        assert_eq!(line, r#"{"type":"connection_removed","id":"z21"}"#);
    }
}
