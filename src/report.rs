//! Progress and log reporting.
//!
//! The orchestrator's only human-visible side channel: one line per phase
//! transition and one per chunk of child-process output.

use tokio::sync::mpsc;

/// Sink for human-readable progress lines.
///
/// Implementations must not block; lines arrive from async tasks.
pub trait ProgressSink: Send + Sync {
    /// Writes one newline-terminated line of progress or process output.
    fn write_line(&self, line: &str);
}

/// Sink that prints lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ProgressSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Sink that forwards lines into an unbounded channel, for a terminal
/// widget or a test harness to drain.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn write_line(&self, line: &str) {
        // A dropped receiver means nobody is watching anymore.
        let _ = self.tx.send(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_lines_in_order() {
        let (sink, mut rx) = ChannelSink::new();

        sink.write_line("first");
        sink.write_line("second");

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);

        sink.write_line("nobody is listening");
    }
}
