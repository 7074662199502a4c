//! In-memory sink for tracing output while the call console owns the screen.
//!
//! `LogBuffer` implements `MakeWriter`, so the fmt layer writes here instead
//! of stderr and the alternate screen stays intact.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

/// Lines kept before the oldest are discarded.
const DEFAULT_CAPACITY: usize = 500;

/// Bounded, shareable queue of complete log lines.
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    // A panic elsewhere must not take logging down with it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Take every buffered line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.lock().drain(..).collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer handed out for a single tracing event. The fmt layer formats the
/// whole event before writing, so lines are split once, on drop.
pub struct EventWriter {
    sink: LogBuffer,
    bytes: Vec<u8>,
}

impl Write for EventWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.bytes);
        for line in text.lines().filter(|l| !l.is_empty()) {
            self.sink.push(line.to_owned());
        }
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            sink: self.clone(),
            bytes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_buffer() {
        let buf = LogBuffer::new();
        buf.push("Call state: idle -> connecting".to_string());
        buf.push("Call state: connecting -> connected".to_string());

        assert_eq!(buf.drain().len(), 2);
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buf = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buf.push(format!("tick {}", i));
        }
        assert_eq!(buf.drain(), vec!["tick 2", "tick 3", "tick 4"]);
    }

    #[test]
    fn test_event_lands_on_drop() {
        let buf = LogBuffer::new();
        let mut writer = buf.make_writer();
        write!(writer, "Call state: connected -> reconnecting\r\n").unwrap();
        write!(writer, "  caused by: NETWORK_LOST\n").unwrap();
        assert!(buf.drain().is_empty());

        drop(writer);
        assert_eq!(
            buf.drain(),
            vec!["Call state: connected -> reconnecting", "  caused by: NETWORK_LOST"]
        );
    }

    #[test]
    fn test_captures_subscriber_output() {
        use tracing_subscriber::layer::SubscriberExt;

        let buf = LogBuffer::with_capacity(10);
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(buf.clone()),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Call failed: boom");
        });

        let lines = buf.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" WARN "), "{}", lines[0]);
        assert!(lines[0].ends_with("Call failed: boom"));
    }
}
