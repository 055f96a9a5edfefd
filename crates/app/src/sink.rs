use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The interim preview surface, abstracted so the redraw mechanics (cursor
/// tricks on a real terminal) stay out of the interim loop's control flow.
pub trait InterimSink: Send + Sync {
    fn show(&self, text: &str);
    fn clear(&self);
}

/// Redraws the current interim in place on stderr using a carriage return,
/// padding with spaces to erase whatever was longer on the previous draw.
#[derive(Default)]
pub struct StderrSink {
    max_len: AtomicUsize,
}

impl StderrSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InterimSink for StderrSink {
    fn show(&self, text: &str) {
        let len = text.chars().count();
        let prev_max = self.max_len.fetch_max(len, Ordering::Relaxed).max(len);
        let mut line = String::with_capacity(prev_max + 1);
        line.push('\r');
        line.push_str(text);
        for _ in len..prev_max {
            line.push(' ');
        }
        let mut stderr = io::stderr();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    fn clear(&self) {
        let max = self.max_len.swap(0, Ordering::Relaxed);
        if max == 0 {
            return;
        }
        let line = format!("\r{}\r", " ".repeat(max));
        let mut stderr = io::stderr();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// No-op sink for runs with the interim preview disabled.
pub struct NullSink;

impl InterimSink for NullSink {
    fn show(&self, _text: &str) {}
    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_max_len_across_show_calls() {
        let sink = StderrSink::new();
        sink.show("hello");
        sink.show("hi");
        assert_eq!(sink.max_len.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn clear_resets_max_len() {
        let sink = StderrSink::new();
        sink.show("hello");
        sink.clear();
        assert_eq!(sink.max_len.load(Ordering::Relaxed), 0);
    }
}
