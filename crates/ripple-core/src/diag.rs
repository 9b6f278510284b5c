#![forbid(unsafe_code)]

//! Diagnostics channel.
//!
//! No condition in this runtime is fatal: circular-update trips, deferred
//! resolution failures, and timeouts all degrade gracefully and report a
//! human-readable message through a [`DiagSink`]. There is no structured
//! error type — a message is the whole contract.

use std::cell::RefCell;

/// Sink for human-readable diagnostics.
pub trait DiagSink {
    /// Report a recoverable problem.
    fn warn(&self, msg: &str);
}

/// Default sink: forwards to `tracing::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagSink for TracingSink {
    fn warn(&self, msg: &str) {
        tracing::warn!(target: "ripple", "{msg}");
    }
}

/// Capturing sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: RefCell<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages reported so far.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    /// Whether any reported message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.borrow().iter().any(|m| m.contains(needle))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl DiagSink for MemorySink {
    fn warn(&self, msg: &str) {
        self.messages.borrow_mut().push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_captures_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.warn("first");
        sink.warn("second problem");
        assert_eq!(sink.messages(), vec!["first", "second problem"]);
        assert!(sink.contains("second"));
        assert!(!sink.contains("third"));
    }
}
