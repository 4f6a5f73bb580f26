//! The [`Log`] trait shared by the resolver, installer and commands.

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) forwards to `tracing`; tests substitute
/// a recorder so progress messages can be asserted on.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
}

/// In-memory [`Log`] for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::sync::Mutex;

    use super::Log;

    /// Records every message with a short level tag (`stage`, `info`, ...).
    #[derive(Debug, Default)]
    pub struct RecordingLog {
        messages: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingLog {
        fn push(&self, level: &'static str, msg: &str) {
            if let Ok(mut guard) = self.messages.lock() {
                guard.push((level, msg.to_string()));
            }
        }

        /// All messages logged at `level`, in order.
        pub fn at(&self, level: &str) -> Vec<String> {
            self.messages.lock().map_or_else(
                |_| Vec::new(),
                |g| {
                    g.iter()
                        .filter(|(l, _)| *l == level)
                        .map(|(_, m)| m.clone())
                        .collect()
                },
            )
        }

        /// Whether any message at `level` contains `needle`.
        pub fn contains(&self, level: &str, needle: &str) -> bool {
            self.at(level).iter().any(|m| m.contains(needle))
        }
    }

    impl Log for RecordingLog {
        fn stage(&self, msg: &str) {
            self.push("stage", msg);
        }
        fn info(&self, msg: &str) {
            self.push("info", msg);
        }
        fn debug(&self, msg: &str) {
            self.push("debug", msg);
        }
        fn warn(&self, msg: &str) {
            self.push("warn", msg);
        }
        fn error(&self, msg: &str) {
            self.push("error", msg);
        }
        fn dry_run(&self, msg: &str) {
            self.push("dry_run", msg);
        }
    }
}
