//! Warning sink for soft failures.
//!
//! Unknown effect/transition types, invalid plugin shapes and similar
//! conditions degrade a scene instead of crashing it. They are routed through
//! a [`Reporter`] so hosts can surface them and tests can capture them
//! without patching process-wide state.

use std::sync::Mutex;

pub trait Reporter: Send + Sync {
    fn warning(&self, message: &str);
}

/// Default sink: forwards to `tracing::warn!`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn warning(&self, message: &str) {
        tracing::warn!(target: "kinetta", "{message}");
    }
}

/// Collects warnings in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("reporter lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("reporter lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reporter for CollectingReporter {
    fn warning(&self, message: &str) {
        self.messages
            .lock()
            .expect("reporter lock poisoned")
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_reporter_records_in_order() {
        let r = CollectingReporter::new();
        r.warning("first");
        r.warning("second");
        assert_eq!(r.messages(), vec!["first", "second"]);
    }
}
