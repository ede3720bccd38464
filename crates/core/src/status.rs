//! Status sink (C1): typed event emitter consumed by the presentation
//! layer. The core never formats for a specific UI — it only calls the
//! sink with `(message, busy?, attestation_ref?)`.

use std::sync::Mutex;

/// One emitted status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub message: String,
    pub busy: bool,
    pub attestation_ref: Option<String>,
}

/// The only interface between the core and the presentation layer.
pub trait StatusSink: Send + Sync {
    fn emit(&self, message: &str, busy: bool, attestation_ref: Option<&str>);

    fn info(&self, message: &str) {
        self.emit(message, false, None);
    }

    fn busy(&self, message: &str) {
        self.emit(message, true, None);
    }

    fn attestation(&self, message: &str, attestation_ref: &str) {
        self.emit(message, false, Some(attestation_ref));
    }
}

/// Default sink: logs every status via `tracing`.
#[derive(Debug, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn emit(&self, message: &str, busy: bool, attestation_ref: Option<&str>) {
        match attestation_ref {
            Some(r) => tracing::info!(busy, attestation_ref = r, "{message}"),
            None => tracing::info!(busy, "{message}"),
        }
    }
}

/// Test sink: records every event in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().expect("status sink mutex poisoned").clone()
    }

    pub fn last(&self) -> Option<StatusEvent> {
        self.events.lock().expect("status sink mutex poisoned").last().cloned()
    }
}

impl StatusSink for RecordingStatusSink {
    fn emit(&self, message: &str, busy: bool, attestation_ref: Option<&str>) {
        self.events
            .lock()
            .expect("status sink mutex poisoned")
            .push(StatusEvent {
                message: message.to_string(),
                busy,
                attestation_ref: attestation_ref.map(str::to_string),
            });
    }
}
