//! Progress events emitted during a single extraction.

use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One event in the ordered trace of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Diagnostic message with structured context.
    Log {
        level: LogLevel,
        message: String,
        context: Value,
    },
    /// Exact text sent to the model.
    Prompt { text: String },
    /// Incremental fragment of model output.
    Response { fragment: String },
}

/// Receives the events of one extraction, in emission order.
pub trait ExtractionObserver: Send + Sync {
    fn on_event(&self, event: StreamEvent);
}

impl<F> ExtractionObserver for F
where
    F: Fn(StreamEvent) + Send + Sync,
{
    fn on_event(&self, event: StreamEvent) {
        self(event)
    }
}

/// Observer that records every event. Useful for tests and for replaying the
/// last prompt after a failure.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The most recent prompt sent to the model.
    pub fn last_prompt(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            StreamEvent::Prompt { text } => Some(text),
            _ => None,
        })
    }

    /// All response fragments concatenated.
    pub fn response_text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Response { fragment } => Some(fragment),
                _ => None,
            })
            .collect()
    }
}

impl ExtractionObserver for RecordingObserver {
    fn on_event(&self, event: StreamEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Forward an event when an observer is attached.
pub(crate) fn emit(observer: Option<&dyn ExtractionObserver>, event: StreamEvent) {
    if let Some(observer) = observer {
        observer.on_event(event);
    }
}

/// Emit a log event and mirror it to `tracing`.
pub(crate) fn emit_log(
    observer: Option<&dyn ExtractionObserver>,
    level: LogLevel,
    message: impl Into<String>,
    context: Value,
) {
    let message = message.into();
    match level {
        LogLevel::Debug => tracing::debug!(%context, "{}", message),
        LogLevel::Info => tracing::info!(%context, "{}", message),
        LogLevel::Warn => tracing::warn!(%context, "{}", message),
        LogLevel::Error => tracing::error!(%context, "{}", message),
    }
    emit(
        observer,
        StreamEvent::Log {
            level,
            message,
            context,
        },
    );
}
