//! Operation events.
//!
//! Every Issue, Validate, Renew and Cancel emits exactly one [`StsEvent`]
//! when it finishes, success or failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{FaultCode, StsError};
use crate::request::RequestType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(FaultCode),
}

#[derive(Debug, Clone)]
pub struct StsEvent {
    pub operation: RequestType,
    pub outcome: Outcome,
    pub duration: Duration,
    pub realm: Option<String>,
    pub principal: Option<String>,
    pub token_type: Option<String>,
    pub applies_to: Option<String>,
    pub error: Option<String>,
}

impl StsEvent {
    #[must_use]
    pub fn new(operation: RequestType, duration: Duration) -> Self {
        Self {
            operation,
            outcome: Outcome::Success,
            duration,
            realm: None,
            principal: None,
            token_type: None,
            applies_to: None,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(mut self, error: &StsError) -> Self {
        self.outcome = Outcome::Failure(error.fault_code());
        self.error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

pub trait StsEventListener: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &StsEvent);
}

/// Writes one structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventListener;

impl StsEventListener for LoggingEventListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_event(&self, event: &StsEvent) {
        let duration_ms = event.duration.as_millis() as u64;
        match event.outcome {
            Outcome::Success => info!(
                operation = %event.operation,
                duration_ms,
                realm = ?event.realm,
                principal = ?event.principal,
                token_type = ?event.token_type,
                applies_to = ?event.applies_to,
                "STS operation succeeded"
            ),
            Outcome::Failure(code) => warn!(
                operation = %event.operation,
                duration_ms,
                realm = ?event.realm,
                principal = ?event.principal,
                token_type = ?event.token_type,
                applies_to = ?event.applies_to,
                fault = %code.qname(),
                error = event.error.as_deref().unwrap_or_default(),
                "STS operation failed"
            ),
        }
    }
}

/// Fans an event out to every listener in registration order.
#[derive(Clone, Default)]
pub struct EventPublisher {
    listeners: Vec<Arc<dyn StsEventListener>>,
}

impl EventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn StsEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn publish(&self, event: &StsEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field(
                "listeners",
                &self.listeners.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
