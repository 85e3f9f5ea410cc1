//! Event port - structured ledger events
//!
//! The engine reports each operation outcome to an injected [`EventSink`]
//! instead of writing to a process-global logger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, ErrorKind};
use crate::domain::AccountId;

/// Outcome of one ledger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub operation_id: Uuid,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LedgerEvent {
    /// Create a new event with just an event name
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            event: event.into(),
            timestamp: Utc::now(),
            account_id: None,
            counterparty: None,
            item: None,
            amount: None,
            error_kind: None,
            error_message: None,
        }
    }

    /// Reuse the id of the operation this event belongs to
    pub fn with_operation_id(mut self, id: Uuid) -> Self {
        self.operation_id = id;
        self
    }

    pub fn with_account(mut self, id: AccountId) -> Self {
        self.account_id = Some(id);
        self
    }

    pub fn with_counterparty(mut self, name: impl Into<String>) -> Self {
        self.counterparty = Some(name.into());
        self
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Record the failure that ended the operation
    pub fn with_error(mut self, error: &Error) -> Self {
        self.error_kind = Some(error.kind());
        self.error_message = Some(error.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Receiver of ledger events
///
/// Emission must not fail the operation that produced the event; sinks swallow
/// their own errors.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LedgerEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &LedgerEvent) {}
}

/// Forwards each event to every inner sink
#[derive(Default, Clone)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for CompositeEventSink {
    fn emit(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
