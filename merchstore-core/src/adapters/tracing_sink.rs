//! Event sink that forwards ledger events to `tracing`

use crate::ports::{EventSink, LedgerEvent};

/// Emits each [`LedgerEvent`] as a structured `tracing` record
///
/// Successful operations log at info, business rejections at warn and
/// everything else (storage failures, timeouts) at error.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn emit(&self, event: &LedgerEvent) {
        let operation_id = event.operation_id.to_string();
        match event.error_kind {
            None => tracing::info!(
                target: "merchstore::ledger",
                operation_id = %operation_id,
                event = %event.event,
                account_id = ?event.account_id,
                counterparty = ?event.counterparty,
                item = ?event.item,
                amount = ?event.amount,
                "ledger operation completed"
            ),
            Some(kind) if kind.is_rejection() => tracing::warn!(
                target: "merchstore::ledger",
                operation_id = %operation_id,
                event = %event.event,
                account_id = ?event.account_id,
                counterparty = ?event.counterparty,
                item = ?event.item,
                amount = ?event.amount,
                error_kind = kind.as_str(),
                error = ?event.error_message,
                "ledger operation rejected"
            ),
            Some(kind) => tracing::error!(
                target: "merchstore::ledger",
                operation_id = %operation_id,
                event = %event.event,
                account_id = ?event.account_id,
                error_kind = kind.as_str(),
                error = ?event.error_message,
                "ledger operation failed"
            ),
        }
    }
}
