// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for identity and ledger write operations.
//!
//! Enrollments, registrations and every transaction submission attempt are
//! appended to a daily JSONL file in the wallet directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StorageResult, WalletStorage};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Identity events
    AdminEnrolled,
    UserRegistered,
    UserEnrolled,

    // Ledger events
    TransactionSubmitted,
    TransactionFailed,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Identity that performed the action.
    pub identity: Option<String>,
    /// Affected resource (identity label or transaction id).
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            identity: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_identity(mut self, label: impl Into<String>) -> Self {
        self.identity = Some(label.into());
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    storage: &'a WalletStorage,
}

impl<'a> AuditRepository<'a> {
    pub fn new(storage: &'a WalletStorage) -> Self {
        Self { storage }
    }

    /// Append an event to the log file of its day.
    ///
    /// Each event is one `write` on a file opened in append mode, so
    /// concurrent writers never interleave or drop lines.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.storage.append_raw(&path, &line)
    }

    /// Log an event, downgrading a storage failure to a warning.
    ///
    /// Audit writes never fail the operation being audited.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::warn!(
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// [`record`](Self::record) on the blocking thread pool.
    pub async fn record_async(&self, event: AuditEvent) {
        let storage = self.storage.clone();
        let written =
            tokio::task::spawn_blocking(move || AuditRepository::new(&storage).record(event)).await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "Audit writer task failed");
        }
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = self.storage.read_raw(&path)?;

        let mut events = Vec::new();
        for line in content.split(|byte| *byte == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            events.push(serde_json::from_slice(line)?);
        }

        Ok(events)
    }

    /// Today's events.
    pub fn read_today(&self) -> StorageResult<Vec<AuditEvent>> {
        self.read_events(&Utc::now().format("%Y-%m-%d").to_string())
    }
}
