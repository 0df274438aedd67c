//! Non-fatal scan diagnostics.
//!
//! Each diagnostic is logged through `tracing` when recorded and also kept in
//! the scan report, so callers can see which entries were included, skipped
//! or failed without installing a subscriber.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Manifest,
    DuplicateEntry,
    DuplicateClass,
    SigningFile,
    SyntheticSkipped,
    EntryFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            entry: None,
            message: message.into(),
        }
    }

    pub fn for_entry(
        severity: Severity,
        kind: DiagnosticKind,
        entry: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            entry: Some(entry.to_string()),
            message: message.into(),
        }
    }

    pub fn emit(&self) {
        let entry = self.entry.as_deref().unwrap_or("");
        match self.severity {
            Severity::Debug => tracing::debug!(kind = ?self.kind, entry, "{}", self.message),
            Severity::Info => tracing::info!(kind = ?self.kind, entry, "{}", self.message),
            Severity::Warn => tracing::warn!(kind = ?self.kind, entry, "{}", self.message),
            Severity::Error => tracing::error!(kind = ?self.kind, entry, "{}", self.message),
        }
    }
}
