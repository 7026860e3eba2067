// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core event types for the terminal audit trail.
//!
//! - [`AuditEventType`]: what happened
//! - [`AuditSeverity`]: RFC 5424-compatible severity levels
//! - [`AuditLogEntry`]: one append-only record, correlated by audit session id
//! - [`AuditLogBuilder`]: fluent construction of entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Types of events recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	TerminalSessionOpened,
	TerminalSessionFailed,
	TerminalSessionClosed,
	TerminalCommandExecuted,
}

impl AuditEventType {
	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			AuditEventType::TerminalSessionFailed => AuditSeverity::Warning,
			AuditEventType::TerminalCommandExecuted => AuditSeverity::Notice,
			AuditEventType::TerminalSessionOpened | AuditEventType::TerminalSessionClosed => {
				AuditSeverity::Info
			}
		}
	}
}

impl fmt::Display for AuditEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditEventType::TerminalSessionOpened => "terminal_session_opened",
			AuditEventType::TerminalSessionFailed => "terminal_session_failed",
			AuditEventType::TerminalSessionClosed => "terminal_session_closed",
			AuditEventType::TerminalCommandExecuted => "terminal_command_executed",
		};
		write!(f, "{s}")
	}
}

/// Severity levels aligned with RFC 5424 syslog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
	Warning = 4,
	Error = 3,
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Debug => "debug",
			AuditSeverity::Info => "info",
			AuditSeverity::Notice => "notice",
			AuditSeverity::Warning => "warning",
			AuditSeverity::Error => "error",
		};
		write!(f, "{s}")
	}
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event_type: AuditEventType,
	pub severity: AuditSeverity,
	/// Correlates every record of one terminal session.
	pub session_id: String,
	pub actor: Option<String>,
	pub cluster_id: Option<String>,
	pub namespace: Option<String>,
	pub action: String,
	pub details: serde_json::Value,
}

impl AuditLogEntry {
	pub fn builder(event_type: AuditEventType, session_id: impl Into<String>) -> AuditLogBuilder {
		AuditLogBuilder::new(event_type, session_id)
	}
}

pub struct AuditLogBuilder {
	event_type: AuditEventType,
	session_id: String,
	severity: Option<AuditSeverity>,
	actor: Option<String>,
	cluster_id: Option<String>,
	namespace: Option<String>,
	action: Option<String>,
	details: serde_json::Value,
}

impl AuditLogBuilder {
	pub fn new(event_type: AuditEventType, session_id: impl Into<String>) -> Self {
		Self {
			event_type,
			session_id: session_id.into(),
			severity: None,
			actor: None,
			cluster_id: None,
			namespace: None,
			action: None,
			details: serde_json::Value::Null,
		}
	}

	/// Set the severity level. Defaults to the event type's default severity.
	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.severity = Some(severity);
		self
	}

	pub fn actor(mut self, actor: impl Into<String>) -> Self {
		self.actor = Some(actor.into());
		self
	}

	pub fn cluster(mut self, cluster_id: impl Into<String>) -> Self {
		self.cluster_id = Some(cluster_id.into());
		self
	}

	pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn action(mut self, action: impl Into<String>) -> Self {
		self.action = Some(action.into());
		self
	}

	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	pub fn build(self) -> AuditLogEntry {
		AuditLogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			severity: self.severity.unwrap_or_else(|| self.event_type.default_severity()),
			event_type: self.event_type,
			session_id: self.session_id,
			actor: self.actor,
			cluster_id: self.cluster_id,
			namespace: self.namespace,
			action: self.action.unwrap_or_else(|| self.event_type.to_string()),
			details: self.details,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builder_defaults_severity_and_action_from_event_type() {
		let entry = AuditLogEntry::builder(AuditEventType::TerminalSessionFailed, "s-1").build();
		assert_eq!(entry.severity, AuditSeverity::Warning);
		assert_eq!(entry.action, "terminal_session_failed");
		assert_eq!(entry.session_id, "s-1");
		assert!(entry.details.is_null());
	}

	#[test]
	fn entry_serializes_snake_case_event_type() {
		let entry = AuditLogEntry::builder(AuditEventType::TerminalCommandExecuted, "s-2")
			.actor("alice")
			.cluster("prod")
			.namespace("default")
			.action("kubectl get pods")
			.build();
		let value = serde_json::to_value(&entry).unwrap();
		assert_eq!(value["event_type"], "terminal_command_executed");
		assert_eq!(value["severity"], "notice");
		assert_eq!(value["cluster_id"], "prod");
	}
}
