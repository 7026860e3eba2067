// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The contract the terminal broker records against.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};
use crate::event::{AuditEventType, AuditLogEntry};
use crate::pipeline::AuditService;

/// Who opened a terminal session, and against what.
#[derive(Debug, Clone)]
pub struct SessionAuditInfo {
	pub user: String,
	pub cluster_id: String,
	pub namespace: String,
	pub remote_addr: Option<String>,
}

/// How a command invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
	Succeeded,
	Failed,
	TimedOut,
	Interrupted,
	SpawnFailed,
	Builtin,
}

/// One executed command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
	/// The line as the user typed it.
	pub input: String,
	/// The argv actually executed, credential path elided.
	pub normalized: String,
	pub namespace: String,
	pub output: String,
	pub outcome: CommandOutcome,
	pub exit_code: Option<i32>,
	pub duration_ms: u64,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
	ClientClosed,
	/// Cluster lookup or credential setup failed after the upgrade.
	ConnectFailed(String),
	TransportError(String),
	UpgradeFailed(String),
	Shutdown,
}

impl CloseReason {
	pub fn is_error(&self) -> bool {
		matches!(
			self,
			CloseReason::ConnectFailed(_) | CloseReason::TransportError(_) | CloseReason::UpgradeFailed(_)
		)
	}
}

impl fmt::Display for CloseReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CloseReason::ClientClosed => write!(f, "client closed the connection"),
			CloseReason::ConnectFailed(e) => write!(f, "cluster connection failed: {e}"),
			CloseReason::TransportError(e) => write!(f, "transport error: {e}"),
			CloseReason::UpgradeFailed(e) => write!(f, "connection upgrade failed: {e}"),
			CloseReason::Shutdown => write!(f, "server shutting down"),
		}
	}
}

/// Audit recorder consumed by the terminal broker.
///
/// Everything except session creation is fire-and-forget: implementations
/// must not block, and failures are logged rather than returned.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
	/// Open an audit session and return its correlation id.
	async fn create_session(&self, info: &SessionAuditInfo) -> AuditResult<String>;

	fn record_command(&self, session_id: &str, info: &SessionAuditInfo, record: CommandRecord);

	fn close_session(&self, session_id: &str, info: &SessionAuditInfo, reason: CloseReason);
}

#[async_trait]
impl AuditRecorder for AuditService {
	async fn create_session(&self, info: &SessionAuditInfo) -> AuditResult<String> {
		let session_id = Uuid::new_v4().to_string();
		let entry = base_entry(AuditEventType::TerminalSessionOpened, &session_id, info)
			.details(json!({ "remote_addr": info.remote_addr }))
			.build();

		if self.log(entry) {
			Ok(session_id)
		} else {
			Err(AuditError::QueueFull)
		}
	}

	fn record_command(&self, session_id: &str, info: &SessionAuditInfo, record: CommandRecord) {
		let details = serde_json::to_value(&record).unwrap_or_default();
		let entry = base_entry(AuditEventType::TerminalCommandExecuted, session_id, info)
			.namespace(record.namespace)
			.action(record.input)
			.details(details)
			.build();
		self.log(entry);
	}

	fn close_session(&self, session_id: &str, info: &SessionAuditInfo, reason: CloseReason) {
		let event_type = if reason.is_error() {
			AuditEventType::TerminalSessionFailed
		} else {
			AuditEventType::TerminalSessionClosed
		};
		let entry = base_entry(event_type, session_id, info)
			.details(json!({ "reason": reason.to_string() }))
			.build();
		self.log(entry);
	}
}

fn base_entry(
	event_type: AuditEventType,
	session_id: &str,
	info: &SessionAuditInfo,
) -> crate::event::AuditLogBuilder {
	AuditLogEntry::builder(event_type, session_id)
		.actor(&info.user)
		.cluster(&info.cluster_id)
		.namespace(&info.namespace)
}

/// Recorder that drops everything, for when auditing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditRecorder;

#[async_trait]
impl AuditRecorder for NoopAuditRecorder {
	async fn create_session(&self, _info: &SessionAuditInfo) -> AuditResult<String> {
		Ok(Uuid::new_v4().to_string())
	}

	fn record_command(&self, _session_id: &str, _info: &SessionAuditInfo, _record: CommandRecord) {}

	fn close_session(&self, _session_id: &str, _info: &SessionAuditInfo, _reason: CloseReason) {}
}
