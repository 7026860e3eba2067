// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuditSinkError;
use crate::event::{AuditLogEntry, AuditSeverity};
use crate::sink::AuditSink;

/// Emits audit entries as structured log events under `kubedeck::audit`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn publish(&self, entry: Arc<AuditLogEntry>) -> Result<(), AuditSinkError> {
		let details = entry.details.to_string();
		match entry.severity {
			AuditSeverity::Warning | AuditSeverity::Error => ::tracing::warn!(
				target: "kubedeck::audit",
				event_type = %entry.event_type,
				session_id = %entry.session_id,
				actor = entry.actor.as_deref().unwrap_or("-"),
				cluster_id = entry.cluster_id.as_deref().unwrap_or("-"),
				namespace = entry.namespace.as_deref().unwrap_or("-"),
				details = %details,
				"{}",
				entry.action
			),
			_ => ::tracing::info!(
				target: "kubedeck::audit",
				event_type = %entry.event_type,
				session_id = %entry.session_id,
				actor = entry.actor.as_deref().unwrap_or("-"),
				cluster_id = entry.cluster_id.as_deref().unwrap_or("-"),
				namespace = entry.namespace.as_deref().unwrap_or("-"),
				details = %details,
				"{}",
				entry.action
			),
		}
		Ok(())
	}
}
