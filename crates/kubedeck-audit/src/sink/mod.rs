// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuditSinkError;
use crate::event::AuditLogEntry;

pub mod file;
pub mod tracing;

/// Destination for audit entries. Publishing happens off the caller's path.
#[async_trait]
pub trait AuditSink: Send + Sync {
	fn name(&self) -> &str;

	async fn publish(&self, entry: Arc<AuditLogEntry>) -> Result<(), AuditSinkError>;
}
