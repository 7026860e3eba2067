// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod error;
pub mod event;
pub mod pipeline;
pub mod recorder;
pub mod sink;

pub use error::{AuditError, AuditResult, AuditSinkError};
pub use event::{AuditEventType, AuditLogBuilder, AuditLogEntry, AuditSeverity};
pub use pipeline::AuditService;
pub use recorder::{
	AuditRecorder, CloseReason, CommandOutcome, CommandRecord, NoopAuditRecorder, SessionAuditInfo,
};
pub use sink::file::FileAuditSink;
pub use sink::tracing::TracingAuditSink;
pub use sink::AuditSink;
