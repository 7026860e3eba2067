// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::AuditSinkError;
use crate::event::AuditLogEntry;
use crate::sink::AuditSink;

/// Appends one JSON document per line to a file.
pub struct FileAuditSink {
	path: PathBuf,
	file: Mutex<Option<tokio::fs::File>>,
}

impl FileAuditSink {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			file: Mutex::new(None),
		}
	}

	async fn write_line(&self, line: &str) -> Result<(), AuditSinkError> {
		let mut guard = self.file.lock().await;

		if guard.is_none() {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&self.path)
				.await
				.map_err(|e| AuditSinkError::Transient(format!("failed to open file: {e}")))?;
			*guard = Some(file);
		}

		let file = guard
			.as_mut()
			.ok_or_else(|| AuditSinkError::Permanent("file handle not initialized".to_string()))?;

		file
			.write_all(line.as_bytes())
			.await
			.map_err(|e| AuditSinkError::Transient(format!("failed to write to file: {e}")))?;
		file
			.flush()
			.await
			.map_err(|e| AuditSinkError::Transient(format!("failed to flush file: {e}")))?;

		Ok(())
	}
}

#[async_trait]
impl AuditSink for FileAuditSink {
	fn name(&self) -> &str {
		"file"
	}

	async fn publish(&self, entry: Arc<AuditLogEntry>) -> Result<(), AuditSinkError> {
		let line = format_json_line(&entry)?;
		self.write_line(&line).await
	}
}

pub fn format_json_line(entry: &AuditLogEntry) -> Result<String, AuditSinkError> {
	let json = serde_json::to_string(entry)
		.map_err(|e| AuditSinkError::Permanent(format!("JSON serialization failed: {e}")))?;
	Ok(format!("{json}\n"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::AuditEventType;

	#[tokio::test]
	async fn appends_one_json_line_per_entry() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("audit.jsonl");
		let sink = FileAuditSink::new(&path);

		for session in ["a", "b"] {
			let entry = AuditLogEntry::builder(AuditEventType::TerminalSessionOpened, session).build();
			sink.publish(Arc::new(entry)).await.unwrap();
		}

		let content = tokio::fs::read_to_string(&path).await.unwrap();
		let lines: Vec<&str> = content.lines().collect();
		assert_eq!(lines.len(), 2);
		let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
		assert_eq!(second["session_id"], "b");
	}

	#[tokio::test]
	async fn unwritable_path_is_transient_error() {
		let dir = tempfile::TempDir::new().unwrap();
		let sink = FileAuditSink::new(dir.path().join("missing").join("audit.jsonl"));
		let entry = AuditLogEntry::builder(AuditEventType::TerminalSessionOpened, "a").build();
		assert!(matches!(
			sink.publish(Arc::new(entry)).await,
			Err(AuditSinkError::Transient(_))
		));
	}
}
