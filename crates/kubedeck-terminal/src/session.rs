// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-connection session state.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kubedeck_audit::SessionAuditInfo;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialFile;
use crate::process::ProcessControl;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const BACKSPACE: char = '\u{7f}';
const CTRL_H: char = '\u{8}';
const ERASE: &str = "\u{8} \u{8}";

/// Keystrokes not yet submitted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineBuffer {
	line: String,
}

impl LineBuffer {
	/// Apply keystrokes and return the echo for them. Backspace removes the
	/// last character if there is one; other control characters are ignored.
	pub fn apply(&mut self, input: &str) -> String {
		let mut echo = String::new();
		for c in input.chars() {
			match c {
				BACKSPACE | CTRL_H => {
					if self.line.pop().is_some() {
						echo.push_str(ERASE);
					}
				}
				c if c.is_control() => {}
				c => {
					self.line.push(c);
					echo.push(c);
				}
			}
		}
		echo
	}

	pub fn take(&mut self) -> String {
		std::mem::take(&mut self.line)
	}

	pub fn clear(&mut self) {
		self.line.clear();
	}

	pub fn as_str(&self) -> &str {
		&self.line
	}

	pub fn is_empty(&self) -> bool {
		self.line.is_empty()
	}
}

/// Bounded command history, oldest evicted first.
#[derive(Debug, Clone)]
pub struct History {
	entries: VecDeque<String>,
	limit: usize,
}

impl History {
	pub fn new(limit: usize) -> Self {
		Self {
			entries: VecDeque::new(),
			limit: limit.max(1),
		}
	}

	pub fn push(&mut self, line: impl Into<String>) {
		if self.entries.len() == self.limit {
			self.entries.pop_front();
		}
		self.entries.push_back(line.into());
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(String::as_str)
	}

	/// Numbered listing, one entry per line.
	pub fn render(&self) -> String {
		self.entries
			.iter()
			.enumerate()
			.map(|(i, line)| format!("{:>5}  {line}\r\n", i + 1))
			.collect()
	}
}

/// The command currently holding the session.
pub struct RunningCommand {
	pub id: u64,
	pub line: String,
	pub control: ProcessControl,
	/// Flips to `true` once the command task has emitted `command_result`.
	pub finished: watch::Receiver<bool>,
	pub task: Option<JoinHandle<()>>,
}

impl RunningCommand {
	pub async fn wait_finished(&self) {
		let mut rx = self.finished.clone();
		let _ = rx.wait_for(|done| *done).await;
	}
}

/// Mutable session fields, guarded by the session lock.
pub struct SessionState {
	pub namespace: String,
	pub buffer: LineBuffer,
	pub history: History,
	pub running: Option<RunningCommand>,
	next_command_id: u64,
}

impl SessionState {
	pub fn next_command_id(&mut self) -> u64 {
		self.next_command_id += 1;
		self.next_command_id
	}

	/// Clear the running handle if it still belongs to `command_id`.
	pub fn finish_command(&mut self, command_id: u64) -> bool {
		match &self.running {
			Some(running) if running.id == command_id => {
				self.running = None;
				self.buffer.clear();
				true
			}
			_ => false,
		}
	}
}

/// Serializable snapshot for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
	pub session_id: String,
	pub cluster_id: String,
	pub namespace: String,
	pub user: String,
	/// The running command line, if any.
	pub running: Option<String>,
	pub history_len: usize,
	pub started_at: DateTime<Utc>,
}

/// One terminal conversation bound to one connection and one cluster.
pub struct Session {
	id: String,
	cluster_id: String,
	cluster_name: String,
	user: String,
	remote_addr: Option<String>,
	audit_session_id: String,
	credentials: CredentialFile,
	scope: CancellationToken,
	started_at: DateTime<Utc>,
	state: Mutex<SessionState>,
}

pub struct SessionParams {
	pub cluster_id: String,
	pub cluster_name: String,
	pub user: String,
	pub remote_addr: Option<String>,
	pub namespace: String,
	pub audit_session_id: String,
	pub history_limit: usize,
}

impl Session {
	pub fn new(params: SessionParams, credentials: CredentialFile, scope: CancellationToken) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			cluster_id: params.cluster_id,
			cluster_name: params.cluster_name,
			user: params.user,
			remote_addr: params.remote_addr,
			audit_session_id: params.audit_session_id,
			credentials,
			scope,
			started_at: Utc::now(),
			state: Mutex::new(SessionState {
				namespace: params.namespace,
				buffer: LineBuffer::default(),
				history: History::new(params.history_limit),
				running: None,
				next_command_id: 0,
			}),
		}
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn cluster_id(&self) -> &str {
		&self.cluster_id
	}

	pub fn cluster_name(&self) -> &str {
		&self.cluster_name
	}

	pub fn user(&self) -> &str {
		&self.user
	}

	pub fn audit_session_id(&self) -> &str {
		&self.audit_session_id
	}

	pub fn credentials(&self) -> &CredentialFile {
		&self.credentials
	}

	/// Cancelled when the session closes; parents every process kill token.
	pub fn scope(&self) -> &CancellationToken {
		&self.scope
	}

	/// Never held across an await.
	pub fn state(&self) -> MutexGuard<'_, SessionState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn namespace(&self) -> String {
		self.state().namespace.clone()
	}

	pub fn is_running(&self) -> bool {
		self.state().running.is_some()
	}

	pub fn audit_info(&self) -> SessionAuditInfo {
		SessionAuditInfo {
			user: self.user.clone(),
			cluster_id: self.cluster_id.clone(),
			namespace: self.namespace(),
			remote_addr: self.remote_addr.clone(),
		}
	}

	pub fn summary(&self) -> SessionSummary {
		let state = self.state();
		SessionSummary {
			session_id: self.id.clone(),
			cluster_id: self.cluster_id.clone(),
			namespace: state.namespace.clone(),
			user: self.user.clone(),
			running: state.running.as_ref().map(|r| r.line.clone()),
			history_len: state.history.len(),
			started_at: self.started_at,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn backspace_on_empty_buffer_echoes_nothing() {
		let mut buffer = LineBuffer::default();
		assert_eq!(buffer.apply("\u{7f}"), "");
		assert_eq!(buffer.apply("ab\u{7f}"), "ab\u{8} \u{8}");
		assert_eq!(buffer.as_str(), "a");
	}

	#[test]
	fn control_characters_are_ignored() {
		let mut buffer = LineBuffer::default();
		assert_eq!(buffer.apply("g\re\tt\u{1b}"), "get");
		assert_eq!(buffer.take(), "get");
		assert!(buffer.is_empty());
	}

	#[test]
	fn history_evicts_oldest() {
		let mut history = History::new(3);
		for line in ["a", "b", "c", "d"] {
			history.push(line);
		}
		assert_eq!(history.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
		assert_eq!(history.render(), "    1  b\r\n    2  c\r\n    3  d\r\n");
	}

	#[test]
	fn default_history_keeps_last_hundred() {
		let mut history = History::new(DEFAULT_HISTORY_LIMIT);
		for i in 0..150 {
			history.push(format!("get pod p{i}"));
		}
		assert_eq!(history.len(), 100);
		assert_eq!(history.iter().next(), Some("get pod p50"));
	}

	#[derive(Debug, Clone)]
	enum Key {
		Char(char),
		Backspace,
	}

	fn key() -> impl Strategy<Value = Key> {
		prop_oneof![
			4 => proptest::char::range('!', '~').prop_map(Key::Char),
			1 => Just(Key::Backspace),
		]
	}

	proptest! {
		#[test]
		fn buffer_tracks_a_simple_model(keys in prop::collection::vec(key(), 0..64)) {
			let mut buffer = LineBuffer::default();
			let mut model: Vec<char> = Vec::new();
			for key in &keys {
				match key {
					Key::Char(c) => {
						prop_assert_eq!(buffer.apply(&c.to_string()), c.to_string());
						model.push(*c);
					}
					Key::Backspace => {
						let echo = buffer.apply("\u{7f}");
						let popped = model.pop().is_some();
						prop_assert_eq!(echo.is_empty(), !popped);
					}
				}
			}
			prop_assert_eq!(buffer.as_str(), model.iter().collect::<String>());
			let _ = buffer.take();
			prop_assert!(buffer.is_empty());
		}
	}
}
