// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Drives one command from spawn to exit and turns its output into messages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kubedeck_audit::CommandOutcome;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TerminalError;
use crate::process::{ManagedProcess, ProcessExit};
use crate::protocol::{to_crlf, MessageKind, TerminalMessage};

/// Size of one pipe read. Output is forwarded per read, so a prompt without
/// a trailing newline reaches the client as soon as it is written.
const READ_CHUNK: usize = 8 * 1024;

/// Upper bound on draining pipes after exit. A grandchild that inherited
/// the pipes can keep them open after the process itself is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ExecutionReport {
	pub outcome: CommandOutcome,
	pub exit_code: Option<i32>,
	/// Combined output, truncated for the audit trail.
	pub output: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
	/// Deadline for buffered commands. Streaming commands have none.
	pub timeout: Duration,
	pub audit_output_limit: usize,
}

struct Collector {
	combined: String,
	keep_combined: bool,
	audit: String,
	audit_limit: usize,
}

impl Collector {
	fn push(&mut self, chunk: &str) {
		if self.keep_combined {
			self.combined.push_str(chunk);
		}
		let room = self.audit_limit.saturating_sub(self.audit.len());
		if room > 0 {
			self.audit.push_str(truncate_at_char_boundary(chunk, room));
		}
	}
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
	if s.len() <= max {
		return s;
	}
	let mut end = max;
	while !s.is_char_boundary(end) {
		end -= 1;
	}
	&s[..end]
}

/// Decodes a byte stream whose reads may end inside a UTF-8 sequence.
/// Incomplete trailing bytes wait for the next read; invalid ones become
/// U+FFFD.
#[derive(Default)]
struct Utf8Carry {
	pending: Vec<u8>,
}

impl Utf8Carry {
	fn decode(&mut self, bytes: &[u8]) -> String {
		self.pending.extend_from_slice(bytes);
		let mut text = String::new();
		loop {
			let (valid, invalid) = match std::str::from_utf8(&self.pending) {
				Ok(_) => (self.pending.len(), None),
				Err(e) => (e.valid_up_to(), Some(e.error_len())),
			};
			text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
			match invalid {
				None => {
					self.pending.clear();
					return text;
				}
				Some(None) => {
					self.pending.drain(..valid);
					return text;
				}
				Some(Some(len)) => {
					text.push(char::REPLACEMENT_CHARACTER);
					self.pending.drain(..valid + len);
				}
			}
		}
	}

	/// Whatever is left once the stream ends.
	fn finish(&mut self) -> String {
		let rest = String::from_utf8_lossy(&self.pending).into_owned();
		self.pending.clear();
		rest
	}
}

/// `to_crlf` for a read that follows one ending in CR, which already pairs
/// with a leading LF.
fn crlf_continuing(text: &str, after_cr: bool) -> String {
	match text.strip_prefix('\n') {
		Some(rest) if after_cr => format!("\n{}", to_crlf(rest)),
		_ => to_crlf(text),
	}
}

fn spawn_drain<R>(
	mut reader: R,
	kind: MessageKind,
	forward: Option<mpsc::Sender<TerminalMessage>>,
	collector: Arc<Mutex<Collector>>,
) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut buf = vec![0u8; READ_CHUNK];
		let mut carry = Utf8Carry::default();
		let mut ended_with_cr = false;
		loop {
			let (text, done) = match reader.read(&mut buf).await {
				Ok(0) => (carry.finish(), true),
				Ok(n) => (carry.decode(&buf[..n]), false),
				Err(e) => {
					warn!(error = %e, "reading command output failed");
					(carry.finish(), true)
				}
			};
			if !text.is_empty() {
				collector
					.lock()
					.unwrap_or_else(|poisoned| poisoned.into_inner())
					.push(&text);
				if let Some(tx) = &forward {
					let data = crlf_continuing(&text, ended_with_cr);
					ended_with_cr = text.ends_with('\r');
					if tx.send(TerminalMessage::new(kind, data)).await.is_err() {
						debug!("output receiver gone, draining without forwarding");
					}
				}
			}
			if done {
				break;
			}
		}
	})
}

/// Run `process` to completion.
///
/// Streaming commands forward stdout as `output` and stderr as `error`, one
/// message per pipe read, with no deadline. Buffered commands collect both
/// streams and send them once on exit: `output` for status 0, `error`
/// otherwise. A buffered command past its deadline yields only the timeout
/// error.
pub async fn execute(
	mut process: ManagedProcess,
	streaming: bool,
	limits: ExecutionLimits,
	out: &mpsc::Sender<TerminalMessage>,
) -> ExecutionReport {
	let control = process.control();
	let collector = Arc::new(Mutex::new(Collector {
		combined: String::new(),
		keep_combined: !streaming,
		audit: String::new(),
		audit_limit: limits.audit_output_limit,
	}));

	let pipes = process.take_stdout().and_then(|stdout| Ok((stdout, process.take_stderr()?)));
	let (stdout, stderr) = match pipes {
		Ok(pipes) => pipes,
		Err(e) => {
			control.kill();
			process.wait(None).await;
			let _ = out.send(TerminalMessage::error(e.user_message())).await;
			return ExecutionReport {
				outcome: CommandOutcome::Failed,
				exit_code: None,
				output: String::new(),
			};
		}
	};

	let forward = streaming.then(|| out.clone());
	let mut readers = vec![
		spawn_drain(stdout, MessageKind::Output, forward.clone(), collector.clone()),
		spawn_drain(stderr, MessageKind::Error, forward, collector.clone()),
	];

	let deadline = (!streaming).then_some(limits.timeout);
	let exit = process.wait(deadline).await;

	for reader in &mut readers {
		if tokio::time::timeout(DRAIN_TIMEOUT, &mut *reader).await.is_err() {
			reader.abort();
		}
	}

	let (combined, audit) = {
		let mut collector = collector.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		(
			std::mem::take(&mut collector.combined),
			std::mem::take(&mut collector.audit),
		)
	};

	let interrupted = control.was_interrupted();
	let (outcome, exit_code) = match exit {
		ProcessExit::Exited(Some(0)) if !interrupted => (CommandOutcome::Succeeded, Some(0)),
		ProcessExit::Exited(code) if interrupted => (CommandOutcome::Interrupted, code),
		ProcessExit::Exited(code) => (CommandOutcome::Failed, code),
		ProcessExit::TimedOut => (CommandOutcome::TimedOut, None),
		ProcessExit::Killed => (CommandOutcome::Interrupted, None),
	};

	if !streaming {
		let message = match outcome {
			CommandOutcome::Succeeded if !combined.is_empty() => {
				Some(TerminalMessage::output(to_crlf(&combined)))
			}
			CommandOutcome::Failed if !combined.is_empty() => Some(TerminalMessage::error(to_crlf(&combined))),
			CommandOutcome::Failed => Some(TerminalMessage::error(format!(
				"[exit] command exited with status {}\r\n",
				exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string())
			))),
			CommandOutcome::TimedOut => Some(TerminalMessage::error(
				TerminalError::CommandTimeout {
					timeout: limits.timeout,
				}
				.user_message(),
			)),
			_ => None,
		};
		if let Some(message) = message {
			let _ = out.send(message).await;
		}
	}

	ExecutionReport {
		outcome,
		exit_code,
		output: audit,
	}
}
