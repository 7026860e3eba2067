// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use kubedeck_cluster::ClusterError;
use thiserror::Error;

/// Result type alias for terminal operations.
pub type TerminalResult<T> = Result<T, TerminalError>;

/// Errors raised below the session boundary, already translated into the
/// kinds a user can be told about.
#[derive(Error, Debug)]
pub enum TerminalError {
	#[error("cluster connection failed: {message}")]
	Connection { message: String },

	#[error("failed to start command: {message}")]
	ProcessSpawn { message: String },

	#[error("failed to attach to command output: {message}")]
	Pipe { message: String },

	#[error("command exceeded {timeout:?} and was terminated")]
	CommandTimeout { timeout: Duration },

	#[error("session teardown failed: {message}")]
	SessionTeardown { message: String },

	#[error("unrecognized message type '{kind}'")]
	UnrecognizedMessage { kind: String },

	#[error("invalid message: {message}")]
	InvalidMessage { message: String },

	#[error("invalid namespace '{namespace}'")]
	InvalidNamespace { namespace: String },

	#[error("a command is already running; interrupt it first")]
	Busy,

	#[error("access to cluster {cluster_id} namespace {namespace} denied")]
	PermissionDenied { cluster_id: String, namespace: String },

	#[error("terminal transport closed")]
	Transport,
}

impl TerminalError {
	fn tag(&self) -> &'static str {
		match self {
			TerminalError::Connection { .. } => "connection",
			TerminalError::ProcessSpawn { .. } => "spawn",
			TerminalError::Pipe { .. } => "pipe",
			TerminalError::CommandTimeout { .. } => "timeout",
			TerminalError::SessionTeardown { .. } => "teardown",
			TerminalError::UnrecognizedMessage { .. } | TerminalError::InvalidMessage { .. } => "protocol",
			TerminalError::InvalidNamespace { .. } => "input",
			TerminalError::Busy => "busy",
			TerminalError::PermissionDenied { .. } => "forbidden",
			TerminalError::Transport => "transport",
		}
	}

	/// Text sent to the client in an `error` message.
	pub fn user_message(&self) -> String {
		format!("[{}] {}\r\n", self.tag(), self)
	}

	/// Whether the connection itself is unusable and the session must end.
	pub fn is_fatal(&self) -> bool {
		matches!(self, TerminalError::Transport)
	}
}

impl From<ClusterError> for TerminalError {
	fn from(err: ClusterError) -> Self {
		TerminalError::Connection {
			message: err.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timeout_is_distinct_from_generic_failure() {
		let timeout = TerminalError::CommandTimeout {
			timeout: Duration::from_secs(60),
		};
		assert_eq!(
			timeout.user_message(),
			"[timeout] command exceeded 60s and was terminated\r\n"
		);

		let spawn = TerminalError::ProcessSpawn {
			message: "No such file or directory".to_string(),
		};
		assert!(spawn.user_message().starts_with("[spawn]"));
	}

	#[test]
	fn only_transport_errors_are_fatal() {
		assert!(TerminalError::Transport.is_fatal());
		assert!(!TerminalError::Busy.is_fatal());
		assert!(!TerminalError::Pipe {
			message: "closed".to_string()
		}
		.is_fatal());
	}

	#[test]
	fn cluster_errors_become_connection_errors() {
		let err: TerminalError = ClusterError::NotFound {
			cluster_id: "prod".to_string(),
		}
		.into();
		assert!(err.user_message().starts_with("[connection]"));
		assert!(err.to_string().contains("prod"));
	}
}
