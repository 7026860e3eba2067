// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Terminal wire protocol.
//!
//! Every frame in either direction is a JSON object `{"type": ..., "data": ...}`.
//! Inbound frames are parsed into the closed [`ClientMessage`] set; anything
//! else is reported as [`TerminalError::UnrecognizedMessage`] instead of being
//! dropped.

use serde::{Deserialize, Serialize};

use crate::error::{TerminalError, TerminalResult};

/// Message kinds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
	// client -> server
	Input,
	Command,
	Interrupt,
	ChangeNamespace,
	QuickCommand,
	// server -> client
	Output,
	Error,
	NamespaceChanged,
	CommandResult,
	Clear,
}

/// Wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalMessage {
	#[serde(rename = "type")]
	pub kind: MessageKind,
	#[serde(default)]
	pub data: String,
}

impl TerminalMessage {
	pub fn new(kind: MessageKind, data: impl Into<String>) -> Self {
		Self {
			kind,
			data: data.into(),
		}
	}

	pub fn output(data: impl Into<String>) -> Self {
		Self::new(MessageKind::Output, data)
	}

	pub fn error(data: impl Into<String>) -> Self {
		Self::new(MessageKind::Error, data)
	}

	pub fn namespace_changed(namespace: impl Into<String>) -> Self {
		Self::new(MessageKind::NamespaceChanged, namespace)
	}

	/// Signals the client that the session is idle and may show a prompt.
	pub fn command_result() -> Self {
		Self::new(MessageKind::CommandResult, "")
	}

	pub fn clear() -> Self {
		Self::new(MessageKind::Clear, "")
	}

	pub fn to_json(&self) -> String {
		// A struct of a unit enum and a String cannot fail to serialize.
		serde_json::to_string(self).unwrap_or_default()
	}
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
	/// Raw keystrokes (one or more characters) for the line buffer.
	Input(String),
	/// Submit the line buffer.
	Command,
	/// Ctrl+C.
	Interrupt,
	ChangeNamespace(String),
	/// Run a line directly, bypassing the line buffer.
	QuickCommand(String),
}

#[derive(Deserialize)]
struct RawMessage {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	data: Option<String>,
}

impl ClientMessage {
	pub fn parse(text: &str) -> TerminalResult<Self> {
		let raw: RawMessage = serde_json::from_str(text).map_err(|e| TerminalError::InvalidMessage {
			message: e.to_string(),
		})?;
		let data = raw.data.unwrap_or_default();

		match raw.kind.as_str() {
			"input" => Ok(ClientMessage::Input(data)),
			"command" => Ok(ClientMessage::Command),
			"interrupt" => Ok(ClientMessage::Interrupt),
			"change_namespace" => Ok(ClientMessage::ChangeNamespace(data)),
			"quick_command" => Ok(ClientMessage::QuickCommand(data)),
			_ => Err(TerminalError::UnrecognizedMessage { kind: raw.kind }),
		}
	}
}

/// Converts bare `\n` to `\r\n` for terminal emulators.
pub fn to_crlf(text: &str) -> String {
	let mut out = String::with_capacity(text.len() + text.len() / 16);
	let mut prev = '\0';
	for c in text.chars() {
		if c == '\n' && prev != '\r' {
			out.push('\r');
		}
		out.push(c);
		prev = c;
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_every_client_kind() {
		assert_eq!(
			ClientMessage::parse(r#"{"type":"input","data":"ge"}"#).unwrap(),
			ClientMessage::Input("ge".to_string())
		);
		assert_eq!(
			ClientMessage::parse(r#"{"type":"command"}"#).unwrap(),
			ClientMessage::Command
		);
		assert_eq!(
			ClientMessage::parse(r#"{"type":"command","data":""}"#).unwrap(),
			ClientMessage::Command
		);
		assert_eq!(
			ClientMessage::parse(r#"{"type":"interrupt","data":null}"#).unwrap(),
			ClientMessage::Interrupt
		);
		assert_eq!(
			ClientMessage::parse(r#"{"type":"change_namespace","data":"kube-system"}"#).unwrap(),
			ClientMessage::ChangeNamespace("kube-system".to_string())
		);
		assert_eq!(
			ClientMessage::parse(r#"{"type":"quick_command","data":"get nodes"}"#).unwrap(),
			ClientMessage::QuickCommand("get nodes".to_string())
		);
	}

	#[test]
	fn unknown_type_is_reported_not_dropped() {
		let err = ClientMessage::parse(r#"{"type":"resize","data":"80x24"}"#).unwrap_err();
		assert!(matches!(err, TerminalError::UnrecognizedMessage { ref kind } if kind == "resize"));
	}

	#[test]
	fn malformed_json_is_invalid() {
		let err = ClientMessage::parse("not json").unwrap_err();
		assert!(matches!(err, TerminalError::InvalidMessage { .. }));
	}

	#[test]
	fn server_messages_use_type_and_data() {
		let json = TerminalMessage::namespace_changed("prod").to_json();
		let value: serde_json::Value = serde_json::from_str(&json).unwrap();
		assert_eq!(value["type"], "namespace_changed");
		assert_eq!(value["data"], "prod");

		let value: serde_json::Value =
			serde_json::from_str(&TerminalMessage::command_result().to_json()).unwrap();
		assert_eq!(value["type"], "command_result");
	}

	#[test]
	fn crlf_conversion_leaves_existing_pairs() {
		assert_eq!(to_crlf("a\nb\r\nc"), "a\r\nb\r\nc");
		assert_eq!(to_crlf(""), "");
	}
}
