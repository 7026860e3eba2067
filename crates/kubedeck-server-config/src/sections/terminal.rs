// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Terminal broker configuration section.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_KUBECTL_PATH: &str = "kubectl";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
const DEFAULT_INTERRUPT_GRACE_MS: u64 = 2000;
const DEFAULT_HISTORY_LIMIT: usize = 100;
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_AUDIT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TerminalConfigLayer {
	pub kubectl_path: Option<PathBuf>,
	pub command_timeout_secs: Option<u64>,
	pub interrupt_grace_ms: Option<u64>,
	pub history_limit: Option<usize>,
	pub default_namespace: Option<String>,
	pub credential_dir: Option<PathBuf>,
	pub audit_output_limit_bytes: Option<usize>,
	pub verify_connection: Option<bool>,
	pub connect_timeout_secs: Option<u64>,
}

impl TerminalConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.kubectl_path.is_some() {
			self.kubectl_path = other.kubectl_path;
		}
		if other.command_timeout_secs.is_some() {
			self.command_timeout_secs = other.command_timeout_secs;
		}
		if other.interrupt_grace_ms.is_some() {
			self.interrupt_grace_ms = other.interrupt_grace_ms;
		}
		if other.history_limit.is_some() {
			self.history_limit = other.history_limit;
		}
		if other.default_namespace.is_some() {
			self.default_namespace = other.default_namespace;
		}
		if other.credential_dir.is_some() {
			self.credential_dir = other.credential_dir;
		}
		if other.audit_output_limit_bytes.is_some() {
			self.audit_output_limit_bytes = other.audit_output_limit_bytes;
		}
		if other.verify_connection.is_some() {
			self.verify_connection = other.verify_connection;
		}
		if other.connect_timeout_secs.is_some() {
			self.connect_timeout_secs = other.connect_timeout_secs;
		}
	}

	pub fn finalize(self) -> TerminalConfig {
		TerminalConfig {
			kubectl_path: self
				.kubectl_path
				.unwrap_or_else(|| PathBuf::from(DEFAULT_KUBECTL_PATH)),
			command_timeout_secs: self
				.command_timeout_secs
				.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
			interrupt_grace_ms: self.interrupt_grace_ms.unwrap_or(DEFAULT_INTERRUPT_GRACE_MS),
			history_limit: self.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
			default_namespace: self
				.default_namespace
				.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
			credential_dir: self.credential_dir,
			audit_output_limit_bytes: self
				.audit_output_limit_bytes
				.unwrap_or(DEFAULT_AUDIT_OUTPUT_LIMIT_BYTES),
			verify_connection: self.verify_connection.unwrap_or(true),
			connect_timeout_secs: self
				.connect_timeout_secs
				.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalConfig {
	pub kubectl_path: PathBuf,
	pub command_timeout_secs: u64,
	pub interrupt_grace_ms: u64,
	pub history_limit: usize,
	pub default_namespace: String,
	/// `None` means the system temp directory.
	pub credential_dir: Option<PathBuf>,
	pub audit_output_limit_bytes: usize,
	pub verify_connection: bool,
	/// Bound on the connection check made when `verify_connection` is set.
	pub connect_timeout_secs: u64,
}

impl TerminalConfig {
	pub fn command_timeout(&self) -> Duration {
		Duration::from_secs(self.command_timeout_secs)
	}

	pub fn interrupt_grace(&self) -> Duration {
		Duration::from_millis(self.interrupt_grace_ms)
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.connect_timeout_secs)
	}
}

impl Default for TerminalConfig {
	fn default() -> Self {
		TerminalConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = TerminalConfig::default();
		assert_eq!(config.kubectl_path, PathBuf::from("kubectl"));
		assert_eq!(config.command_timeout(), Duration::from_secs(60));
		assert_eq!(config.interrupt_grace(), Duration::from_secs(2));
		assert_eq!(config.history_limit, 100);
		assert_eq!(config.default_namespace, "default");
		assert!(config.credential_dir.is_none());
		assert!(config.verify_connection);
		assert_eq!(config.connect_timeout(), Duration::from_secs(10));
	}

	#[test]
	fn test_merge_keeps_unset_fields() {
		let mut base = TerminalConfigLayer {
			kubectl_path: Some(PathBuf::from("/usr/local/bin/kubectl")),
			history_limit: Some(50),
			..Default::default()
		};
		base.merge(TerminalConfigLayer {
			history_limit: Some(20),
			..Default::default()
		});
		assert_eq!(base.kubectl_path, Some(PathBuf::from("/usr/local/bin/kubectl")));
		assert_eq!(base.history_limit, Some(20));
	}
}
