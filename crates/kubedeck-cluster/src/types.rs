// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster identity and credential material.

use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// Credential material used to authenticate against one cluster.
#[derive(Clone, PartialEq, Eq)]
pub enum ClusterCredentials {
	/// A complete kubeconfig document (YAML or JSON).
	Kubeconfig(String),
	/// A bearer token plus the API server's CA certificate (PEM or base64 PEM).
	Token { token: String, ca_cert: String },
}

impl fmt::Debug for ClusterCredentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ClusterCredentials::Kubeconfig(_) => f.debug_tuple("Kubeconfig").field(&REDACTED).finish(),
			ClusterCredentials::Token { ca_cert, .. } => f
				.debug_struct("Token")
				.field("token", &REDACTED)
				.field("ca_cert_len", &ca_cert.len())
				.finish(),
		}
	}
}

/// One registered cluster as stored by the cluster registry.
///
/// Immutable for the lifetime of any informer bundle built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
	pub id: String,
	pub name: String,
	pub api_server: String,
	pub credentials: ClusterCredentials,
}

impl ClusterHandle {
	pub fn with_kubeconfig(
		id: impl Into<String>,
		name: impl Into<String>,
		api_server: impl Into<String>,
		kubeconfig: impl Into<String>,
	) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			api_server: api_server.into(),
			credentials: ClusterCredentials::Kubeconfig(kubeconfig.into()),
		}
	}

	pub fn with_token(
		id: impl Into<String>,
		name: impl Into<String>,
		api_server: impl Into<String>,
		token: impl Into<String>,
		ca_cert: impl Into<String>,
	) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			api_server: api_server.into(),
			credentials: ClusterCredentials::Token {
				token: token.into(),
				ca_cert: ca_cert.into(),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn debug_output_never_contains_secrets() {
		let handle = ClusterHandle::with_token(
			"prod",
			"Production",
			"https://10.0.0.1:6443",
			"super-secret-token",
			"-----BEGIN CERTIFICATE-----",
		);
		let rendered = format!("{handle:?}");
		assert!(!rendered.contains("super-secret-token"));
		assert!(rendered.contains(REDACTED));

		let handle = ClusterHandle::with_kubeconfig("dev", "Dev", "https://dev", "apiVersion: v1\ntoken: abc");
		assert!(!format!("{handle:?}").contains("token: abc"));
	}
}
