// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{TerminalError, TerminalResult};

/// Decides whether a user may open a terminal on a cluster and namespace.
/// Consulted before the connection is upgraded.
#[async_trait]
pub trait PermissionGate: Send + Sync {
	async fn authorize(&self, user: &str, cluster_id: &str, namespace: &str) -> TerminalResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl PermissionGate for AllowAll {
	async fn authorize(&self, _user: &str, _cluster_id: &str, _namespace: &str) -> TerminalResult<()> {
		Ok(())
	}
}

/// Allows only the listed clusters. An empty list allows every cluster.
#[derive(Debug, Default, Clone)]
pub struct ClusterAllowList {
	clusters: HashSet<String>,
}

impl ClusterAllowList {
	pub fn new(clusters: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			clusters: clusters.into_iter().map(Into::into).collect(),
		}
	}
}

#[async_trait]
impl PermissionGate for ClusterAllowList {
	async fn authorize(&self, _user: &str, cluster_id: &str, namespace: &str) -> TerminalResult<()> {
		if self.clusters.is_empty() || self.clusters.contains(cluster_id) {
			Ok(())
		} else {
			Err(TerminalError::PermissionDenied {
				cluster_id: cluster_id.to_string(),
				namespace: namespace.to_string(),
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn empty_allow_list_allows_everything() {
		let gate = ClusterAllowList::new(Vec::<String>::new());
		assert!(gate.authorize("alice", "prod", "default").await.is_ok());
	}

	#[tokio::test]
	async fn allow_list_denies_unlisted_clusters() {
		let gate = ClusterAllowList::new(["staging"]);
		assert!(gate.authorize("alice", "staging", "default").await.is_ok());

		let err = gate.authorize("alice", "prod", "default").await.unwrap_err();
		assert!(matches!(err, TerminalError::PermissionDenied { .. }));
		assert!(err.user_message().starts_with("[forbidden]"));
	}
}
