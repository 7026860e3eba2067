// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while resolving or connecting to a cluster.
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
	#[error("Cluster not found: {cluster_id}")]
	NotFound { cluster_id: String },

	#[error("Failed to connect to cluster {cluster_id}: {message}")]
	Connection { cluster_id: String, message: String },

	#[error("Informer sync for cluster {cluster_id} did not complete within {timeout_secs}s")]
	SyncTimeout {
		cluster_id: String,
		timeout_secs: u64,
	},

	#[error("Cluster {cluster_id} was removed while its informers were starting")]
	Removed { cluster_id: String },

	#[error("Cluster registry error: {message}")]
	Registry { message: String },
}

impl ClusterError {
	pub fn connection(cluster_id: impl Into<String>, message: impl ToString) -> Self {
		ClusterError::Connection {
			cluster_id: cluster_id.into(),
			message: message.to_string(),
		}
	}

	/// Whether a later attempt against the same cluster may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ClusterError::Connection { .. } | ClusterError::SyncTimeout { .. } | ClusterError::Removed { .. }
		)
	}
}
