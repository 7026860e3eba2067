// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster registry: where cluster identity and credentials come from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ClusterError, ClusterResult};
use crate::types::{ClusterCredentials, ClusterHandle};

/// Source of registered clusters.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
	/// Look up a single cluster. Fails with [`ClusterError::NotFound`].
	async fn get_cluster(&self, cluster_id: &str) -> ClusterResult<ClusterHandle>;

	/// All registered clusters, ordered by id.
	async fn list_clusters(&self) -> ClusterResult<Vec<ClusterHandle>>;
}

/// Registry held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryClusterRegistry {
	clusters: RwLock<BTreeMap<String, ClusterHandle>>,
}

impl InMemoryClusterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_clusters(clusters: impl IntoIterator<Item = ClusterHandle>) -> Self {
		let registry = Self::new();
		for cluster in clusters {
			registry.insert(cluster);
		}
		registry
	}

	pub fn insert(&self, cluster: ClusterHandle) {
		if let Ok(mut clusters) = self.clusters.write() {
			clusters.insert(cluster.id.clone(), cluster);
		}
	}

	pub fn remove(&self, cluster_id: &str) -> Option<ClusterHandle> {
		self.clusters.write().ok()?.remove(cluster_id)
	}

	fn snapshot(&self) -> ClusterResult<BTreeMap<String, ClusterHandle>> {
		self
			.clusters
			.read()
			.map(|clusters| clusters.clone())
			.map_err(|_| ClusterError::Registry {
				message: "registry lock poisoned".to_string(),
			})
	}
}

#[async_trait]
impl ClusterRegistry for InMemoryClusterRegistry {
	async fn get_cluster(&self, cluster_id: &str) -> ClusterResult<ClusterHandle> {
		self
			.snapshot()?
			.remove(cluster_id)
			.ok_or_else(|| ClusterError::NotFound {
				cluster_id: cluster_id.to_string(),
			})
	}

	async fn list_clusters(&self) -> ClusterResult<Vec<ClusterHandle>> {
		Ok(self.snapshot()?.into_values().collect())
	}
}

/// clusters.toml format
#[derive(Deserialize)]
struct ClustersFile {
	#[serde(default)]
	clusters: Vec<ClusterEntry>,
}

#[derive(Deserialize)]
struct ClusterEntry {
	id: String,
	name: Option<String>,
	api_server: String,
	kubeconfig: Option<String>,
	token: Option<String>,
	ca_cert: Option<String>,
}

impl ClusterEntry {
	fn into_handle(self) -> ClusterResult<ClusterHandle> {
		let credentials = match (self.kubeconfig, self.token, self.ca_cert) {
			(Some(kubeconfig), _, _) => ClusterCredentials::Kubeconfig(kubeconfig),
			(None, Some(token), Some(ca_cert)) => ClusterCredentials::Token { token, ca_cert },
			_ => {
				return Err(ClusterError::Registry {
					message: format!(
						"cluster '{}' needs either `kubeconfig` or both `token` and `ca_cert`",
						self.id
					),
				})
			}
		};

		Ok(ClusterHandle {
			name: self.name.unwrap_or_else(|| self.id.clone()),
			id: self.id,
			api_server: self.api_server,
			credentials,
		})
	}
}

/// Registry loaded once from a TOML file of `[[clusters]]` tables.
#[derive(Debug)]
pub struct FileClusterRegistry {
	path: PathBuf,
	inner: InMemoryClusterRegistry,
}

impl FileClusterRegistry {
	/// Load the registry. A missing file yields an empty registry.
	pub fn load(path: impl AsRef<Path>) -> ClusterResult<Self> {
		let path = path.as_ref().to_path_buf();
		let inner = InMemoryClusterRegistry::new();

		if !path.exists() {
			debug!(path = %path.display(), "cluster registry file not found, starting empty");
			return Ok(Self { path, inner });
		}

		let content = std::fs::read_to_string(&path).map_err(|e| ClusterError::Registry {
			message: format!("failed to read {}: {e}", path.display()),
		})?;
		let file: ClustersFile = toml::from_str(&content).map_err(|e| ClusterError::Registry {
			message: format!("failed to parse {}: {e}", path.display()),
		})?;

		for entry in file.clusters {
			inner.insert(entry.into_handle()?);
		}

		info!(path = %path.display(), "cluster registry loaded");
		Ok(Self { path, inner })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl ClusterRegistry for FileClusterRegistry {
	async fn get_cluster(&self, cluster_id: &str) -> ClusterResult<ClusterHandle> {
		self.inner.get_cluster(cluster_id).await
	}

	async fn list_clusters(&self) -> ClusterResult<Vec<ClusterHandle>> {
		self.inner.list_clusters().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[tokio::test]
	async fn in_memory_lookup_and_not_found() {
		let registry = InMemoryClusterRegistry::from_clusters([ClusterHandle::with_kubeconfig(
			"dev",
			"Dev",
			"https://dev:6443",
			"apiVersion: v1",
		)]);

		assert_eq!(registry.get_cluster("dev").await.unwrap().name, "Dev");
		assert!(matches!(
			registry.get_cluster("nope").await,
			Err(ClusterError::NotFound { cluster_id }) if cluster_id == "nope"
		));

		registry.remove("dev");
		assert!(registry.list_clusters().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn file_registry_parses_both_credential_forms() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[[clusters]]
id = "prod"
name = "Production"
api_server = "https://prod:6443"
token = "abc"
ca_cert = "LS0tLS1CRUdJTg=="

[[clusters]]
id = "staging"
api_server = "https://staging:6443"
kubeconfig = "apiVersion: v1"
"#
		)
		.unwrap();

		let registry = FileClusterRegistry::load(file.path()).unwrap();
		let clusters = registry.list_clusters().await.unwrap();
		assert_eq!(clusters.len(), 2);

		let prod = registry.get_cluster("prod").await.unwrap();
		assert!(matches!(prod.credentials, ClusterCredentials::Token { .. }));

		let staging = registry.get_cluster("staging").await.unwrap();
		assert_eq!(staging.name, "staging");
		assert!(matches!(staging.credentials, ClusterCredentials::Kubeconfig(_)));
	}

	#[test]
	fn file_registry_rejects_incomplete_credentials() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[[clusters]]
id = "broken"
api_server = "https://broken:6443"
token = "abc"
"#
		)
		.unwrap();

		let err = FileClusterRegistry::load(file.path()).unwrap_err();
		assert!(err.to_string().contains("broken"));
	}

	#[test]
	fn missing_file_is_empty_registry() {
		let dir = tempfile::TempDir::new().unwrap();
		let registry = FileClusterRegistry::load(dir.path().join("clusters.toml")).unwrap();
		assert!(registry.inner.snapshot().unwrap().is_empty());
	}
}
