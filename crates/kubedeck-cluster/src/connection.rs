// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Connection factory: turns stored credential material into kubeconfig
//! documents and authenticated API clients.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::types::{ClusterCredentials, ClusterHandle};

const PEM_MARKER: &str = "-----BEGIN";

/// Builds authenticated clients from [`ClusterHandle`] credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionFactory;

impl ConnectionFactory {
	pub fn new() -> Self {
		Self
	}

	/// Kubeconfig document for the cluster.
	///
	/// Stored kubeconfigs are returned as-is. Token credentials are synthesized
	/// into a single-context kubeconfig named after the cluster id. The output
	/// is JSON, which every kubeconfig consumer accepts as YAML.
	pub fn kubeconfig_for(&self, cluster: &ClusterHandle) -> String {
		match &cluster.credentials {
			ClusterCredentials::Kubeconfig(kubeconfig) => kubeconfig.clone(),
			ClusterCredentials::Token { token, ca_cert } => {
				let document = json!({
					"apiVersion": "v1",
					"kind": "Config",
					"clusters": [{
						"name": cluster.id,
						"cluster": {
							"server": cluster.api_server,
							"certificate-authority-data": ca_data(ca_cert),
						}
					}],
					"users": [{
						"name": cluster.id,
						"user": { "token": token }
					}],
					"contexts": [{
						"name": cluster.id,
						"context": { "cluster": cluster.id, "user": cluster.id }
					}],
					"current-context": cluster.id,
				});
				document.to_string()
			}
		}
	}

	/// Authenticated client for the cluster. No request is made here.
	pub async fn client_for(&self, cluster: &ClusterHandle) -> ClusterResult<Client> {
		let kubeconfig = Kubeconfig::from_yaml(&self.kubeconfig_for(cluster))
			.map_err(|e| ClusterError::connection(&cluster.id, format!("invalid kubeconfig: {e}")))?;

		let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
			.await
			.map_err(|e| ClusterError::connection(&cluster.id, e))?;

		debug!(cluster_id = %cluster.id, cluster_url = %config.cluster_url, "building cluster client");
		Client::try_from(config).map_err(|e| ClusterError::connection(&cluster.id, e))
	}

	/// Client plus a round trip to the API server, so bad credentials and
	/// unreachable endpoints surface as [`ClusterError::Connection`].
	pub async fn connect(&self, cluster: &ClusterHandle) -> ClusterResult<Client> {
		let client = self.client_for(cluster).await?;
		let version = client
			.apiserver_version()
			.await
			.map_err(|e| ClusterError::connection(&cluster.id, e))?;
		debug!(cluster_id = %cluster.id, git_version = %version.git_version, "cluster reachable");
		Ok(client)
	}
}

/// `certificate-authority-data` wants base64 PEM; accept either form.
fn ca_data(ca_cert: &str) -> String {
	let trimmed = ca_cert.trim();
	if trimmed.starts_with(PEM_MARKER) {
		BASE64.encode(trimmed.as_bytes())
	} else {
		trimmed.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----";

	#[test]
	fn stored_kubeconfig_is_returned_verbatim() {
		let cluster = ClusterHandle::with_kubeconfig("dev", "Dev", "https://dev", "apiVersion: v1\n");
		assert_eq!(ConnectionFactory::new().kubeconfig_for(&cluster), "apiVersion: v1\n");
	}

	#[test]
	fn token_credentials_synthesize_parseable_kubeconfig() {
		let cluster = ClusterHandle::with_token("prod", "Production", "https://10.0.0.1:6443", "tok", PEM);
		let text = ConnectionFactory::new().kubeconfig_for(&cluster);

		let kubeconfig = Kubeconfig::from_yaml(&text).expect("synthesized kubeconfig parses");
		assert_eq!(kubeconfig.current_context.as_deref(), Some("prod"));
		assert_eq!(kubeconfig.clusters.len(), 1);
		let named = &kubeconfig.clusters[0];
		let cluster_entry = named.cluster.as_ref().expect("cluster entry");
		assert_eq!(cluster_entry.server.as_deref(), Some("https://10.0.0.1:6443"));
		assert_eq!(
			cluster_entry.certificate_authority_data.as_deref(),
			Some(BASE64.encode(PEM).as_str())
		);
	}

	#[test]
	fn base64_ca_is_not_double_encoded() {
		let encoded = BASE64.encode(PEM);
		assert_eq!(ca_data(&encoded), encoded);
		assert_eq!(ca_data(PEM), encoded);
	}

	#[tokio::test]
	async fn malformed_kubeconfig_is_a_connection_error() {
		let cluster = ClusterHandle::with_kubeconfig("bad", "Bad", "https://bad", "{ not: [valid");
		let err = ConnectionFactory::new().client_for(&cluster).await.err().unwrap();
		assert!(matches!(err, ClusterError::Connection { ref cluster_id, .. } if cluster_id == "bad"));
	}
}
