// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state shared by every handler.

use std::sync::Arc;

use anyhow::Context;
use kubedeck_audit::{
	AuditRecorder, AuditService, AuditSink, FileAuditSink, NoopAuditRecorder, TracingAuditSink,
};
use kubedeck_cluster::{ClusterRegistry, FileClusterRegistry, InformerManager, KubeInformerFactory};
use kubedeck_server_config::{AuditConfig, ServerConfig};
use kubedeck_terminal::{ClusterAllowList, SessionRegistry, TerminalBroker};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
	pub informers: Arc<InformerManager>,
	pub broker: TerminalBroker,
}

impl AppState {
	pub fn new(informers: Arc<InformerManager>, broker: TerminalBroker) -> Self {
		Self { informers, broker }
	}

	/// Stop every terminal session, then every informer bundle.
	pub async fn shutdown(&self) {
		self.broker.shutdown().await;
		self.informers.shutdown().await;
	}
}

/// Wire the cluster registry, informer cache, audit pipeline and terminal
/// broker from configuration. Must run inside the tokio runtime.
pub fn create_app_state(config: &ServerConfig) -> anyhow::Result<AppState> {
	let registry: Arc<dyn ClusterRegistry> = Arc::new(
		FileClusterRegistry::load(&config.clusters.registry_path).with_context(|| {
			format!(
				"loading cluster registry from {}",
				config.clusters.registry_path.display()
			)
		})?,
	);

	let factory = KubeInformerFactory::new(config.informer.sync_timeout());
	let informers = Arc::new(InformerManager::new(Arc::clone(&registry), Arc::new(factory)));

	let broker = TerminalBroker::new(
		registry,
		create_audit_recorder(&config.audit),
		Arc::new(SessionRegistry::new()),
		broker_config(&config.terminal),
	)
	.with_permissions(Arc::new(ClusterAllowList::new(
		config.permissions.allowed_clusters.iter().cloned(),
	)));

	Ok(AppState::new(informers, broker))
}

fn create_audit_recorder(config: &AuditConfig) -> Arc<dyn AuditRecorder> {
	if !config.enabled {
		info!("terminal auditing disabled");
		return Arc::new(NoopAuditRecorder);
	}

	let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink::new())];
	if let Some(path) = &config.file_path {
		info!(path = %path.display(), "audit file sink enabled");
		sinks.push(Arc::new(FileAuditSink::new(path.clone())));
	}
	Arc::new(AuditService::new(config.queue_capacity, sinks))
}

/// Translate the `[terminal]` section into broker settings.
pub fn broker_config(
	config: &kubedeck_server_config::TerminalConfig,
) -> kubedeck_terminal::TerminalConfig {
	kubedeck_terminal::TerminalConfig {
		kubectl_path: config.kubectl_path.clone(),
		command_timeout: config.command_timeout(),
		interrupt_grace: config.interrupt_grace(),
		history_limit: config.history_limit,
		default_namespace: config.default_namespace.clone(),
		credential_dir: config.credential_dir.clone(),
		audit_output_limit: config.audit_output_limit_bytes,
		verify_connection: config.verify_connection,
		connect_timeout: config.connect_timeout(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn broker_config_carries_every_field() {
		let mut section = kubedeck_server_config::TerminalConfig::default();
		section.command_timeout_secs = 15;
		section.interrupt_grace_ms = 250;
		section.default_namespace = "apps".to_string();
		section.connect_timeout_secs = 3;

		let config = broker_config(&section);
		assert_eq!(config.command_timeout, Duration::from_secs(15));
		assert_eq!(config.interrupt_grace, Duration::from_millis(250));
		assert_eq!(config.default_namespace, "apps");
		assert_eq!(config.history_limit, section.history_limit);
		assert!(config.verify_connection);
		assert_eq!(config.connect_timeout, Duration::from_secs(3));
	}

	#[tokio::test]
	async fn state_builds_with_missing_registry_file() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = ServerConfig::default();
		config.clusters.registry_path = dir.path().join("clusters.toml");
		config.audit.file_path = Some(dir.path().join("audit.jsonl"));

		let state = create_app_state(&config).unwrap();
		assert!(state.informers.cluster_ids().await.is_empty());
		assert!(state.broker.sessions().is_empty().await);
	}
}
