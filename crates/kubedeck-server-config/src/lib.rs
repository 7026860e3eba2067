// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the kubedeck server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`KUBEDECK_<SECTION>_<FIELD>`)
//!
//! # Usage
//!
//! ```ignore
//! use kubedeck_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, DEFAULT_CONFIG_PATH,
};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub logging: LoggingConfig,
	pub clusters: ClustersConfig,
	pub informer: InformerConfig,
	pub terminal: TerminalConfig,
	pub audit: AuditConfig,
	pub permissions: PermissionsConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`KUBEDECK_*`)
/// 2. Config file (`/etc/kubedeck/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge `sources` in precedence order and finalize.
pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		clusters: layer.clusters.unwrap_or_default().finalize(),
		informer: layer.informer.unwrap_or_default().finalize(),
		terminal: layer.terminal.unwrap_or_default().finalize(),
		audit: layer.audit.unwrap_or_default().finalize(),
		permissions: layer.permissions.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		registry = %config.clusters.registry_path.display(),
		prewarm = config.clusters.prewarm,
		kubectl = %config.terminal.kubectl_path.display(),
		audit_enabled = config.audit.enabled,
		"server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.http.port == 0 {
		return Err(ConfigError::Validation("http.port must not be 0".to_string()));
	}
	if config.terminal.command_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"terminal.command_timeout_secs must be greater than 0".to_string(),
		));
	}
	if config.terminal.history_limit == 0 {
		return Err(ConfigError::Validation(
			"terminal.history_limit must be greater than 0".to_string(),
		));
	}
	if config.terminal.connect_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"terminal.connect_timeout_secs must be greater than 0".to_string(),
		));
	}
	if config.informer.sync_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"informer.sync_timeout_secs must be greater than 0".to_string(),
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FixedSource(Precedence, ServerConfigLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	fn port_layer(port: u16) -> ServerConfigLayer {
		ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(port),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_defaults() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config, ServerConfig::default());
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert_eq!(config.informer.sync_timeout_secs, 30);
		assert!(config.permissions.allowed_clusters.is_empty());
	}

	#[test]
	fn test_environment_beats_file_regardless_of_order() {
		let config = load_from_sources(vec![
			Box::new(FixedSource(Precedence::Environment, port_layer(7000))),
			Box::new(FixedSource(Precedence::ConfigFile, port_layer(6000))),
			Box::new(DefaultsSource),
		])
		.unwrap();
		assert_eq!(config.http.port, 7000);
	}

	#[test]
	fn test_zero_port_rejected() {
		let err = load_from_sources(vec![Box::new(FixedSource(
			Precedence::ConfigFile,
			port_layer(0),
		))])
		.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_zero_timeout_rejected() {
		let layer = ServerConfigLayer {
			terminal: Some(TerminalConfigLayer {
				command_timeout_secs: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err =
			load_from_sources(vec![Box::new(FixedSource(Precedence::ConfigFile, layer))]).unwrap_err();
		assert!(err.to_string().contains("command_timeout_secs"));
	}

	#[test]
	fn test_zero_history_rejected() {
		let layer = ServerConfigLayer {
			terminal: Some(TerminalConfigLayer {
				history_limit: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err =
			load_from_sources(vec![Box::new(FixedSource(Precedence::ConfigFile, layer))]).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_zero_connect_timeout_rejected() {
		let layer = ServerConfigLayer {
			terminal: Some(TerminalConfigLayer {
				connect_timeout_secs: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err =
			load_from_sources(vec![Box::new(FixedSource(Precedence::ConfigFile, layer))]).unwrap_err();
		assert!(err.to_string().contains("connect_timeout_secs"));
	}
}
