// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuditConfigLayer, ClustersConfigLayer, HttpConfigLayer, InformerConfigLayer, LogFormat,
	LoggingConfigLayer, PermissionsConfigLayer, TerminalConfigLayer,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/kubedeck/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(DEFAULT_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: KUBEDECK_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from(&Env(|name: &str| std::env::var(name).ok()))
	}
}

/// Variable lookup, so the mapping can be exercised without touching the
/// process environment.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {} value '{v}'", std::any::type_name::<T>()),
			}),
			None => Ok(None),
		}
	}

	fn path(&self, name: &str) -> Option<PathBuf> {
		self.var(name).map(PathBuf::from)
	}

	fn list(&self, name: &str) -> Option<Vec<String>> {
		self.var(name).map(|v| {
			v.split(',')
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.map(String::from)
				.collect()
		})
	}
}

fn load_from<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<ServerConfigLayer, ConfigError> {
	let format = match env.var("KUBEDECK_LOGGING_FORMAT") {
		Some(v) => Some(LogFormat::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
			key: "KUBEDECK_LOGGING_FORMAT".to_string(),
			message: format!("expected 'pretty' or 'json', got '{v}'"),
		})?),
		None => None,
	};

	Ok(ServerConfigLayer {
		http: Some(HttpConfigLayer {
			host: env.var("KUBEDECK_HTTP_HOST"),
			port: env.parse("KUBEDECK_HTTP_PORT")?,
		}),
		logging: Some(LoggingConfigLayer {
			level: env.var("KUBEDECK_LOGGING_LEVEL"),
			format,
		}),
		clusters: Some(ClustersConfigLayer {
			registry_path: env.path("KUBEDECK_CLUSTERS_REGISTRY_PATH"),
			prewarm: env.bool("KUBEDECK_CLUSTERS_PREWARM"),
		}),
		informer: Some(InformerConfigLayer {
			sync_timeout_secs: env.parse("KUBEDECK_INFORMER_SYNC_TIMEOUT_SECS")?,
		}),
		terminal: Some(TerminalConfigLayer {
			kubectl_path: env.path("KUBEDECK_TERMINAL_KUBECTL_PATH"),
			command_timeout_secs: env.parse("KUBEDECK_TERMINAL_COMMAND_TIMEOUT_SECS")?,
			interrupt_grace_ms: env.parse("KUBEDECK_TERMINAL_INTERRUPT_GRACE_MS")?,
			history_limit: env.parse("KUBEDECK_TERMINAL_HISTORY_LIMIT")?,
			default_namespace: env.var("KUBEDECK_TERMINAL_DEFAULT_NAMESPACE"),
			credential_dir: env.path("KUBEDECK_TERMINAL_CREDENTIAL_DIR"),
			audit_output_limit_bytes: env.parse("KUBEDECK_TERMINAL_AUDIT_OUTPUT_LIMIT_BYTES")?,
			verify_connection: env.bool("KUBEDECK_TERMINAL_VERIFY_CONNECTION"),
			connect_timeout_secs: env.parse("KUBEDECK_TERMINAL_CONNECT_TIMEOUT_SECS")?,
		}),
		audit: Some(AuditConfigLayer {
			enabled: env.bool("KUBEDECK_AUDIT_ENABLED"),
			queue_capacity: env.parse("KUBEDECK_AUDIT_QUEUE_CAPACITY")?,
			file_path: env.path("KUBEDECK_AUDIT_FILE_PATH"),
		}),
		permissions: Some(PermissionsConfigLayer {
			allowed_clusters: env.list("KUBEDECK_PERMISSIONS_ALLOWED_CLUSTERS"),
		}),
	})
}
