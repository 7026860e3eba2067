// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const DEFAULT_REGISTRY_PATH: &str = "/etc/kubedeck/clusters.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClustersConfigLayer {
	pub registry_path: Option<PathBuf>,
	pub prewarm: Option<bool>,
}

impl ClustersConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.registry_path.is_some() {
			self.registry_path = other.registry_path;
		}
		if other.prewarm.is_some() {
			self.prewarm = other.prewarm;
		}
	}

	pub fn finalize(self) -> ClustersConfig {
		ClustersConfig {
			registry_path: self
				.registry_path
				.unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH)),
			prewarm: self.prewarm.unwrap_or(true),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClustersConfig {
	/// TOML file of `[[clusters]]` entries.
	pub registry_path: PathBuf,
	/// Build informer caches for every registered cluster at startup.
	pub prewarm: bool,
}

impl Default for ClustersConfig {
	fn default() -> Self {
		ClustersConfigLayer::default().finalize()
	}
}
