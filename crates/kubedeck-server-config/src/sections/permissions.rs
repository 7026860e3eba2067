// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermissionsConfigLayer {
	pub allowed_clusters: Option<Vec<String>>,
}

impl PermissionsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.allowed_clusters.is_some() {
			self.allowed_clusters = other.allowed_clusters;
		}
	}

	pub fn finalize(self) -> PermissionsConfig {
		PermissionsConfig {
			allowed_clusters: self.allowed_clusters.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermissionsConfig {
	/// Clusters terminals may target. Empty allows all.
	pub allowed_clusters: Vec<String>,
}
