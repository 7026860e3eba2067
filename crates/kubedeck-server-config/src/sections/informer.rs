// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InformerConfigLayer {
	pub sync_timeout_secs: Option<u64>,
}

impl InformerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.sync_timeout_secs.is_some() {
			self.sync_timeout_secs = other.sync_timeout_secs;
		}
	}

	pub fn finalize(self) -> InformerConfig {
		InformerConfig {
			sync_timeout_secs: self.sync_timeout_secs.unwrap_or(30),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InformerConfig {
	/// Upper bound on waiting for a new bundle's initial sync.
	pub sync_timeout_secs: u64,
}

impl InformerConfig {
	pub fn sync_timeout(&self) -> Duration {
		Duration::from_secs(self.sync_timeout_secs)
	}
}

impl Default for InformerConfig {
	fn default() -> Self {
		InformerConfigLayer::default().finalize()
	}
}
