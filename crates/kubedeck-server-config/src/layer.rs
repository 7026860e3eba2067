// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::sections::{
	AuditConfigLayer, ClustersConfigLayer, HttpConfigLayer, InformerConfigLayer,
	LoggingConfigLayer, PermissionsConfigLayer, TerminalConfigLayer,
};

/// One source's view of the configuration. Unset fields defer to lower
/// precedence sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfigLayer {
	pub http: Option<HttpConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
	pub clusters: Option<ClustersConfigLayer>,
	pub informer: Option<InformerConfigLayer>,
	pub terminal: Option<TerminalConfigLayer>,
	pub audit: Option<AuditConfigLayer>,
	pub permissions: Option<PermissionsConfigLayer>,
}

fn merge_section<T: Default>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	if let Some(other) = other {
		merge(base.get_or_insert_with(T::default), other);
	}
}

impl ServerConfigLayer {
	/// Overlay `other` on top of `self`.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.clusters, other.clusters, ClustersConfigLayer::merge);
		merge_section(&mut self.informer, other.informer, InformerConfigLayer::merge);
		merge_section(&mut self.terminal, other.terminal, TerminalConfigLayer::merge);
		merge_section(&mut self.audit, other.audit, AuditConfigLayer::merge);
		merge_section(&mut self.permissions, other.permissions, PermissionsConfigLayer::merge);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9000),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(base.http.unwrap().port, Some(9000));
	}

	proptest! {
		#[test]
		fn later_layer_wins_when_set(low in proptest::option::of(1u16..), high in proptest::option::of(1u16..)) {
			let layer = |port| ServerConfigLayer {
				http: Some(HttpConfigLayer { host: None, port }),
				..Default::default()
			};
			let mut merged = layer(low);
			merged.merge(layer(high));
			prop_assert_eq!(merged.http.unwrap().port, high.or(low));
		}
	}
}
