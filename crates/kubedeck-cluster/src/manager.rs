// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide registry of informer bundles, keyed by cluster id.

use std::collections::HashMap;
use std::sync::Arc;

use kube::Client;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::connection::ConnectionFactory;
use crate::error::{ClusterError, ClusterResult};
use crate::informer::{InformerBundle, InformerFactory};
use crate::registry::ClusterRegistry;
use crate::types::ClusterHandle;

/// A cluster's place in the map. Construction happens inside the cell, so
/// concurrent callers for one cluster share a single build while other
/// clusters stay unaffected.
type Slot = Arc<OnceCell<Arc<InformerBundle>>>;

pub struct InformerManager {
	registry: Arc<dyn ClusterRegistry>,
	factory: Arc<dyn InformerFactory>,
	connections: ConnectionFactory,
	bundles: RwLock<HashMap<String, Slot>>,
}

impl InformerManager {
	pub fn new(registry: Arc<dyn ClusterRegistry>, factory: Arc<dyn InformerFactory>) -> Self {
		Self {
			registry,
			factory,
			connections: ConnectionFactory::new(),
			bundles: RwLock::new(HashMap::new()),
		}
	}

	pub fn registry(&self) -> &Arc<dyn ClusterRegistry> {
		&self.registry
	}

	/// Cached bundle for `cluster`, building and syncing it on first use.
	///
	/// On failure nothing is cached and a later call retries.
	#[instrument(skip(self, cluster), fields(cluster_id = %cluster.id))]
	pub async fn ensure_for_cluster(&self, cluster: &ClusterHandle) -> ClusterResult<Arc<InformerBundle>> {
		if let Some(bundle) = self.get(&cluster.id).await {
			return Ok(bundle);
		}

		let slot = {
			let mut bundles = self.bundles.write().await;
			Arc::clone(bundles.entry(cluster.id.clone()).or_default())
		};

		let bundle = slot
			.get_or_try_init(|| async {
				info!(cluster_id = %cluster.id, "starting informers");
				self.factory.start(cluster).await.map(Arc::new)
			})
			.await?
			.clone();

		let still_registered = self
			.bundles
			.read()
			.await
			.get(&cluster.id)
			.is_some_and(|current| Arc::ptr_eq(current, &slot));
		if !still_registered {
			bundle.stop();
			return Err(ClusterError::Removed {
				cluster_id: cluster.id.clone(),
			});
		}

		Ok(bundle)
	}

	/// Resolve `cluster_id` through the registry, then [`Self::ensure_for_cluster`].
	pub async fn ensure(&self, cluster_id: &str) -> ClusterResult<Arc<InformerBundle>> {
		if let Some(bundle) = self.get(cluster_id).await {
			return Ok(bundle);
		}
		let cluster = self.registry.get_cluster(cluster_id).await?;
		self.ensure_for_cluster(&cluster).await
	}

	/// Lookup only; never triggers construction.
	pub async fn get(&self, cluster_id: &str) -> Option<Arc<InformerBundle>> {
		self
			.bundles
			.read()
			.await
			.get(cluster_id)
			.and_then(|slot| slot.get().cloned())
	}

	/// Stop and evict the cluster's bundle. Returns whether one existed.
	#[instrument(skip(self))]
	pub async fn remove(&self, cluster_id: &str) -> bool {
		let slot = self.bundles.write().await.remove(cluster_id);
		match slot.and_then(|slot| slot.get().cloned()) {
			Some(bundle) => {
				bundle.stop();
				info!(cluster_id, "informers removed");
				true
			}
			None => false,
		}
	}

	/// Raw client for uncached reads. Reuses the bundle's client when cached.
	pub async fn client(&self, cluster_id: &str) -> ClusterResult<Client> {
		if let Some(bundle) = self.get(cluster_id).await {
			return Ok(bundle.client());
		}
		let cluster = self.registry.get_cluster(cluster_id).await?;
		self.connections.client_for(&cluster).await
	}

	/// Ids of clusters with a built bundle, sorted.
	pub async fn cluster_ids(&self) -> Vec<String> {
		let bundles = self.bundles.read().await;
		let mut ids: Vec<String> = bundles
			.iter()
			.filter(|(_, slot)| slot.initialized())
			.map(|(id, _)| id.clone())
			.collect();
		ids.sort();
		ids
	}

	/// Build bundles for every registered cluster in the background.
	/// Individual failures are logged and skipped.
	pub fn spawn_prewarm(self: &Arc<Self>) -> JoinHandle<()> {
		let manager = Arc::clone(self);
		tokio::spawn(async move {
			let clusters = match manager.registry.list_clusters().await {
				Ok(clusters) => clusters,
				Err(e) => {
					warn!(error = %e, "informer pre-warm could not list clusters");
					return;
				}
			};

			info!(cluster_count = clusters.len(), "pre-warming informers");
			let warmups = clusters.iter().map(|cluster| {
				let manager = Arc::clone(&manager);
				async move {
					if let Err(e) = manager.ensure_for_cluster(cluster).await {
						warn!(cluster_id = %cluster.id, error = %e, "informer pre-warm failed");
					}
				}
			});
			futures::future::join_all(warmups).await;
		})
	}

	/// Stop every bundle and empty the map.
	pub async fn shutdown(&self) {
		let drained: Vec<Slot> = self.bundles.write().await.drain().map(|(_, slot)| slot).collect();
		for bundle in drained.iter().filter_map(|slot| slot.get()) {
			bundle.stop();
		}
		info!(bundle_count = drained.len(), "informer manager shut down");
	}
}
