// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster cache endpoints.
//!
//! Reads are answered from the shared informer listers; the first request
//! for a cluster builds and syncs its bundle.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	Json,
};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClusterSummary {
	pub id: String,
	pub name: String,
	pub api_server: String,
	/// Whether an informer bundle is currently cached.
	pub cached: bool,
}

#[derive(Debug, Deserialize)]
pub struct PodsQuery {
	pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PodSummary {
	pub name: String,
	pub namespace: String,
	pub phase: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PodListResponse {
	pub cluster_id: String,
	pub namespace: Option<String>,
	pub pods: Vec<PodSummary>,
}

/// GET /v1/clusters
pub async fn list_clusters(State(state): State<AppState>) -> Result<Json<Vec<ClusterSummary>>, ApiError> {
	let cached = state.informers.cluster_ids().await;
	let mut clusters: Vec<ClusterSummary> = state
		.informers
		.registry()
		.list_clusters()
		.await?
		.into_iter()
		.map(|cluster| ClusterSummary {
			cached: cached.contains(&cluster.id),
			id: cluster.id,
			name: cluster.name,
			api_server: cluster.api_server,
		})
		.collect();
	clusters.sort_by(|a, b| a.id.cmp(&b.id));
	Ok(Json(clusters))
}

/// GET /v1/clusters/{id}/pods
#[instrument(skip(state, query), fields(namespace = ?query.namespace))]
pub async fn list_pods(
	State(state): State<AppState>,
	Path(cluster_id): Path<String>,
	Query(query): Query<PodsQuery>,
) -> Result<Json<PodListResponse>, ApiError> {
	let namespace = query.namespace.filter(|ns| !ns.is_empty());
	let bundle = state.informers.ensure(&cluster_id).await?;

	let mut pods: Vec<PodSummary> = bundle
		.listers()
		.pods(namespace.as_deref())
		.iter()
		.map(|pod| PodSummary {
			name: pod.name_any(),
			namespace: pod.namespace().unwrap_or_default(),
			phase: pod.status.as_ref().and_then(|status| status.phase.clone()),
		})
		.collect();
	pods.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

	Ok(Json(PodListResponse {
		cluster_id,
		namespace,
		pods,
	}))
}

/// DELETE /v1/clusters/{id}/cache
#[instrument(skip(state))]
pub async fn evict_cache(
	State(state): State<AppState>,
	Path(cluster_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	if state.informers.remove(&cluster_id).await {
		Ok(StatusCode::NO_CONTENT)
	} else {
		Err(ApiError::NotFound(format!(
			"no cached informers for cluster {cluster_id}"
		)))
	}
}
