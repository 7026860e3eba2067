// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-cluster watch caches.
//!
//! An [`InformerBundle`] owns one reflector store per cached resource kind and
//! the background tasks that keep those stores in sync. The tasks are
//! supervised: every handle lives in the bundle, and [`InformerBundle::stop`]
//! cancels and aborts all of them.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::ConnectionFactory;
use crate::error::{ClusterError, ClusterResult};
use crate::types::ClusterHandle;

/// Default bound on how long initial sync may take.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed read access to the cached resources of one cluster.
#[derive(Clone)]
pub struct Listers {
	pods: Store<Pod>,
	nodes: Store<Node>,
	deployments: Store<Deployment>,
	services: Store<Service>,
	namespaces: Store<Namespace>,
}

impl Listers {
	pub fn pods(&self, namespace: Option<&str>) -> Vec<Arc<Pod>> {
		in_namespace(self.pods.state(), namespace)
	}

	pub fn nodes(&self) -> Vec<Arc<Node>> {
		self.nodes.state()
	}

	pub fn deployments(&self, namespace: Option<&str>) -> Vec<Arc<Deployment>> {
		in_namespace(self.deployments.state(), namespace)
	}

	pub fn services(&self, namespace: Option<&str>) -> Vec<Arc<Service>> {
		in_namespace(self.services.state(), namespace)
	}

	pub fn namespaces(&self) -> Vec<Arc<Namespace>> {
		self.namespaces.state()
	}

	/// Resolves once every store has seen its initial list.
	async fn wait_until_ready(&self) -> Result<(), String> {
		tokio::try_join!(
			self.pods.wait_until_ready(),
			self.nodes.wait_until_ready(),
			self.deployments.wait_until_ready(),
			self.services.wait_until_ready(),
			self.namespaces.wait_until_ready(),
		)
		.map(|_| ())
		.map_err(|e| e.to_string())
	}

	/// Stores with no watch feeding them. Used where a bundle is needed
	/// without a live cluster.
	pub fn detached() -> Self {
		Self {
			pods: reflector::store().0,
			nodes: reflector::store().0,
			deployments: reflector::store().0,
			services: reflector::store().0,
			namespaces: reflector::store().0,
		}
	}
}

fn in_namespace<K: ResourceExt>(items: Vec<Arc<K>>, namespace: Option<&str>) -> Vec<Arc<K>> {
	match namespace {
		Some(ns) => items
			.into_iter()
			.filter(|item| item.namespace().as_deref() == Some(ns))
			.collect(),
		None => items,
	}
}

/// Owns the background watch tasks of one bundle.
struct Supervisor {
	cancel: CancellationToken,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
	fn new(cancel: CancellationToken, handles: Vec<JoinHandle<()>>) -> Self {
		Self {
			cancel,
			handles: Mutex::new(handles),
		}
	}

	fn stop(&self) {
		self.cancel.cancel();
		if let Ok(mut handles) = self.handles.lock() {
			for handle in handles.drain(..) {
				handle.abort();
			}
		}
	}

	fn running_tasks(&self) -> usize {
		self
			.handles
			.lock()
			.map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
			.unwrap_or(0)
	}
}

/// One cluster's client, listers and supervised watch tasks.
pub struct InformerBundle {
	cluster_id: String,
	client: Client,
	listers: Listers,
	ready: AtomicBool,
	supervisor: Supervisor,
}

impl InformerBundle {
	/// Assemble a bundle from already-spawned watch tasks. `cancel` must be
	/// the token those tasks observe.
	pub fn new(
		cluster_id: impl Into<String>,
		client: Client,
		listers: Listers,
		cancel: CancellationToken,
		handles: Vec<JoinHandle<()>>,
	) -> Self {
		Self {
			cluster_id: cluster_id.into(),
			client,
			listers,
			ready: AtomicBool::new(false),
			supervisor: Supervisor::new(cancel, handles),
		}
	}

	pub fn cluster_id(&self) -> &str {
		&self.cluster_id
	}

	/// Raw client for uncached reads and writes.
	pub fn client(&self) -> Client {
		self.client.clone()
	}

	pub fn listers(&self) -> &Listers {
		&self.listers
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Acquire)
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Release);
	}

	/// Stop every background watch task. Idempotent.
	pub fn stop(&self) {
		debug!(cluster_id = %self.cluster_id, "stopping informers");
		self.supervisor.stop();
	}

	pub fn is_stopped(&self) -> bool {
		self.supervisor.cancel.is_cancelled()
	}

	/// Number of watch tasks that have not yet finished.
	pub fn running_tasks(&self) -> usize {
		self.supervisor.running_tasks()
	}
}

impl Debug for InformerBundle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InformerBundle")
			.field("cluster_id", &self.cluster_id)
			.field("ready", &self.is_ready())
			.field("stopped", &self.is_stopped())
			.finish()
	}
}

/// Builds a synced [`InformerBundle`] for a cluster.
#[async_trait]
pub trait InformerFactory: Send + Sync {
	async fn start(&self, cluster: &ClusterHandle) -> ClusterResult<InformerBundle>;
}

/// Factory backed by live watches against the cluster API.
#[derive(Debug, Clone)]
pub struct KubeInformerFactory {
	connections: ConnectionFactory,
	sync_timeout: Duration,
}

impl KubeInformerFactory {
	pub fn new(sync_timeout: Duration) -> Self {
		Self {
			connections: ConnectionFactory::new(),
			sync_timeout,
		}
	}
}

impl Default for KubeInformerFactory {
	fn default() -> Self {
		Self::new(DEFAULT_SYNC_TIMEOUT)
	}
}

impl KubeInformerFactory {
	/// Connect, start every watch and wait for the initial lists.
	async fn build(&self, cluster: &ClusterHandle, cancel: &CancellationToken) -> ClusterResult<InformerBundle> {
		let client = self.connections.connect(cluster).await?;

		let (pods, pods_task) = spawn_reflector::<Pod>(&client, &cluster.id, "pods", cancel);
		let (nodes, nodes_task) = spawn_reflector::<Node>(&client, &cluster.id, "nodes", cancel);
		let (deployments, deployments_task) =
			spawn_reflector::<Deployment>(&client, &cluster.id, "deployments", cancel);
		let (services, services_task) =
			spawn_reflector::<Service>(&client, &cluster.id, "services", cancel);
		let (namespaces, namespaces_task) =
			spawn_reflector::<Namespace>(&client, &cluster.id, "namespaces", cancel);

		let listers = Listers {
			pods,
			nodes,
			deployments,
			services,
			namespaces,
		};
		let bundle = InformerBundle::new(
			cluster.id.clone(),
			client,
			listers,
			cancel.clone(),
			vec![
				pods_task,
				nodes_task,
				deployments_task,
				services_task,
				namespaces_task,
			],
		);

		match bundle.listers.wait_until_ready().await {
			Ok(()) => {
				bundle.mark_ready();
				info!(cluster_id = %cluster.id, "informer caches synced");
				Ok(bundle)
			}
			Err(message) => {
				bundle.stop();
				Err(ClusterError::connection(&cluster.id, message))
			}
		}
	}
}

#[async_trait]
impl InformerFactory for KubeInformerFactory {
	/// The connection check and the initial sync share one `sync_timeout`.
	#[instrument(skip(self, cluster), fields(cluster_id = %cluster.id))]
	async fn start(&self, cluster: &ClusterHandle) -> ClusterResult<InformerBundle> {
		let cancel = CancellationToken::new();

		match tokio::time::timeout(self.sync_timeout, self.build(cluster, &cancel)).await {
			Ok(result) => result,
			Err(_) => {
				cancel.cancel();
				warn!(cluster_id = %cluster.id, timeout = ?self.sync_timeout, "informer sync timed out");
				Err(ClusterError::SyncTimeout {
					cluster_id: cluster.id.clone(),
					timeout_secs: self.sync_timeout.as_secs(),
				})
			}
		}
	}
}

fn spawn_reflector<K>(
	client: &Client,
	cluster_id: &str,
	kind: &'static str,
	cancel: &CancellationToken,
) -> (Store<K>, JoinHandle<()>)
where
	K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
	K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
	let api: Api<K> = Api::all(client.clone());
	let (reader, writer) = reflector::store();
	let mut events = watcher(api, watcher::Config::default())
		.default_backoff()
		.reflect(writer)
		.applied_objects()
		.boxed();

	let cancel = cancel.clone();
	let cluster_id = cluster_id.to_string();
	let handle = tokio::spawn(async move {
		loop {
			tokio::select! {
				_ = cancel.cancelled() => {
					debug!(cluster_id = %cluster_id, kind, "watch cancelled");
					break;
				}
				event = events.next() => match event {
					Some(Ok(_)) => {}
					Some(Err(e)) => {
						warn!(cluster_id = %cluster_id, kind, error = %e, "watch stream error");
					}
					None => {
						warn!(cluster_id = %cluster_id, kind, "watch stream ended");
						break;
					}
				}
			}
		}
	});

	(reader, handle)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::manager::InformerManager;
	use crate::registry::InMemoryClusterRegistry;

	fn pod(namespace: &str, name: &str) -> Arc<Pod> {
		let mut pod = Pod::default();
		pod.metadata.name = Some(name.to_string());
		pod.metadata.namespace = Some(namespace.to_string());
		Arc::new(pod)
	}

	#[test]
	fn namespace_filter_keeps_only_matching_items() {
		let items = vec![pod("default", "a"), pod("kube-system", "b"), pod("default", "c")];

		let names: Vec<String> = in_namespace(items.clone(), Some("default"))
			.iter()
			.map(|p| p.name_any())
			.collect();
		assert_eq!(names, vec!["a", "c"]);
		assert_eq!(in_namespace(items, None).len(), 3);
	}

	#[tokio::test]
	async fn stop_cancels_and_aborts_watch_tasks() {
		let client = Client::try_from(kube::Config::new("http://127.0.0.1:9".parse().unwrap())).unwrap();
		let cancel = CancellationToken::new();
		let observed = cancel.clone();
		let watched = cancel.clone();
		let task = tokio::spawn(async move { observed.cancelled().await });

		let bundle = InformerBundle::new("dev", client, Listers::detached(), cancel, vec![task]);
		assert!(!bundle.is_ready());
		assert_eq!(bundle.running_tasks(), 1);

		bundle.stop();
		assert!(bundle.is_stopped());
		assert_eq!(bundle.running_tasks(), 0);
		assert!(watched.is_cancelled());

		bundle.stop();
	}

	fn plain_http_cluster(id: &str, server: &str) -> ClusterHandle {
		let kubeconfig = format!(
			"apiVersion: v1\nkind: Config\nclusters:\n- name: {id}\n  cluster:\n    server: {server}\nusers:\n- name: {id}\n  user: {{}}\ncontexts:\n- name: {id}\n  context:\n    cluster: {id}\n    user: {id}\ncurrent-context: {id}\n"
		);
		ClusterHandle::with_kubeconfig(id, id, server, kubeconfig)
	}

	/// Accepts connections and never answers.
	async fn silent_api_server() -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let mut held = Vec::new();
			while let Ok((socket, _)) = listener.accept().await {
				held.push(socket);
			}
		});
		format!("http://{addr}")
	}

	#[tokio::test]
	async fn silent_api_server_hits_sync_timeout() {
		let cluster = plain_http_cluster("silent", &silent_api_server().await);
		let factory = KubeInformerFactory::new(Duration::from_millis(200));

		let started = tokio::time::Instant::now();
		let result = factory.start(&cluster).await;
		assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
		assert!(matches!(
			result.err(),
			Some(ClusterError::SyncTimeout { ref cluster_id, .. }) if cluster_id == "silent"
		));
	}

	#[tokio::test]
	async fn refused_connection_is_a_connection_error() {
		let addr = {
			let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
			listener.local_addr().unwrap()
		};
		let cluster = plain_http_cluster("down", &format!("http://{addr}"));
		let factory = KubeInformerFactory::new(Duration::from_secs(10));

		assert!(matches!(
			factory.start(&cluster).await.err(),
			Some(ClusterError::Connection { ref cluster_id, .. }) if cluster_id == "down"
		));
	}

	#[tokio::test]
	async fn timed_out_cluster_is_not_cached() {
		let cluster = plain_http_cluster("silent", &silent_api_server().await);
		let registry = Arc::new(InMemoryClusterRegistry::from_clusters([cluster]));
		let manager = InformerManager::new(
			registry,
			Arc::new(KubeInformerFactory::new(Duration::from_millis(200))),
		);

		let started = tokio::time::Instant::now();
		assert!(matches!(
			manager.ensure("silent").await.err(),
			Some(ClusterError::SyncTimeout { .. })
		));
		assert!(started.elapsed() < Duration::from_secs(2));
		assert!(manager.get("silent").await.is_none());
		assert!(manager.cluster_ids().await.is_empty());
	}

	#[test]
	fn detached_listers_are_empty() {
		let listers = Listers::detached();
		assert!(listers.pods(None).is_empty());
		assert!(listers.nodes().is_empty());
		assert!(listers.namespaces().is_empty());
	}
}
