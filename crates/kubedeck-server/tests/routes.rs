// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use kube::Client;
use kubedeck_audit::NoopAuditRecorder;
use kubedeck_cluster::{
	ClusterError, ClusterHandle, ClusterResult, InMemoryClusterRegistry, InformerBundle,
	InformerFactory, InformerManager, Listers,
};
use kubedeck_server::{create_router, AppState};
use kubedeck_terminal::{ClusterAllowList, SessionRegistry, TerminalBroker, TerminalConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Builds bundles with empty stores and no live watches.
#[derive(Default)]
struct StaticFactory {
	builds: AtomicUsize,
}

#[async_trait]
impl InformerFactory for StaticFactory {
	async fn start(&self, cluster: &ClusterHandle) -> ClusterResult<InformerBundle> {
		self.builds.fetch_add(1, Ordering::SeqCst);
		let client = Client::try_from(kube::Config::new("http://127.0.0.1:9".parse().unwrap()))
			.map_err(|e| ClusterError::connection(&cluster.id, e))?;
		let cancel = CancellationToken::new();
		let watched = cancel.clone();
		let task = tokio::spawn(async move { watched.cancelled().await });
		let bundle = InformerBundle::new(cluster.id.clone(), client, Listers::detached(), cancel, vec![task]);
		bundle.mark_ready();
		Ok(bundle)
	}
}

struct TestApp {
	state: AppState,
	factory: Arc<StaticFactory>,
	_dir: tempfile::TempDir,
}

impl TestApp {
	fn new() -> Self {
		let dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(InMemoryClusterRegistry::from_clusters([
			ClusterHandle::with_kubeconfig("dev", "Development", "https://dev:6443", "apiVersion: v1"),
			ClusterHandle::with_kubeconfig("prod", "Production", "https://prod:6443", "apiVersion: v1"),
		]));
		let factory = Arc::new(StaticFactory::default());
		let informers = Arc::new(InformerManager::new(registry.clone(), factory.clone()));

		let config = TerminalConfig {
			kubectl_path: dir.path().join("kubectl"),
			credential_dir: Some(dir.path().to_path_buf()),
			verify_connection: false,
			..TerminalConfig::default()
		};
		let broker = TerminalBroker::new(
			registry,
			Arc::new(NoopAuditRecorder),
			Arc::new(SessionRegistry::new()),
			config,
		)
		.with_permissions(Arc::new(ClusterAllowList::new(["dev"])));

		Self {
			state: AppState::new(informers, broker),
			factory,
			_dir: dir,
		}
	}

	async fn request(&self, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
		let response = create_router(self.state.clone())
			.oneshot(
				Request::builder()
					.method(method)
					.uri(uri)
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		let status = response.status();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let json = if body.is_empty() {
			serde_json::Value::Null
		} else {
			serde_json::from_slice(&body).unwrap()
		};
		(status, json)
	}

	async fn serve(&self) -> SocketAddr {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let app = create_router(self.state.clone());
		tokio::spawn(async move {
			axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
				.await
				.unwrap();
		});
		addr
	}
}

#[tokio::test]
async fn health_reports_ok() {
	let app = TestApp::new();
	let (status, body) = app.request("GET", "/health").await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "ok");
	assert_eq!(body["cached_clusters"], 0);
	assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn pods_are_served_from_a_shared_cache() {
	let app = TestApp::new();

	let (status, body) = app.request("GET", "/v1/clusters/dev/pods?namespace=default").await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["cluster_id"], "dev");
	assert_eq!(body["namespace"], "default");
	assert!(body["pods"].as_array().unwrap().is_empty());

	let (status, _) = app.request("GET", "/v1/clusters/dev/pods").await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(app.factory.builds.load(Ordering::SeqCst), 1);

	let (_, clusters) = app.request("GET", "/v1/clusters").await;
	let clusters = clusters.as_array().unwrap();
	assert_eq!(clusters.len(), 2);
	assert_eq!(clusters[0]["id"], "dev");
	assert_eq!(clusters[0]["cached"], true);
	assert_eq!(clusters[1]["cached"], false);
}

#[tokio::test]
async fn unknown_cluster_is_not_found() {
	let app = TestApp::new();
	let (status, body) = app.request("GET", "/v1/clusters/nope/pods").await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");
	assert_eq!(app.factory.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn evicting_the_cache_forces_a_rebuild() {
	let app = TestApp::new();
	app.request("GET", "/v1/clusters/dev/pods").await;

	let (status, _) = app.request("DELETE", "/v1/clusters/dev/cache").await;
	assert_eq!(status, StatusCode::NO_CONTENT);
	let (status, _) = app.request("DELETE", "/v1/clusters/dev/cache").await;
	assert_eq!(status, StatusCode::NOT_FOUND);

	app.request("GET", "/v1/clusters/dev/pods").await;
	assert_eq!(app.factory.builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_sessions_initially() {
	let app = TestApp::new();
	let (status, body) = app.request("GET", "/v1/terminal/sessions").await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, serde_json::json!([]));
}

const UPGRADE_HEADERS: &str = "Host: localhost\r\n\
	Connection: Upgrade\r\n\
	Upgrade: websocket\r\n\
	Sec-WebSocket-Version: 13\r\n\
	Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
	x-kubedeck-user: alice\r\n\r\n";

/// Sends an upgrade request and returns the status line plus any bytes
/// already read past the response headers.
async fn upgrade(addr: SocketAddr, query: &str) -> (TcpStream, String, Vec<u8>) {
	let mut stream = TcpStream::connect(addr).await.unwrap();
	let request = format!("GET /v1/terminal/ws?{query} HTTP/1.1\r\n{UPGRADE_HEADERS}");
	stream.write_all(request.as_bytes()).await.unwrap();

	let mut buf = Vec::new();
	let end = loop {
		if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
			break pos + 4;
		}
		read_more(&mut stream, &mut buf).await;
	};
	let head = String::from_utf8_lossy(&buf[..end]).to_string();
	let status = head.lines().next().unwrap_or_default().to_string();
	(stream, status, buf[end..].to_vec())
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) {
	let mut chunk = [0u8; 1024];
	let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
		.await
		.expect("read timed out")
		.unwrap();
	assert!(read > 0, "connection closed");
	buf.extend_from_slice(&chunk[..read]);
}

/// Reads one unmasked server text frame.
async fn read_text_frame(stream: &mut TcpStream, buf: &mut Vec<u8>) -> serde_json::Value {
	while buf.len() < 2 {
		read_more(stream, buf).await;
	}
	assert_eq!(buf[0] & 0x0f, 0x1, "expected a text frame");
	let (len, header) = match buf[1] & 0x7f {
		126 => {
			while buf.len() < 4 {
				read_more(stream, buf).await;
			}
			(u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
		}
		n => (n as usize, 2),
	};
	while buf.len() < header + len {
		read_more(stream, buf).await;
	}
	let payload: Vec<u8> = buf.drain(..header + len).skip(header).collect();
	serde_json::from_slice(&payload).unwrap()
}

#[tokio::test]
async fn refused_cluster_gets_forbidden_before_upgrade() {
	let app = TestApp::new();
	let addr = app.serve().await;

	let (_stream, status, _) = upgrade(addr, "cluster_id=prod").await;
	assert!(status.contains("403"), "{status}");

	let (_stream, status, _) = upgrade(addr, "cluster_id=dev&namespace=Bad_NS").await;
	assert!(status.contains("400"), "{status}");
}

#[tokio::test]
async fn upgraded_session_greets_and_is_listed() {
	let app = TestApp::new();
	let addr = app.serve().await;

	let (mut stream, status, mut buf) = upgrade(addr, "cluster_id=dev&namespace=apps").await;
	assert!(status.contains("101"), "{status}");

	let banner = read_text_frame(&mut stream, &mut buf).await;
	assert_eq!(banner["type"], "output");
	assert!(banner["data"].as_str().unwrap().contains("Development"));
	let namespace = read_text_frame(&mut stream, &mut buf).await;
	assert_eq!(namespace["data"], "Namespace: apps\r\n");
	let prompt = read_text_frame(&mut stream, &mut buf).await;
	assert_eq!(prompt["type"], "command_result");

	let (_, sessions) = app.request("GET", "/v1/terminal/sessions").await;
	let sessions = sessions.as_array().unwrap();
	assert_eq!(sessions.len(), 1);
	assert_eq!(sessions[0]["user"], "alice");
	assert_eq!(sessions[0]["cluster_id"], "dev");
	assert_eq!(sessions[0]["namespace"], "apps");

	drop(stream);
	tokio::time::timeout(Duration::from_secs(5), async {
		while !app.state.broker.sessions().is_empty().await {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await
	.expect("session was not torn down");
}

#[tokio::test]
async fn shutdown_ends_sessions_and_informers() {
	let app = TestApp::new();
	let addr = app.serve().await;
	app.request("GET", "/v1/clusters/dev/pods").await;

	let (mut stream, status, mut buf) = upgrade(addr, "cluster_id=dev").await;
	assert!(status.contains("101"), "{status}");
	for _ in 0..3 {
		read_text_frame(&mut stream, &mut buf).await;
	}

	app.state.shutdown().await;

	tokio::time::timeout(Duration::from_secs(5), async {
		while !app.state.broker.sessions().is_empty().await {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await
	.expect("session survived shutdown");
	assert!(app.state.informers.cluster_ids().await.is_empty());
}
