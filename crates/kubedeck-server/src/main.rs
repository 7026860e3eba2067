// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! kubedeck server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kubedeck_server::{create_app_state, create_router, logging, AppState};
use tower_http::trace::TraceLayer;

/// kubedeck server - shared cluster caches and kubectl terminals.
#[derive(Parser, Debug)]
#[command(name = "kubedeck-server", about = "kubedeck cluster server", version)]
struct Args {
	/// Path to the server config file (default /etc/kubedeck/server.toml)
	#[arg(long, env = "KUBEDECK_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("kubedeck-server version: {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => kubedeck_server_config::load_config_with_file(path),
		None => kubedeck_server_config::load_config(),
	}
	.context("loading configuration")?;

	logging::init_tracing(&config.logging);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		registry = %config.clusters.registry_path.display(),
		"starting kubedeck-server"
	);

	let state = create_app_state(&config)?;

	if config.clusters.prewarm {
		state.informers.spawn_prewarm();
	}

	let app = create_router(state.clone()).layer(TraceLayer::new_for_http());

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("binding {addr}"))?;
	tracing::info!("listening on {}", addr);

	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.with_graceful_shutdown(shutdown_signal(state))
	.await
	.context("serving HTTP")?;

	tracing::info!("server shutdown complete");
	Ok(())
}

/// Resolves on Ctrl-C or SIGTERM after ending every session and stopping
/// every informer, so open WebSocket connections can drain.
async fn shutdown_signal(state: AppState) {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "failed to listen for Ctrl-C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}

	tracing::info!("received shutdown signal");
	state.shutdown().await;
}
