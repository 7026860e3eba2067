// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Terminal WebSocket endpoint.
//!
//! Permission and namespace checks run before the upgrade so a refused
//! request gets a plain HTTP status. After the upgrade the socket is split
//! into a reader and a writer task bridged to the broker's channels.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
	extract::{
		ws::{Message, WebSocket, WebSocketUpgrade},
		ConnectInfo, Query, State,
	},
	http::{Extensions, HeaderMap},
	response::Response,
	Json,
};
use futures::{SinkExt, StreamExt};
use kubedeck_terminal::{
	InboundFrame, PendingSession, SessionRequest, SessionSummary, TerminalBroker, TerminalMessage,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Header the enclosing platform sets to the authenticated principal.
pub const USER_HEADER: &str = "x-kubedeck-user";
pub const ANONYMOUS_USER: &str = "anonymous";

const INBOUND_QUEUE: usize = 64;
const OUTBOUND_QUEUE: usize = 256;
/// Bound on flushing queued output after the session ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
	pub cluster_id: String,
	pub namespace: Option<String>,
}

/// GET /v1/terminal/ws
pub async fn terminal_ws(
	ws: WebSocketUpgrade,
	State(state): State<AppState>,
	Query(query): Query<TerminalQuery>,
	headers: HeaderMap,
	extensions: Extensions,
) -> Result<Response, ApiError> {
	let user = headers
		.get(USER_HEADER)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.unwrap_or(ANONYMOUS_USER)
		.to_string();
	let remote_addr = extensions
		.get::<ConnectInfo<SocketAddr>>()
		.map(|ConnectInfo(addr)| addr.to_string());

	info!(cluster_id = %query.cluster_id, %user, "terminal upgrade requested");

	let pending = state
		.broker
		.prepare(SessionRequest {
			cluster_id: query.cluster_id,
			namespace: query.namespace,
			user,
			remote_addr,
		})
		.await?;

	let broker = state.broker.clone();
	let failed_broker = state.broker.clone();
	let failed_pending = pending.clone();

	Ok(ws
		.on_failed_upgrade(move |e| failed_broker.abort(failed_pending, e))
		.on_upgrade(move |socket| serve_socket(socket, broker, pending)))
}

async fn serve_socket(socket: WebSocket, broker: TerminalBroker, pending: PendingSession) {
	let (mut sender, mut receiver) = socket.split();
	let (inbound_tx, inbound_rx) = mpsc::channel::<InboundFrame>(INBOUND_QUEUE);
	let (outbound_tx, mut outbound_rx) = mpsc::channel::<TerminalMessage>(OUTBOUND_QUEUE);

	let send_task = tokio::spawn(async move {
		while let Some(message) = outbound_rx.recv().await {
			if let Err(e) = sender.send(Message::Text(message.to_json().into())).await {
				debug!(error = %e, "terminal send failed");
				return;
			}
		}
		let _ = sender.send(Message::Close(None)).await;
	});

	let recv_task = tokio::spawn(async move {
		while let Some(frame) = receiver.next().await {
			let frame = match frame {
				Ok(Message::Text(text)) => {
					let text: &str = &text;
					InboundFrame::Text(text.to_owned())
				}
				Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
					Ok(text) => InboundFrame::Text(text),
					Err(_) => continue,
				},
				Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
				Ok(Message::Close(_)) => InboundFrame::Close,
				Err(e) => InboundFrame::Error(e.to_string()),
			};
			let last = !matches!(frame, InboundFrame::Text(_));
			if inbound_tx.send(frame).await.is_err() || last {
				return;
			}
		}
		let _ = inbound_tx.send(InboundFrame::Close).await;
	});

	let reason = broker.run(pending, inbound_rx, outbound_tx).await;
	recv_task.abort();
	if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
		debug!("terminal writer did not finish flushing");
	}
	info!(%reason, "terminal connection closed");
}

/// GET /v1/terminal/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
	Json(state.broker.sessions().summaries().await)
}
