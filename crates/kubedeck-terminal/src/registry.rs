// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::session::{Session, SessionSummary};

/// Live sessions, keyed by session id.
///
/// Owned by whoever builds the broker; tests get their own instance.
#[derive(Default)]
pub struct SessionRegistry {
	sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn insert(&self, session: Arc<Session>) {
		self.sessions
			.write()
			.await
			.insert(session.id().to_string(), session);
	}

	pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
		self.sessions.write().await.remove(session_id)
	}

	pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
		self.sessions.read().await.get(session_id).cloned()
	}

	pub async fn len(&self) -> usize {
		self.sessions.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.sessions.read().await.is_empty()
	}

	/// Oldest first.
	pub async fn summaries(&self) -> Vec<SessionSummary> {
		let mut summaries: Vec<_> = self
			.sessions
			.read()
			.await
			.values()
			.map(|s| s.summary())
			.collect();
		summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
		summaries
	}

	/// Cancel every session's scope. Each session loop then tears itself down.
	pub async fn cancel_all(&self) {
		let sessions = self.sessions.read().await;
		info!(count = sessions.len(), "cancelling terminal sessions");
		for session in sessions.values() {
			session.scope().cancel();
		}
	}
}
