// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::event::AuditLogEntry;
use crate::sink::AuditSink;

/// Bounded queue in front of the sinks. Callers never wait on a sink.
pub struct AuditService {
	tx: mpsc::Sender<AuditLogEntry>,
}

impl AuditService {
	/// Must be called inside a tokio runtime; spawns the fan-out task.
	pub fn new(queue_capacity: usize, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
		let (tx, rx) = mpsc::channel(queue_capacity.max(1));

		tokio::spawn(Self::background_task(rx, sinks));

		Self { tx }
	}

	async fn background_task(mut rx: mpsc::Receiver<AuditLogEntry>, sinks: Vec<Arc<dyn AuditSink>>) {
		while let Some(entry) = rx.recv().await {
			let entry = Arc::new(entry);

			for sink in &sinks {
				let sink = Arc::clone(sink);
				let entry = Arc::clone(&entry);

				tokio::spawn(async move {
					if let Err(e) = sink.publish(entry).await {
						warn!(sink = sink.name(), error = %e, "audit sink publish failed");
					}
				});
			}
		}
	}

	/// Queue an entry. Returns `false` when the queue is full or closed and
	/// the entry was dropped.
	#[instrument(skip(self, entry), fields(event_type = %entry.event_type))]
	pub fn log(&self, entry: AuditLogEntry) -> bool {
		match self.tx.try_send(entry) {
			Ok(()) => true,
			Err(e) => {
				warn!(error = %e, "audit entry dropped");
				false
			}
		}
	}
}
