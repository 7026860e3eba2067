// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! kubedeck HTTP server: cluster cache endpoints and interactive terminals.

pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

use axum::{
	routing::{delete, get},
	Router,
};

pub use error::ApiError;
pub use state::{broker_config, create_app_state, AppState};

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/v1/clusters", get(routes::clusters::list_clusters))
		.route("/v1/clusters/{id}/pods", get(routes::clusters::list_pods))
		.route("/v1/clusters/{id}/cache", delete(routes::clusters::evict_cache))
		.route("/v1/terminal/ws", get(routes::terminal::terminal_ws))
		.route("/v1/terminal/sessions", get(routes::terminal::list_sessions))
		.with_state(state)
}
