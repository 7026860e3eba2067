// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kubedeck_cluster::ClusterError;
use kubedeck_terminal::TerminalError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	BadRequest(String),
	#[error("{0}")]
	Forbidden(String),
	#[error("{0}")]
	BadGateway(String),
	#[error("{0}")]
	GatewayTimeout(String),
	#[error("{0}")]
	Unavailable(String),
	#[error("{0}")]
	Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ApiError {
	fn status(&self) -> (StatusCode, &'static str) {
		match self {
			ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
			ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
			ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
			ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "cluster_unreachable"),
			ApiError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "sync_timeout"),
			ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
			ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
		}
	}
}

impl From<ClusterError> for ApiError {
	fn from(e: ClusterError) -> Self {
		match e {
			ClusterError::NotFound { .. } => ApiError::NotFound(e.to_string()),
			ClusterError::Connection { .. } => ApiError::BadGateway(e.to_string()),
			ClusterError::SyncTimeout { .. } => ApiError::GatewayTimeout(e.to_string()),
			ClusterError::Removed { .. } => ApiError::Unavailable(e.to_string()),
			ClusterError::Registry { .. } => ApiError::Internal(e.to_string()),
		}
	}
}

impl From<TerminalError> for ApiError {
	fn from(e: TerminalError) -> Self {
		match e {
			TerminalError::PermissionDenied { .. } => ApiError::Forbidden(e.to_string()),
			TerminalError::InvalidNamespace { .. } => ApiError::BadRequest(e.to_string()),
			TerminalError::Connection { .. } => ApiError::BadGateway(e.to_string()),
			_ => ApiError::Internal(e.to_string()),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, error) = self.status();
		if status.is_server_error() {
			tracing::warn!(status = status.as_u16(), error = %self, "request failed");
		}
		let body = ErrorResponse {
			error: error.to_string(),
			message: self.to_string(),
		};
		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cluster_errors_map_to_statuses() {
		let cases = [
			(
				ClusterError::NotFound {
					cluster_id: "x".to_string(),
				},
				StatusCode::NOT_FOUND,
			),
			(ClusterError::connection("x", "refused"), StatusCode::BAD_GATEWAY),
			(
				ClusterError::SyncTimeout {
					cluster_id: "x".to_string(),
					timeout_secs: 30,
				},
				StatusCode::GATEWAY_TIMEOUT,
			),
		];
		for (error, status) in cases {
			assert_eq!(ApiError::from(error).into_response().status(), status);
		}
	}

	#[test]
	fn permission_denied_is_forbidden() {
		let error = ApiError::from(TerminalError::PermissionDenied {
			cluster_id: "prod".to_string(),
			namespace: "default".to_string(),
		});
		assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);
	}
}
