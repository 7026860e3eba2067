// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod audit;
mod clusters;
mod http;
mod informer;
mod logging;
mod permissions;
mod terminal;

pub use audit::{AuditConfig, AuditConfigLayer};
pub use clusters::{ClustersConfig, ClustersConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use informer::{InformerConfig, InformerConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use permissions::{PermissionsConfig, PermissionsConfigLayer};
pub use terminal::{TerminalConfig, TerminalConfigLayer};
