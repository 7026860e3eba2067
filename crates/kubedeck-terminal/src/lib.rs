// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Interactive kubectl terminal sessions.
//!
//! A [`TerminalBroker`] turns one client connection into a line-buffered
//! command channel bound to a cluster and namespace. Commands run as scoped
//! child processes against a per-session kubeconfig; every command is
//! audited through [`kubedeck_audit::AuditRecorder`].

pub mod broker;
pub mod command;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod permission;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod session;

pub use broker::{InboundFrame, PendingSession, SessionRequest, TerminalBroker, TerminalConfig};
pub use error::{TerminalError, TerminalResult};
pub use permission::{AllowAll, ClusterAllowList, PermissionGate};
pub use protocol::{ClientMessage, MessageKind, TerminalMessage};
pub use registry::SessionRegistry;
pub use session::SessionSummary;
