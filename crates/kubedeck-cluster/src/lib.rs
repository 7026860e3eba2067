// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster connectivity for kubedeck.
//!
//! # Architecture
//!
//! - [`ClusterRegistry`]: where cluster ids, endpoints and credentials come from
//! - [`ConnectionFactory`]: kubeconfig synthesis and authenticated clients
//! - [`InformerManager`]: lazily built, shared per-cluster watch caches
//!
//! Handlers never talk to a cluster directly; they ask the manager for a
//! ready [`InformerBundle`] and read from its listers, or take its client for
//! one-off requests.

pub mod connection;
pub mod error;
pub mod informer;
pub mod manager;
pub mod registry;
pub mod types;

pub use connection::ConnectionFactory;
pub use error::{ClusterError, ClusterResult};
pub use informer::{
	InformerBundle, InformerFactory, KubeInformerFactory, Listers, DEFAULT_SYNC_TIMEOUT,
};
pub use manager::InformerManager;
pub use registry::{ClusterRegistry, FileClusterRegistry, InMemoryClusterRegistry};
pub use types::{ClusterCredentials, ClusterHandle};
