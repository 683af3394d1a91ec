#![doc = "sitesnap-core: core pipeline for snapshotting static sites."]

//! This crate holds the content-addressed synchronisation pipeline: resource
//! discovery, digest and URL derivation, the build/snapshot session, and the
//! concurrent diff-and-upload engine.
//! Transport to the remote service is out of scope; implement
//! [`contract::SnapshotService`] to plug one in.
//!
//! # Usage
//! Call [`synchronise::run_snapshot`] with a root directory, options, and a
//! service implementation.

pub mod config;
pub mod contract;
pub mod error;
pub mod pool;
pub mod remote_resources;
pub mod resource;
pub mod scan;
pub mod session;
pub mod synchronise;
pub mod upload;
