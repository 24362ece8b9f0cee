//! Velero installation orchestrator for Kubernetes clusters
//!
//! This crate decides how to bring the Velero backup subsystem into a desired
//! running state inside a cluster, and how to tear it down safely. Every
//! install request is answered with one of three strategies:
//!
//! - the subsystem is already healthy and nothing should be done
//! - it is partially or incorrectly installed and must be forced clean
//!   before reinstalling
//! - it is a first-time install
//!
//! The chosen strategy drives an ordered, retryable sequence of cluster
//! operations, validated end-to-end including connectivity to the object
//! storage backend that holds backup data.
//!
//! # Modules
//!
//! - [`orchestrator`] - Public façade coordinating install, uninstall, cleanup
//! - [`strategy`] - Pure strategy resolution from a health snapshot
//! - [`status`] - Health snapshot derivation from live cluster state
//! - [`install`] - Install request/result types and the install executor
//! - [`cleanup`] - Ordered teardown with abort-on-error and force modes
//! - [`retry`] - Bounded fixed-delay retry for transient failures
//! - [`readiness`] - Interval polling with a ceiling and cancellation
//! - [`cluster`], [`helm`], [`velero`], [`storage`] - Capability interfaces
//!   over the cluster, package deployment, backup custom resources, and the
//!   object storage backend
//! - [`config`] - Tunables (attempt counts, delays, namespace candidates)
//! - [`error`] - Error types for the orchestrator

#![deny(missing_docs)]

pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod error;
pub mod helm;
pub mod install;
pub mod orchestrator;
pub mod readiness;
pub mod retry;
pub mod status;
pub mod storage;
pub mod strategy;
pub mod velero;

pub use error::Error;
pub use install::{InstallRequest, InstallResult, UninstallRequest};
pub use orchestrator::Orchestrator;
pub use status::HealthSnapshot;
pub use strategy::Strategy;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the Helm release (and pod name prefix) for the backup subsystem
pub const RELEASE_NAME: &str = "velero";

/// Name of the credential secret created in the target namespace
pub const CREDENTIAL_SECRET_NAME: &str = "cloud-credentials";

/// Key inside the credential secret holding the AWS-style credential file
pub const CREDENTIAL_SECRET_KEY: &str = "cloud";
