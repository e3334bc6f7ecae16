//! Multi-tenant container hosting control plane.
//!
//! `podhost` provisions isolated tenant deployments on a single host. Each
//! tenant gets a compose project under its own directory, a dedicated
//! `/24` subnet with a bandwidth cap, and a password-protected site on the
//! shared reverse proxy.
//!
//! # Architecture
//!
//! Mutating requests are validated synchronously by [`api::HostService`] and
//! queued as typed tasks. A single worker drains the queue in submission
//! order, so subnet leasing and host-global rules never race. Read-only
//! queries go straight to the container runtime.
//!
//! # Modules
//!
//! - [`api`]: Submission surface combining the task queue and runtime queries
//! - [`command`]: Host program execution behind an injectable runner
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection, runtime calls and compose
//! - [`error`]: Semantic error types for the application
//! - [`lifecycle`]: Create, control and remove tenant deployments
//! - [`network`]: Subnet leasing and bandwidth limits
//! - [`tasks`]: Single-worker task queue with pollable records
//! - [`tenant`]: Tenant names and on-disk tenant directories
//! - [`vhost`]: Reverse proxy fragment rendering and synchronization

pub mod api;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod tasks;
pub mod tenant;
pub mod vhost;
