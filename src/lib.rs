//! Fufu - Kubernetes operator for Fufu resources
//!
//! A Fufu describes a cat. For every Fufu the operator keeps a web
//! Deployment serving a page about the cat, a LoadBalancer Service in front
//! of it and a HorizontalPodAutoscaler for the Deployment, and reports the
//! Deployment's replica count and the Service's external address back on the
//! Fufu's status.
//!
//! # Modules
//!
//! - [`crd`] - The Fufu Custom Resource Definition
//! - [`workload`] - Desired Deployment, Service and HorizontalPodAutoscaler
//! - [`controller`] - Reconciliation logic
//! - [`events`] - Kubernetes Events published on Fufus
//! - [`config`] - Command line and environment configuration
//! - [`telemetry`] - Logging setup
//! - [`retry`] - Backoff for startup calls
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod retry;
pub mod telemetry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
