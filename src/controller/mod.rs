//! Controller for Fufu resources
//!
//! The reconciler follows the Kubernetes controller pattern: observe the
//! dependents, compare them with what the Fufu asks for, and write only the
//! difference.

mod client;
mod converge;
pub mod diff;
#[cfg(test)]
mod fake;
mod fufu;

pub use client::{FufuKubeClient, FufuKubeClientImpl};
pub use converge::{converge, Convergence};
pub use fufu::{error_policy, reconcile, Context, ContextBuilder};
