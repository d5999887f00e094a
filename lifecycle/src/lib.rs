//! Resilient software-delivery pipeline.
//!
//! The crate drives a remote generation service through one linear run:
//! acquire a clean checkout, generate and review code, generate and run
//! tests, validate the deployment config, run the deploy script, and poll the
//! health endpoint. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (retry policy, credential normalization, branch
//!   selection, review parsing) and shared value types. No I/O.
//! - **[`io`]**: Side-effecting adapters (HTTP, git, platform cleanup,
//!   subprocesses, config). Every external collaborator sits behind a trait
//!   so tests can substitute fakes.
//!
//! [`agents`] wraps each stage in a small façade and [`pipeline`] sequences
//! them into a [`pipeline::PipelineReport`].

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
