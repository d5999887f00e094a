//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects (the retry primitive only
//! sleeps). They operate on in-memory values and are tested in isolation.

pub mod branch;
pub mod credential;
pub mod retry;
pub mod review;
pub mod types;
