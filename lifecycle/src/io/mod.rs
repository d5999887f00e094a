//! Side-effecting adapters: HTTP, git, subprocesses, filesystem, config.

pub mod config;
pub mod generation;
pub mod git;
pub mod health;
pub mod platform;
pub mod process;
pub mod prompt;
pub mod repository;
