//! `stevedore`: a compose front end for containerd-backed container engines.
//!
//! The [`compose`] module holds the orchestration engine; [`engine`] is the
//! boundary to the engine CLI and [`project`] loads manifests.

pub mod compose;
pub mod config;
pub mod engine;
pub mod lock;
pub mod logging;
pub mod project;
