//! Orchestration engine: run, spawn, fan in, finalize.

pub mod builder;
pub mod workhorse;

pub use builder::WorkhorseBuilder;
pub use workhorse::{WorkRequest, Workhorse};
