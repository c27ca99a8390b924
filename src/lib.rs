//! # workhorse
//!
//! Pluggable asynchronous work orchestration.
//!
//! A [`Work`](model::work::Work) names a behavior and carries an input. The
//! [`Workhorse`](engine::Workhorse) resolves the behavior, runs it, records
//! the result, spawns any child work it returned, and once every child has
//! finished routes the behavior's finalizer. Persistence, dispatch, behavior
//! loading and logging sit behind traits in [`service`], selected by href
//! through the [`href`] registry.

pub mod behavior;
pub mod config;
pub mod engine;
pub mod error;
pub mod href;
pub mod model;
pub mod service;
pub mod telemetry;

pub use engine::{WorkRequest, Workhorse};
pub use error::{Error, Result};
