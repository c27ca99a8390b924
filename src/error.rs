//! Error types for workhorse.
//!
//! Behavior failures never show up here: they are captured into the work's
//! result. What does show up is resolution failure, bookkeeping violations
//! and whatever the collaborators return.

use thiserror::Error;

use crate::model::work::{ResultStatus, WorkId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid href '{0}': expected '<module>:<name>'")]
    HrefFormat(String),

    #[error("could not find module {0}")]
    ModuleNotFound(String),

    #[error("could not find member {member} in module {module}")]
    MemberNotFound { member: String, module: String },

    #[error("expected {0} to resolve to an instantiable component")]
    NotInstantiable(String),

    #[error("behavior {0} defines no finalizer")]
    NoFinalizer(String),

    #[error("work item not found: {0}")]
    NotFound(WorkId),

    #[error("work {child} is not a child of {parent}")]
    UnknownChild { parent: WorkId, child: WorkId },

    #[error("invalid result transition: {from} -> {to}")]
    InvalidTransition { from: ResultStatus, to: ResultStatus },

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
