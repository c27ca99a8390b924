//! Sample behaviors.

pub mod calculator;

pub use calculator::Calculator;
