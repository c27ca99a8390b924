//! Adds two numbers, optionally twice.

use anyhow::bail;
use async_trait::async_trait;
use serde_json::json;

use crate::model::work::{Response, Work};
use crate::service::{Finalizer, Runnable};

/// Input `{x, y, twice?}`. Succeeds with `x + y`. With `twice: true` it
/// also spawns one child calculator over the same numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Calculator;

#[async_trait]
impl Runnable for Calculator {
    async fn run(&self, work: &Work) -> anyhow::Result<Response> {
        let (Some(x), Some(y)) = (work.input["x"].as_f64(), work.input["y"].as_f64()) else {
            bail!("Inputs must be numbers");
        };

        let response = Response::new(sum(&work.input["x"], &work.input["y"], x + y));
        if work.input["twice"].as_bool() == Some(true) {
            let child = Work::new(
                "calculator",
                json!({"x": work.input["x"], "y": work.input["y"]}),
            );
            return Ok(response.with_children(vec![child]));
        }
        Ok(response)
    }

    fn finalizer(&self) -> Option<&dyn Finalizer> {
        Some(self)
    }
}

#[async_trait]
impl Finalizer for Calculator {
    async fn on_children_done(&self, _work: &Work) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}

/// Keep integer inputs integral in the output.
fn sum(x: &serde_json::Value, y: &serde_json::Value, float: f64) -> serde_json::Value {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => match x.checked_add(y) {
            Some(n) => json!(n),
            None => json!(float),
        },
        _ => json!(float),
    }
}
