//! Span helpers for work execution.

use tracing::Span;

use crate::model::work::{ResultStatus, Work};

/// Start a span covering one run of `work`.
///
/// `work.phase` is left empty and filled in by the engine ("run" or
/// "finalize").
pub fn start_work_span(work: &Work) -> Span {
    let id = work.id.map(|id| id.to_string()).unwrap_or_default();
    tracing::info_span!(
        "work.execute",
        "work.behavior" = %work.behavior_ref,
        "work.id" = %id,
        "work.parent_id" = tracing::field::Empty,
        "work.phase" = tracing::field::Empty,
    )
}

/// Emit a `state_transition` event inside `span`.
pub fn record_state_transition(span: &Span, from: ResultStatus, to: ResultStatus) {
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}
