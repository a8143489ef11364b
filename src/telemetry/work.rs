//! Iteration span helpers.

use crate::model::work::State;
use tracing::Span;
use uuid::Uuid;

/// Start a span covering one fetch → execute → ack/fail iteration.
///
/// `work.key` is declared empty and filled once an item is fetched.
pub fn start_iteration_span(driver: &str, iteration_id: &Uuid) -> Span {
    tracing::info_span!(
        "work.iteration",
        "work.driver" = driver,
        "work.iteration_id" = %iteration_id,
        "work.key" = tracing::field::Empty,
    )
}

/// Record a controller state transition as an event on `span`.
pub fn record_state_transition(span: &Span, from: State, to: State) {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    span.in_scope(|| {
        tracing::debug!(from = %from, to = %to, "state_transition");
    });
}
