//! Agent-loop strategies.
//!
//! A strategy is a pure predicate over [`AgentLoopState`] deciding whether
//! the engine may start another model round after tool results were
//! appended. Rounds that produce no tool calls always end the loop,
//! whatever the strategy says.

use std::sync::Arc;

use crate::chunk::FinishReason;
use crate::message::ModelMessage;

/// Rounds allowed by [`default_strategy`].
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Read-only snapshot handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct AgentLoopState<'a> {
    /// Completed adapter round-trips so far
    pub iteration_count: u32,

    /// The full conversation so far
    pub messages: &'a [ModelMessage],

    /// Finish reason of the most recent round
    pub finish_reason: Option<FinishReason>,
}

/// Returns `true` to continue the loop.
pub type AgentLoopStrategy = Arc<dyn Fn(&AgentLoopState<'_>) -> bool + Send + Sync>;

/// Continue while `iteration_count < max`.
pub fn max_iterations(max: u32) -> AgentLoopStrategy {
    Arc::new(move |state: &AgentLoopState<'_>| state.iteration_count < max)
}

/// Always allow the first round; afterwards stop once the last finish
/// reason is one of `reasons`.
pub fn until_finish_reason(reasons: impl IntoIterator<Item = FinishReason>) -> AgentLoopStrategy {
    let reasons: Vec<FinishReason> = reasons.into_iter().collect();
    Arc::new(move |state: &AgentLoopState<'_>| {
        if state.iteration_count == 0 {
            return true;
        }
        match state.finish_reason {
            Some(reason) => !reasons.contains(&reason),
            None => true,
        }
    })
}

/// Logical AND: continue only if every strategy says continue.
pub fn combine_strategies(strategies: Vec<AgentLoopStrategy>) -> AgentLoopStrategy {
    Arc::new(move |state: &AgentLoopState<'_>| strategies.iter().all(|s| s(state)))
}

/// `max_iterations(DEFAULT_MAX_ITERATIONS)`.
pub fn default_strategy() -> AgentLoopStrategy {
    max_iterations(DEFAULT_MAX_ITERATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(iteration_count: u32, finish_reason: Option<FinishReason>) -> AgentLoopState<'static> {
        AgentLoopState {
            iteration_count,
            messages: &[],
            finish_reason,
        }
    }

    #[test]
    fn max_iterations_is_strict_less_than() {
        let s = max_iterations(3);
        assert!(s(&state(0, None)));
        assert!(s(&state(2, None)));
        assert!(!s(&state(3, None)));
        assert!(!s(&state(4, None)));
    }

    #[test]
    fn max_iterations_zero_never_continues() {
        let s = max_iterations(0);
        assert!(!s(&state(0, None)));
    }

    #[test]
    fn until_finish_reason_always_takes_first_round() {
        let s = until_finish_reason([FinishReason::Stop]);
        assert!(s(&state(0, Some(FinishReason::Stop))));
    }

    #[test]
    fn until_finish_reason_stops_on_listed_reason() {
        let s = until_finish_reason([FinishReason::Stop, FinishReason::Length]);
        assert!(!s(&state(1, Some(FinishReason::Stop))));
        assert!(!s(&state(2, Some(FinishReason::Length))));
        assert!(s(&state(1, Some(FinishReason::ToolCalls))));
        assert!(s(&state(1, None)));
    }

    #[test]
    fn combine_is_logical_and() {
        let s = combine_strategies(vec![
            max_iterations(10),
            until_finish_reason([FinishReason::Stop]),
        ]);
        assert!(s(&state(1, Some(FinishReason::ToolCalls))));
        assert!(!s(&state(1, Some(FinishReason::Stop))));
        assert!(!s(&state(10, Some(FinishReason::ToolCalls))));
    }

    #[test]
    fn empty_combination_continues() {
        let s = combine_strategies(Vec::new());
        assert!(s(&state(100, Some(FinishReason::Stop))));
    }

    #[test]
    fn strategy_sees_messages() {
        let messages = vec![ModelMessage::user("hi"), ModelMessage::assistant("hello")];
        let short_chats_only: AgentLoopStrategy = Arc::new(|s: &AgentLoopState<'_>| s.messages.len() < 3);
        let snapshot = AgentLoopState {
            iteration_count: 1,
            messages: &messages,
            finish_reason: None,
        };
        assert!(short_chats_only(&snapshot));
    }

    #[test]
    fn default_allows_five_rounds() {
        let s = default_strategy();
        assert!(s(&state(4, None)));
        assert!(!s(&state(5, None)));
    }
}
