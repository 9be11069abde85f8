//! Route rules: where a handler may hand off to, and how the choice is
//! made.
//!
//! Every handler carries a declared destination set, validated when the
//! graph is built. A routing function evaluated at run time must land
//! inside that set; the engine treats anything else as a routing
//! violation rather than silently defaulting, since a silent default
//! could skip a mandatory human-confirmation step.

use std::collections::HashSet;
use std::sync::Arc;

use concierge_types::conversation::{ConversationState, Destination};

/// A data-dependent routing decision over the post-merge state.
pub type RoutingFn = dyn Fn(&ConversationState) -> Destination + Send + Sync;

/// How a handler's next destination is chosen.
#[derive(Clone)]
pub enum RouteRule {
    /// Unconditional edge, always taken.
    Fixed(Destination),
    /// Evaluated on the state after the handler's update is merged.
    Conditional(Arc<RoutingFn>),
}

impl std::fmt::Debug for RouteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteRule::Fixed(dest) => f.debug_tuple("Fixed").field(dest).finish(),
            RouteRule::Conditional(_) => f.write_str("Conditional(..)"),
        }
    }
}

/// One handler's outgoing edges.
#[derive(Debug, Clone)]
pub struct Route {
    /// Every destination the rule is allowed to produce.
    pub destinations: HashSet<Destination>,
    pub rule: RouteRule,
}

impl Route {
    /// An unconditional edge to a single destination.
    pub fn fixed(destination: impl Into<Destination>) -> Self {
        let destination = destination.into();
        Self {
            destinations: HashSet::from([destination]),
            rule: RouteRule::Fixed(destination),
        }
    }

    /// A conditional route over an explicit destination set.
    pub fn conditional<I, F>(destinations: I, rule: F) -> Self
    where
        I: IntoIterator<Item = Destination>,
        F: Fn(&ConversationState) -> Destination + Send + Sync + 'static,
    {
        Self {
            destinations: destinations.into_iter().collect(),
            rule: RouteRule::Conditional(Arc::new(rule)),
        }
    }

    /// Evaluate the rule against a state.
    pub fn evaluate(&self, state: &ConversationState) -> Destination {
        match &self.rule {
            RouteRule::Fixed(dest) => *dest,
            RouteRule::Conditional(rule) => rule(state),
        }
    }

    pub fn declares(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_types::agent::AgentName;

    #[test]
    fn test_fixed_route_declares_its_destination() {
        let route = Route::fixed(AgentName::Supervisor);
        assert!(route.declares(Destination::Agent(AgentName::Supervisor)));
        assert!(!route.declares(Destination::End));
        assert_eq!(
            route.evaluate(&ConversationState::new("u")),
            Destination::Agent(AgentName::Supervisor)
        );
    }

    #[test]
    fn test_conditional_route_reads_state() {
        let route = Route::conditional(
            [Destination::Agent(AgentName::Scheduler), Destination::End],
            |state| state.next_handler.unwrap_or(Destination::End),
        );

        let mut state = ConversationState::new("u");
        assert_eq!(route.evaluate(&state), Destination::End);

        state.next_handler = Some(Destination::Agent(AgentName::Scheduler));
        assert_eq!(
            route.evaluate(&state),
            Destination::Agent(AgentName::Scheduler)
        );
    }

    #[test]
    fn test_conditional_can_return_undeclared_value() {
        // The rule itself is unchecked; enforcement happens in the engine.
        let route = Route::conditional([Destination::End], |_| {
            Destination::Agent(AgentName::Booking)
        });
        let chosen = route.evaluate(&ConversationState::new("u"));
        assert!(!route.declares(chosen));
    }
}
