//! Fixed-interval polling scheduler.
//!
//! Each tick is an independent engine run over a restricted graph whose
//! entry fetches external events: a fresh state is seeded from the
//! persisted per-user scratch, run to terminal, and the scratch written
//! back. A tick failure is logged and the schedule continues; only
//! cancellation stops the loop, and only between ticks, so a run is
//! never aborted mid-state-mutation.
//!
//! The graph handed to the scheduler must not know the human gate at
//! all -- an unattended loop must never block on human input. That is
//! checked at construction, not at tick time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use concierge_types::agent::AgentName;
use concierge_types::conversation::{ConversationState, Destination};
use concierge_types::error::StoreError;
use concierge_types::event::EngineEvent;

use crate::engine::{Engine, EngineError};
use crate::graph::definition::{ConfigurationError, GraphDefinition};
use crate::store::{ConversationStore, UserScratch};

/// Why a single tick failed. Never propagated out of the loop.
#[derive(Debug, Error)]
pub enum TickFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    /// The user whose mailbox this schedule watches.
    pub user_id: String,
}

/// Recurring runner for the unattended graph.
pub struct PollingScheduler<S> {
    store: S,
    engine: Engine,
    graph: Arc<GraphDefinition>,
    config: PollingConfig,
}

impl<S: ConversationStore + 'static> PollingScheduler<S> {
    /// Rejects graphs that register or route to the human gate.
    pub fn new(
        store: S,
        engine: Engine,
        graph: Arc<GraphDefinition>,
        config: PollingConfig,
    ) -> Result<Self, ConfigurationError> {
        if graph.has_handler(AgentName::HumanGate)
            || graph.any_route_declares(Destination::Agent(AgentName::HumanGate))
        {
            return Err(ConfigurationError::GateInUnattendedGraph);
        }
        Ok(Self {
            store,
            engine,
            graph,
            config,
        })
    }

    /// Start the schedule on its own task. The first tick fires
    /// immediately, then every `interval`.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run_loop(cancel))
    }

    async fn run_loop(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            user = %self.config.user_id,
            interval_seconds = self.config.interval.as_secs(),
            graph = self.graph.name(),
            "polling scheduler started"
        );

        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(user = %self.config.user_id, ticks = tick, "polling scheduler stopped");
                    return;
                }
                _ = interval.tick() => {}
            }
            tick += 1;

            match self.run_tick(tick).await {
                Ok(events_found) => {
                    debug!(tick, events_found, "polling tick finished");
                }
                Err(err) => {
                    warn!(tick, error = %err, "polling tick failed; schedule continues");
                    self.engine.bus().publish(EngineEvent::TickFailed {
                        tick,
                        user_id: self.config.user_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    /// One tick: fresh state from scratch, engine run, scratch written
    /// back. Returns how many external events the entry handler found.
    async fn run_tick(&self, tick: u64) -> Result<u32, TickFailure> {
        let started = Instant::now();
        self.engine.bus().publish(EngineEvent::TickStarted {
            tick,
            user_id: self.config.user_id.clone(),
        });

        let lock = self.store.user_lock(&self.config.user_id);
        let _guard = lock.lock().await;

        let scratch = self.store.load_scratch(&self.config.user_id).await?;
        let mut state = ConversationState::new(self.config.user_id.clone());
        scratch.seed(&mut state);

        let state = self.engine.run(self.graph.as_ref(), state).await?;

        let mut next_scratch = UserScratch::from_state(&state);
        if state.requires_human {
            // No gate here; leave a marker the next interactive run can
            // surface to the user.
            next_scratch
                .context
                .insert("attention_required".to_string(), Value::Bool(true));
        }
        self.store
            .save_scratch(&self.config.user_id, &next_scratch)
            .await?;

        let events_found = state
            .email_data
            .get("unprocessed_emails")
            .and_then(Value::as_array)
            .map(|emails| emails.len() as u32)
            .unwrap_or(0);
        self.engine.bus().publish(EngineEvent::TickCompleted {
            tick,
            user_id: self.config.user_id.clone(),
            events_found,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(events_found)
    }
}
