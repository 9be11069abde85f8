//! Application state wiring the whole stack together.
//!
//! The HTTP handlers see only the conversation service; everything
//! underneath (engine, graphs, provider, stub backends, store) is wired
//! here once at startup. The interactive service and the polling
//! scheduler share one store and one engine, so a turn and a tick for
//! the same user serialize on the store's per-user lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use concierge_agents::graphs;
use concierge_agents::llm::{OpenAiDecisionProvider, OpenAiProviderConfig};
use concierge_agents::tools::{InMemoryCalendar, InMemoryMailbox, StaticBookingCatalog};
use concierge_core::bus::EventBus;
use concierge_core::decision::BoxDecisionProvider;
use concierge_core::engine::Engine;
use concierge_core::poll::{PollingConfig, PollingScheduler};
use concierge_core::service::ConversationService;
use concierge_core::store::MemoryConversationStore;

use crate::config::Config;

/// Lagging in-process observers drop events past this backlog.
const EVENT_BUS_CAPACITY: usize = 256;

pub type SharedStore = Arc<MemoryConversationStore>;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConversationService<SharedStore>>,
}

impl AppState {
    /// Wire services from config. The polling scheduler is returned
    /// separately (when enabled) so the caller controls its lifecycle.
    pub fn init(
        config: &Config,
    ) -> anyhow::Result<(Self, Option<PollingScheduler<SharedStore>>)> {
        let provider = Arc::new(BoxDecisionProvider::new(OpenAiDecisionProvider::new(
            OpenAiProviderConfig {
                api_key: config.api_key()?,
                base_url: config.provider.base_url.clone(),
                model: config.provider.model.clone(),
                max_attempts: config.provider.max_attempts,
            },
        )));

        let store: SharedStore = Arc::new(MemoryConversationStore::new());
        let engine = Engine::new(EventBus::new(EVENT_BUS_CAPACITY));

        // Stub backends, shared by both graphs. The sample data gives a
        // fresh install something to find on the first poll.
        let user = config.polling.user_id.as_str();
        let mailbox = Arc::new(InMemoryMailbox::with_sample_inbox(user));
        let calendar = Arc::new(InMemoryCalendar::with_sample_events(
            user,
            Utc::now() + chrono::Duration::days(1),
        ));

        let interactive = graphs::interactive_graph(
            provider.clone(),
            mailbox.clone(),
            calendar.clone(),
            StaticBookingCatalog,
            config.engine.max_steps,
        )?;
        let service = Arc::new(ConversationService::new(
            store.clone(),
            engine.clone(),
            Arc::new(interactive),
        ));

        let poller = if config.polling.enabled {
            let polling = graphs::polling_graph(
                provider,
                mailbox,
                calendar,
                config.engine.poll_max_steps,
            )?;
            Some(PollingScheduler::new(
                store,
                engine,
                Arc::new(polling),
                PollingConfig {
                    interval: Duration::from_secs(config.polling.interval_seconds),
                    user_id: config.polling.user_id.clone(),
                },
            )?)
        } else {
            None
        };

        Ok((Self { service }, poller))
    }
}
