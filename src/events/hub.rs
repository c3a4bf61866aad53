use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::{Event, Filter, Reply};

/// Priority used when a subscriber has no preference. Lower runs first.
pub const DEFAULT_PRIORITY: i32 = 100;

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event. Handlers may modify the event for the subscribers
    /// that run after them.
    async fn handle(&self, event: &mut Event) -> anyhow::Result<Option<Reply>>;
}

/// Runs on every published event before any subscriber sees it.
pub type PublishHook = Arc<dyn Fn(&mut Event) + Send + Sync>;

struct Subscription {
    id: u64,
    filter: Filter,
    priority: i32,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct HubState {
    subscriptions: Vec<Subscription>,
    hooks: Vec<PublishHook>,
    next_id: u64,
}

/// The published event after all subscribers ran, with their replies.
#[derive(Debug)]
pub struct Delivery {
    pub event: Event,
    pub replies: Vec<Reply>,
}

#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<RwLock<HubState>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events matching `filter`. Subscribers with the
    /// same priority run in subscription order.
    pub async fn subscribe(
        &self,
        filter: Filter,
        priority: i32,
        handler: Arc<dyn EventHandler>,
    ) -> u64 {
        let mut state = self.inner.write().await;
        let id = state.next_id;
        state.next_id += 1;

        debug!(subscription = id, filter = %filter, priority, "Subscribed");
        let index = state
            .subscriptions
            .partition_point(|s| s.priority <= priority);
        state.subscriptions.insert(
            index,
            Subscription {
                id,
                filter,
                priority,
                handler,
            },
        );
        id
    }

    pub async fn unsubscribe(&self, id: u64) -> bool {
        let mut state = self.inner.write().await;
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != id);
        state.subscriptions.len() != before
    }

    pub async fn add_publish_hook(&self, hook: PublishHook) {
        let mut state = self.inner.write().await;
        state.hooks.push(hook);
    }

    /// Deliver an event to every matching subscriber, in priority order.
    /// Handler errors are logged and do not stop delivery.
    pub async fn publish(&self, mut event: Event) -> Delivery {
        let (hooks, subscribers) = {
            let state = self.inner.read().await;
            let subscribers: Vec<(u64, Filter, Arc<dyn EventHandler>)> = state
                .subscriptions
                .iter()
                .map(|s| (s.id, s.filter.clone(), s.handler.clone()))
                .collect();
            (state.hooks.clone(), subscribers)
        };

        for hook in &hooks {
            hook(&mut event);
        }

        let topic = event.topic();
        debug!(event_id = %event.id, topic = %topic, "Publishing event");

        let mut replies = Vec::new();
        for (id, filter, handler) in subscribers {
            if !filter.matches(&event) {
                continue;
            }
            match handler.handle(&mut event).await {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) => {}
                Err(e) => {
                    error!(subscription = id, topic = %topic, error = %e, "Event handler failed");
                }
            }
        }

        Delivery { event, replies }
    }
}
