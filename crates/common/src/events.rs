//! Event bus shared by the pipeline, plugins and the scheduler.
//!
//! The bus is an explicit value: clone it into every component that needs to
//! publish or subscribe. Clones share the same subscriber table.
//!
//! Delivery takes a snapshot of the subscribers for the event's kind, then
//! releases the table lock before calling any handler. A handler subscribed
//! while an event is being delivered only sees later events. A handler that
//! returns an error or panics never stops delivery to the others; its
//! failure is published as [`EventKind::ErrorOccurred`].

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::unwind::catch_panic;

#[cfg(feature = "metrics")]
use chatrelay_metrics::{counter, events as event_metrics, labels};

// ── EventKind ───────────────────────────────────────────────────────────────

/// Closed set of event categories carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageReceived,
    MessageSent,
    AiThinking,
    AiResponse,
    CommandMatched,
    ErrorOccurred,
    BotStarted,
    BotStopped,
    ScheduleTriggered,
}

impl EventKind {
    /// All variants, for iteration.
    pub const ALL: &'static [EventKind] = &[
        Self::MessageReceived,
        Self::MessageSent,
        Self::AiThinking,
        Self::AiResponse,
        Self::CommandMatched,
        Self::ErrorOccurred,
        Self::BotStarted,
        Self::BotStopped,
        Self::ScheduleTriggered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::MessageSent => "message_sent",
            Self::AiThinking => "ai_thinking",
            Self::AiResponse => "ai_response",
            Self::CommandMatched => "command_matched",
            Self::ErrorOccurred => "error_occurred",
            Self::BotStarted => "bot_started",
            Self::BotStopped => "bot_stopped",
            Self::ScheduleTriggered => "schedule_triggered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event ───────────────────────────────────────────────────────────────────

/// String-keyed event payload.
pub type Payload = Map<String, Value>;

/// A single bus message. Built with the `with*` methods, then frozen by
/// [`EventBus::publish`]; handlers only ever see `&Event`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    kind: EventKind,
    payload: Payload,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: Payload::new(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Add a payload entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Name the component that produced the event.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Payload entry as a string slice, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

// ── EventHandler ────────────────────────────────────────────────────────────

/// A bus subscriber.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Identity reported in `ErrorOccurred` events when this handler fails.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

/// Wrap a synchronous closure as an [`EventHandler`].
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

// ── EventBus ────────────────────────────────────────────────────────────────

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

struct HandlerFailure {
    handler: String,
    error: String,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Publish/subscribe bus keyed by [`EventKind`].
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(event = %kind, handler = handler.name(), subscription = %id, "event subscribed");
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_default()
            .push(Subscriber { id, handler });
        id
    }

    /// Remove a subscription. Returns false if the token was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for subs in table.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
        }
        table.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Deliver an event to every current subscriber of its kind.
    ///
    /// Returns once all handlers in the snapshot have finished. Handler
    /// failures are reported on the bus, never to the publisher.
    pub async fn publish(&self, event: Event) {
        let event = Arc::new(event);

        #[cfg(feature = "metrics")]
        counter!(event_metrics::PUBLISHED_TOTAL, labels::EVENT => event.kind().as_str())
            .increment(1);

        let failures = self.deliver(&event).await;
        if failures.is_empty() {
            return;
        }

        if event.kind() == EventKind::ErrorOccurred {
            // Reporting these would feed the same handlers again.
            for failure in failures {
                warn!(
                    handler = %failure.handler,
                    error = %failure.error,
                    "error_occurred handler failed"
                );
            }
            return;
        }

        for failure in failures {
            #[cfg(feature = "metrics")]
            counter!(event_metrics::HANDLER_FAILURES_TOTAL, labels::EVENT => event.kind().as_str())
                .increment(1);

            let report = Event::new(EventKind::ErrorOccurred)
                .with("context", "event_handler")
                .with("origin_kind", event.kind().as_str())
                .with("handler", failure.handler)
                .with("error", failure.error)
                .with_source("event_bus");
            let report = Arc::new(report);
            for nested in self.deliver(&report).await {
                warn!(
                    handler = %nested.handler,
                    error = %nested.error,
                    "error_occurred handler failed"
                );
            }
        }
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Subscriber> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    async fn deliver(&self, event: &Arc<Event>) -> Vec<HandlerFailure> {
        let subscribers = self.snapshot(event.kind());
        if subscribers.is_empty() {
            return Vec::new();
        }

        debug!(event = %event.kind(), count = subscribers.len(), "delivering event");

        let futures = subscribers.into_iter().map(|sub| {
            let event = Arc::clone(event);
            async move {
                let result = catch_panic(sub.handler.handle(&event)).await;
                (sub.handler, result)
            }
        });

        let mut failures = Vec::new();
        for (handler, result) in futures::future::join_all(futures).await {
            if let Err(e) = result {
                warn!(
                    handler = handler.name(),
                    event = %event.kind(),
                    error = %e,
                    "event handler failed"
                );
                failures.push(HandlerFailure {
                    handler: handler.name().to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
        failures
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder(name: &str, seen: Arc<Mutex<Vec<Event>>>) -> Arc<dyn EventHandler> {
        handler_fn(name, move |event| {
            seen.lock().unwrap().push(event.clone());
            Ok(())
        })
    }

    #[tokio::test]
    async fn delivers_only_to_subscribed_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventKind::AiResponse, recorder("ai", Arc::clone(&seen)));

        bus.publish(Event::new(EventKind::MessageReceived)).await;
        bus.publish(Event::new(EventKind::AiResponse).with("text", "hi"))
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get_str("text"), Some("hi"));
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            EventKind::MessageReceived,
            handler_fn("broken", |_| anyhow::bail!("boom")),
        );
        bus.subscribe(EventKind::MessageReceived, recorder("healthy", Arc::clone(&seen)));
        bus.subscribe(EventKind::ErrorOccurred, recorder("errors", Arc::clone(&errors)));

        bus.publish(Event::new(EventKind::MessageReceived)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].get_str("origin_kind"), Some("message_received"));
        assert_eq!(errors[0].get_str("handler"), Some("broken"));
        assert_eq!(errors[0].get_str("error"), Some("boom"));
    }

    #[tokio::test]
    async fn panicking_subscriber_is_reported_like_a_failure() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            EventKind::MessageSent,
            handler_fn("panicky", |_| panic!("subscriber panicked")),
        );
        bus.subscribe(EventKind::MessageSent, recorder("healthy", Arc::clone(&seen)));
        bus.subscribe(EventKind::ErrorOccurred, recorder("errors", Arc::clone(&errors)));

        bus.publish(Event::new(EventKind::MessageSent)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].get_str("handler"), Some("panicky"));
        assert_eq!(errors[0].get_str("error"), Some("panicked: subscriber panicked"));
    }

    #[tokio::test]
    async fn failing_error_handler_is_not_republished() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        bus.subscribe(
            EventKind::ErrorOccurred,
            handler_fn("loop", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("still broken")
            }),
        );

        bus.publish(Event::new(EventKind::ErrorOccurred)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscription_added_during_delivery_misses_current_event() {
        struct Subscribing {
            bus: EventBus,
            late: Arc<Mutex<Vec<Event>>>,
        }

        #[async_trait]
        impl EventHandler for Subscribing {
            fn name(&self) -> &str {
                "subscribing"
            }

            async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
                self.bus.subscribe(
                    EventKind::BotStarted,
                    recorder("late", Arc::clone(&self.late)),
                );
                Ok(())
            }
        }

        let bus = EventBus::new();
        let late = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            EventKind::BotStarted,
            Arc::new(Subscribing {
                bus: bus.clone(),
                late: Arc::clone(&late),
            }),
        );

        bus.publish(Event::new(EventKind::BotStarted).with("n", 1)).await;
        assert!(late.lock().unwrap().is_empty());

        bus.publish(Event::new(EventKind::BotStarted).with("n", 2)).await;
        let late = late.lock().unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].get("n"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn subscriber_sees_events_in_publish_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventKind::MessageSent, recorder("order", Arc::clone(&seen)));

        for i in 0..5 {
            bus.publish(Event::new(EventKind::MessageSent).with("i", i))
                .await;
        }

        let order: Vec<i64> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.get("i").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe(EventKind::AiThinking, recorder("tmp", Arc::clone(&seen)));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(EventKind::AiThinking), 0);

        bus.publish(Event::new(EventKind::AiThinking)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn clones_share_subscribers() {
        let bus = EventBus::new();
        let other = bus.clone();
        other.subscribe(EventKind::BotStopped, handler_fn("x", |_| Ok(())));
        assert_eq!(bus.subscriber_count(EventKind::BotStopped), 1);
        bus.clear();
        assert_eq!(other.subscription_count(), 0);
    }

    #[test]
    fn kind_names_are_snake_case() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
