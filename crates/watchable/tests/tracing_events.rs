//! Structured log events emitted by dispatch and decoding.
//!
//! A capturing layer is installed as the thread's default subscriber for the
//! duration of each test, so events from concurrently running tests do not
//! leak in.

use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};
use watchable::{
    JsonValueFormat, ListenerError, TextCodec, TypeRegistry, Watchable, WatchableConfig,
};

type Captured = Arc<Mutex<Vec<(Level, String)>>>;

struct CaptureLayer {
    events: Captured,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.message));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
    let events = Captured::default();
    let subscriber = Registry::default().with(CaptureLayer {
        events: Arc::clone(&events),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().unwrap().clone();
    (result, events)
}

fn has(events: &[(Level, String)], level: Level, message: &str) -> bool {
    events.iter().any(|(l, m)| *l == level && m == message)
}

#[test]
fn listener_failure_is_logged_as_warning() {
    let cell = Watchable::new(1);
    cell.try_watch(|_, _| Err(ListenerError::new("disk full")));

    let (result, events) = capture(|| cell.set(2));

    assert!(result.is_err());
    assert!(has(&events, Level::WARN, "change listener failed"));
}

#[test]
fn per_listener_trace_is_opt_in() {
    let quiet = Watchable::new(0);
    quiet.watch(|_, _| {});
    let (_, events) = capture(|| quiet.set(1));
    assert!(!has(&events, Level::TRACE, "invoking change listener"));

    let config = WatchableConfig::new().with_trace_dispatch(true);
    let loud = Watchable::with_config(Some(0), config);
    loud.watch(|_, _| {});
    loud.watch(|_, _| {});
    let (_, events) = capture(|| loud.set(1));
    let invocations = events
        .iter()
        .filter(|(l, m)| *l == Level::TRACE && m == "invoking change listener")
        .count();
    assert_eq!(invocations, 2);
}

#[test]
fn rejected_envelope_is_logged() {
    let registry = TypeRegistry::with_builtins();
    let codec = TextCodec::with_registry(JsonValueFormat, &registry);

    let (result, events) =
        capture(|| codec.from_json_dyn(r#"{"type":"gone::Type","value":"1"}"#));

    assert!(result.is_err());
    assert!(has(&events, Level::WARN, "envelope type rejected"));
}

#[test]
fn registration_is_logged_once() {
    let (_, events) = capture(|| {
        let registry = TypeRegistry::<JsonValueFormat>::new();
        registry.register::<i32>().ok();
        registry.register::<i32>().ok();
    });
    let registrations = events
        .iter()
        .filter(|(l, m)| *l == Level::DEBUG && m == "registered wire type")
        .count();
    assert_eq!(registrations, 1);
}
