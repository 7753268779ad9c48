//! Event capture for unit tests.
//!
//! An [`EventLog`] layer over the `tracing_subscriber` registry records the
//! level, message and fields of every event; spans are left to the registry.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{
    Event,
    Level,
    Subscriber,
    dispatcher::DefaultGuard,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Layer,
    Registry,
    layer::{Context, SubscriberExt},
};

/// One captured event.
#[derive(Debug)]
pub(crate) struct RecordedEvent {
    level: Level,
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl RecordedEvent {
    pub(crate) const fn level(&self) -> Level { self.level }

    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub(crate) fn message(&self) -> Option<&str> { self.message.as_deref() }
}

#[derive(Default)]
struct EventFields {
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.fields.insert(field.name().to_owned(), value.to_owned());
        }
    }
}

#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<RecordedEvent>>>);

impl EventLog {
    fn lock(&self) -> MutexGuard<'_, Vec<RecordedEvent>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventFields::default();
        event.record(&mut visitor);
        self.lock().push(RecordedEvent {
            level: *event.metadata().level(),
            fields: visitor.fields,
            message: visitor.message,
        });
    }
}

/// Events recorded on the current thread while this value is alive.
///
/// Suits `#[tokio::test]`, whose runtime polls every future on the test
/// thread.
pub(crate) struct EventCapture {
    log: EventLog,
    _guard: DefaultGuard,
}

impl EventCapture {
    /// Drain the events recorded so far.
    pub(crate) fn take(&self) -> Vec<RecordedEvent> { std::mem::take(&mut *self.log.lock()) }
}

/// Start recording events on the current thread.
pub(crate) fn capture_events() -> EventCapture {
    let log = EventLog::default();
    let guard = tracing::subscriber::set_default(Registry::default().with(log.clone()));
    EventCapture { log, _guard: guard }
}

/// Capture the single event emitted by `f`.
pub(crate) fn capture_single_event(f: impl FnOnce()) -> RecordedEvent {
    let capture = capture_events();
    f();
    let mut events = capture.take();
    assert_eq!(events.len(), 1, "expected exactly one tracing event");
    events.pop().expect("one event")
}
