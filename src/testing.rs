//! Test support: a subscriber layer that keeps every span it sees.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: HashMap<&'static str, String>,
}

#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub fields: HashMap<&'static str, String>,
    pub events: Vec<CapturedEvent>,
    pub closed: bool,
}

impl CapturedSpan {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// `error` fields of ERROR-level events recorded under this span.
    pub fn errors(&self) -> Vec<String> {
        self.events
            .iter()
            .filter(|event| event.level == Level::ERROR)
            .filter_map(|event| event.fields.get("error").cloned())
            .collect()
    }
}

#[derive(Default)]
struct State {
    // Registry ids are recycled once a span closes, so closed spans move out.
    open: HashMap<u64, CapturedSpan>,
    closed: Vec<CapturedSpan>,
}

/// Spans captured on the current thread; capture stops when this is dropped.
pub struct Capture {
    state: Arc<Mutex<State>>,
    _guard: DefaultGuard,
}

impl Capture {
    pub fn spans(&self) -> Vec<CapturedSpan> {
        let state = self.state.lock().unwrap();
        state.closed.iter().chain(state.open.values()).cloned().collect()
    }

    pub fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|span| span.name == name).collect()
    }

    /// The only span called `name`; panics if there are none or several.
    pub fn single(&self, name: &str) -> CapturedSpan {
        let mut spans = self.named(name);
        assert_eq!(spans.len(), 1, "expected exactly one `{name}` span");
        spans.remove(0)
    }
}

/// Install a capturing subscriber as the thread's default.
pub fn capture() -> Capture {
    let state = Arc::new(Mutex::new(State::default()));
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        state: state.clone(),
    });
    Capture {
        state,
        _guard: tracing::subscriber::set_default(subscriber),
    }
}

struct CaptureLayer {
    state: Arc<Mutex<State>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut span = CapturedSpan {
            name: attrs.metadata().name(),
            fields: HashMap::new(),
            events: Vec::new(),
            closed: false,
        };
        attrs.record(&mut FieldVisitor(&mut span.fields));
        self.state.lock().unwrap().open.insert(id.into_u64(), span);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        if let Some(span) = self.state.lock().unwrap().open.get_mut(&id.into_u64()) {
            values.record(&mut FieldVisitor(&mut span.fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(parent) = ctx.event_span(event) else {
            return;
        };
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        if let Some(span) = self.state.lock().unwrap().open.get_mut(&parent.id().into_u64()) {
            span.events.push(CapturedEvent {
                level: *event.metadata().level(),
                fields,
            });
        }
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        let mut state = self.state.lock().unwrap();
        if let Some(mut span) = state.open.remove(&id.into_u64()) {
            span.closed = true;
            state.closed.push(span);
        }
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<&'static str, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name(), format!("{value:?}"));
    }
}
