//! The two-phase query hook and its tracing implementation.

use std::sync::Arc;

use tracing::{field, Span};

use crate::attributes::{QueryAttributes, DB_NAME};
use crate::caller::CallerResolver;
use crate::config::Config;
use crate::event::QueryEvent;

/// `db.system.name` used when the configuration does not name one.
pub const DEFAULT_DB_SYSTEM: &str = "other_sql";

/// Observer of a database client's query lifecycle.
///
/// The client calls [`before_query`](Self::before_query) right before it
/// executes a statement and [`after_query`](Self::after_query) once the
/// statement finished, passing along the context returned by the first call.
/// Hooks run inline on the caller's task and must not block.
pub trait QueryHook: Send + Sync {
    fn before_query(&self, ctx: QueryContext, event: &QueryEvent<'_>) -> QueryContext;

    fn after_query(&self, ctx: QueryContext, event: &QueryEvent<'_>);
}

/// Tracing state carried from `before_query` to `after_query`.
///
/// `after_query` consumes the context, so a query span can be finished at
/// most once.
#[derive(Debug)]
pub struct QueryContext {
    parent: Span,
    query: Option<Span>,
}

impl QueryContext {
    /// Capture the ambient span as the parent of the next query.
    pub fn current() -> Self {
        Self::with_parent(Span::current())
    }

    pub fn with_parent(parent: Span) -> Self {
        Self {
            parent,
            query: None,
        }
    }

    /// The span the query should execute under: the query span if one was
    /// started, the parent otherwise.
    pub fn span(&self) -> &Span {
        self.query.as_ref().unwrap_or(&self.parent)
    }

    /// The span the query was issued under.
    pub fn parent(&self) -> &Span {
        &self.parent
    }

    /// Attach a query span.
    pub fn with_query_span(mut self, span: Span) -> Self {
        self.query = Some(span);
        self
    }

    /// Take the query span out, leaving the parent behind.
    pub fn into_query_span(self) -> Option<Span> {
        self.query
    }
}

/// [`QueryHook`] that opens a client span per query.
///
/// # Example
///
/// ```rust
/// use sea_orm_otel::{Config, QueryContext, QueryEvent, QueryHook, TracingHook};
///
/// let hook = TracingHook::new(Config::builder().with_db_system("postgresql").build());
///
/// let event = QueryEvent::new("SELECT", "SELECT 1");
/// let ctx = hook.before_query(QueryContext::current(), &event);
/// // ... run the query under `ctx.span()` ...
/// hook.after_query(ctx, &event);
/// ```
#[derive(Debug, Clone)]
pub struct TracingHook {
    config: Arc<Config>,
    resolver: CallerResolver,
    db_system: String,
}

impl Default for TracingHook {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl TracingHook {
    pub fn new(config: Config) -> Self {
        let db_system = config.db_system().unwrap_or(DEFAULT_DB_SYSTEM).to_string();
        Self {
            config: Arc::new(config),
            resolver: CallerResolver::default(),
            db_system,
        }
    }

    /// Replace the resolver used to attribute queries to call sites.
    pub fn with_caller_resolver(mut self, resolver: CallerResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_system(&self) -> &str {
        &self.db_system
    }
}

impl QueryHook for TracingHook {
    fn before_query(&self, ctx: QueryContext, _event: &QueryEvent<'_>) -> QueryContext {
        // Unsampled or untraced callers don't pay for a span.
        if ctx.parent().is_disabled() {
            return ctx;
        }

        let span = tracing::info_span!(
            parent: ctx.parent(),
            "db.query",
            otel.name = field::Empty,
            otel.kind = "client",
            otel.status_code = field::Empty,
            code.function.name = field::Empty,
            code.filepath = field::Empty,
            code.line.number = field::Empty,
            db.system.name = field::Empty,
            db.name = field::Empty,
            db.operation.name = field::Empty,
            db.statement = field::Empty,
            db.sql.table = field::Empty,
            db.rows_affected = field::Empty,
            error.message = field::Empty,
        );

        if let Some(name) = self.config.db_name() {
            span.record(DB_NAME, name);
        }

        ctx.with_query_span(span)
    }

    fn after_query(&self, ctx: QueryContext, event: &QueryEvent<'_>) {
        // The span closes when `span` is dropped, on every path out of here.
        let Some(span) = ctx.into_query_span() else {
            return;
        };
        if span.is_disabled() {
            return;
        }

        span.record("otel.name", event.operation());

        let caller = self.resolver.resolve();
        QueryAttributes::build(caller, &self.db_system, event).record(&span);

        if let Some(err) = event.outcome().error() {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", field::display(err));
            tracing::error!(parent: &span, error = %err, "query failed");
        }
    }
}
