//! # sea-orm-otel
//!
//! Query-hook instrumentation for SeaORM.
//!
//! A [`QueryHook`] is told about every statement twice: right before it runs
//! and right after it finished. The bundled [`TracingHook`] turns that into a
//! client span per query, attributed to the application function that issued
//! it. [`report_pool_metrics`] exposes connection-pool statistics as
//! pull-based OpenTelemetry gauges.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use sea_orm_otel::TracingExt;
//!
//! let db = Database::connect("postgres://localhost/mydb").await?;
//! let db = db.with_query_tracing();
//!
//! // Use it exactly like a normal DatabaseConnection
//! let users = Users::find().all(&db).await?;
//! ```
//!
//! Spans are only created when the caller is inside a recording span, so
//! untraced code paths pay nothing beyond a check of the current span.
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use opentelemetry::KeyValue;
//! use sea_orm_otel::{Config, HookedConnection, TracingHook};
//!
//! let config = Config::builder()
//!     .with_db_system("postgresql")
//!     .with_db_name("orders")
//!     .with_attributes([KeyValue::new("service.name", "checkout")])
//!     .build();
//!
//! let db = HookedConnection::new(db, TracingHook::new(config));
//! ```
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `otel.name` | The operation, e.g. `SELECT` |
//! | `otel.kind` | Always `client` |
//! | `code.function.name` | Function that issued the query |
//! | `code.filepath` | Its source file |
//! | `code.line.number` | Its line |
//! | `db.system.name` | `postgresql`, `mysql`, `sqlite`, ... |
//! | `db.name` | Database name (when configured) |
//! | `db.operation.name` | SQL operation |
//! | `db.statement` | Full SQL text |
//! | `db.sql.table` | Target table (when known) |
//! | `db.rows_affected` | Rows affected or returned (when known) |
//! | `otel.status_code` | `ERROR` on failure; "not found" is not a failure |
//! | `error.message` | Error details (on failure) |
//!
//! ## Pool Gauges
//!
//! | Gauge | Description |
//! |-------|-------------|
//! | `sea_orm.pool_connections_total` | Connections in the pool |
//! | `sea_orm.pool_connections_idle` | Idle connections |
//! | `sea_orm.pool_connections_stale` | Connections evicted as stale |

mod attributes;
mod caller;
mod config;
mod connection;
mod error;
mod event;
mod hook;
mod metrics;
mod parser;

#[cfg(test)]
mod testing;

pub use attributes::{AttributeValue, QueryAttributes};
pub use caller::{Caller, CallerResolver, Frame};
pub use config::{Config, ConfigBuilder, ConfigOption, QueryFormatter};
pub use connection::{db_system, HookedConnection, TracingExt};
pub use error::{Error, Result};
pub use event::{QueryEvent, QueryModel, QueryOutcome, RowCount, RowsAffected};
pub use hook::{QueryContext, QueryHook, TracingHook, DEFAULT_DB_SYSTEM};
pub use metrics::{
    report_pool_metrics, PoolMetricsRegistration, PoolStats, PoolStatsSource,
    POOL_CONNECTIONS_IDLE, POOL_CONNECTIONS_STALE, POOL_CONNECTIONS_TOTAL,
};
pub use parser::{ParsedSql, SqlOperation};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{Config, HookedConnection, QueryHook, TracingExt, TracingHook};
}
