//! Basic example showing how to use sea-orm-otel.
//!
//! Run with: cargo run --example basic

use opentelemetry::KeyValue;
use sea_orm::{ConnectionTrait, Database, DbBackend, Statement};
use sea_orm_otel::prelude::*;
use sea_orm_otel::{report_pool_metrics, ConfigOption, PoolStats};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sea_orm_otel=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/test".into());

    tracing::info!("Connecting to database...");

    let db = Database::connect(&database_url).await?;

    // Pool gauges go to the global meter provider. A refused registration
    // ends startup here.
    let pool = db.get_postgres_connection_pool().clone();
    let _metrics = report_pool_metrics(
        move || PoolStats {
            total_conns: pool.size(),
            idle_conns: u32::try_from(pool.num_idle()).unwrap_or(u32::MAX),
            stale_conns: 0,
        },
        &Config::builder()
            .with_db_name("test")
            .with_attributes([KeyValue::new("service.name", "basic-example")])
            .build(),
    )?;

    let db = db.with_query_tracing_options([ConfigOption::DbName("test".into())]);

    // Queries outside a span are not traced; this one runs inside `request`.
    db.execute(Statement::from_string(DbBackend::Postgres, "SELECT 1"))
        .instrument(tracing::info_span!("request"))
        .await?;

    tracing::info!("Database connection established with query tracing enabled");

    Ok(())
}
