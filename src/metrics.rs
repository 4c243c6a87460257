//! Connection-pool gauges.
//!
//! Pool statistics are pulled: nothing is recorded on the query path. A
//! single callback, run by the meter provider's reader on each collection,
//! reads one [`PoolStats`] snapshot and observes all three gauges from it.

use std::sync::Arc;

use opentelemetry::metrics::{CallbackRegistration, Meter, MeterProvider, ObservableGauge, Observer};
use opentelemetry::KeyValue;

use crate::config::Config;
use crate::error::Result;

/// Name of the meter the gauges are created on.
pub const INSTRUMENTATION_NAME: &str = env!("CARGO_PKG_NAME");

/// Gauge names.
pub const POOL_CONNECTIONS_TOTAL: &str = "sea_orm.pool_connections_total";
pub const POOL_CONNECTIONS_IDLE: &str = "sea_orm.pool_connections_idle";
pub const POOL_CONNECTIONS_STALE: &str = "sea_orm.pool_connections_stale";

/// Point-in-time connection-pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_conns: u32,
    pub idle_conns: u32,
    /// Connections evicted as stale since the pool was created.
    pub stale_conns: u32,
}

/// Anything that can report the state of its connection pool.
///
/// Called from the metrics reader: implementations must return quickly and
/// must not wait on connections.
pub trait PoolStatsSource: Send + Sync + 'static {
    fn pool_stats(&self) -> PoolStats;
}

impl<F> PoolStatsSource for F
where
    F: Fn() -> PoolStats + Send + Sync + 'static,
{
    fn pool_stats(&self) -> PoolStats {
        self()
    }
}

struct PoolGauges {
    total: ObservableGauge<i64>,
    idle: ObservableGauge<i64>,
    stale: ObservableGauge<i64>,
}

impl PoolGauges {
    fn new(meter: &Meter) -> Result<Self> {
        Ok(Self {
            total: meter
                .i64_observable_gauge(POOL_CONNECTIONS_TOTAL)
                .with_description("Number of total connections in the pool")
                .try_init()?,
            idle: meter
                .i64_observable_gauge(POOL_CONNECTIONS_IDLE)
                .with_description("Number of idle connections in the pool")
                .try_init()?,
            stale: meter
                .i64_observable_gauge(POOL_CONNECTIONS_STALE)
                .with_description("Number of stale connections removed from the pool")
                .try_init()?,
        })
    }

    fn observe(&self, observer: &dyn Observer, stats: PoolStats, attrs: &[KeyValue]) {
        observer.observe_i64(&self.total, i64::from(stats.total_conns), attrs);
        observer.observe_i64(&self.idle, i64::from(stats.idle_conns), attrs);
        observer.observe_i64(&self.stale, i64::from(stats.stale_conns), attrs);
    }
}

/// Keeps the pool-stats callback registered.
///
/// Dropping the handle leaves the callback in place for the lifetime of the
/// meter provider; call [`unregister`](Self::unregister) to stop reporting.
pub struct PoolMetricsRegistration {
    registration: Box<dyn CallbackRegistration>,
}

impl PoolMetricsRegistration {
    pub fn unregister(mut self) -> Result<()> {
        self.registration.unregister()?;
        Ok(())
    }
}

impl std::fmt::Debug for PoolMetricsRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMetricsRegistration").finish_non_exhaustive()
    }
}

/// Report `source`'s pool statistics as gauges on the configured meter provider.
///
/// Each gauge carries the configuration's static attributes. An error means
/// the provider refused the instruments or the callback.
///
/// # Example
///
/// ```rust
/// use sea_orm_otel::{report_pool_metrics, Config, PoolStats};
///
/// let registration = report_pool_metrics(
///     || PoolStats { total_conns: 10, idle_conns: 4, stale_conns: 0 },
///     &Config::default(),
/// )
/// .expect("pool metrics");
/// # drop(registration);
/// ```
pub fn report_pool_metrics<S>(source: S, config: &Config) -> Result<PoolMetricsRegistration>
where
    S: PoolStatsSource,
{
    let meter = config.meter_provider().meter(INSTRUMENTATION_NAME);
    let gauges = PoolGauges::new(&meter)?;
    let attrs: Arc<[KeyValue]> = config.attributes().into();

    let instruments = [gauges.total.as_any(), gauges.idle.as_any(), gauges.stale.as_any()];
    let registration = meter.register_callback(&instruments, move |observer| {
        gauges.observe(observer, source.pool_stats(), &attrs);
    })?;

    tracing::debug!(
        meter = INSTRUMENTATION_NAME,
        attributes = config.attributes().len(),
        "pool metrics registered"
    );

    Ok(PoolMetricsRegistration { registration })
}
