//! Configuration shared by the query hook and the pool-metrics reporter.

use std::borrow::Cow;
use std::sync::Arc;

use opentelemetry::global::{self, GlobalMeterProvider};
use opentelemetry::metrics::MeterProvider;
use opentelemetry::{Key, KeyValue, Value};

use crate::attributes::{DB_NAME, DB_SYSTEM};

/// Rewrites query text before it is attached to telemetry.
pub type QueryFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One configuration setting.
///
/// Options are applied in order. Attribute options accumulate; the meter
/// provider and the query formatter are overwritten by later options.
#[derive(Clone)]
pub enum ConfigOption {
    /// Append static attributes, used to tag the pool gauges.
    Attributes(Vec<KeyValue>),
    /// Append a `db.system.name` attribute.
    DbSystem(String),
    /// Append a `db.name` attribute.
    DbName(String),
    /// Use this provider instead of the global one.
    MeterProvider(GlobalMeterProvider),
    /// Set a query formatter. The base hook does not apply it.
    QueryFormatter(QueryFormatter),
}

impl std::fmt::Debug for ConfigOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigOption::Attributes(attrs) => f.debug_tuple("Attributes").field(attrs).finish(),
            ConfigOption::DbSystem(system) => f.debug_tuple("DbSystem").field(system).finish(),
            ConfigOption::DbName(name) => f.debug_tuple("DbName").field(name).finish(),
            ConfigOption::MeterProvider(_) => f.write_str("MeterProvider(..)"),
            ConfigOption::QueryFormatter(_) => f.write_str("QueryFormatter(..)"),
        }
    }
}

/// Frozen configuration.
///
/// # Example
///
/// ```rust
/// use opentelemetry::KeyValue;
/// use sea_orm_otel::Config;
///
/// let config = Config::builder()
///     .with_db_system("postgresql")
///     .with_db_name("orders")
///     .with_attributes([KeyValue::new("service.name", "checkout")])
///     .build();
///
/// assert_eq!(config.db_system(), Some("postgresql"));
/// assert_eq!(config.attributes().len(), 3);
/// ```
#[derive(Clone)]
pub struct Config {
    attributes: Arc<[KeyValue]>,
    meter_provider: GlobalMeterProvider,
    query_formatter: Option<QueryFormatter>,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Build a configuration from option values, applied left to right.
    pub fn from_options(options: impl IntoIterator<Item = ConfigOption>) -> Self {
        options
            .into_iter()
            .fold(ConfigBuilder::new(), ConfigBuilder::apply)
            .build()
    }

    /// Static attributes in the order they were added.
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn meter_provider(&self) -> &GlobalMeterProvider {
        &self.meter_provider
    }

    /// The configured `db.system.name`, last one wins.
    pub fn db_system(&self) -> Option<&str> {
        self.last_str(DB_SYSTEM)
    }

    /// The configured `db.name`, last one wins.
    pub fn db_name(&self) -> Option<&str> {
        self.last_str(DB_NAME)
    }

    /// Apply the query formatter, if one is set.
    pub fn format_query<'q>(&self, query: &'q str) -> Cow<'q, str> {
        match &self.query_formatter {
            Some(format) => Cow::Owned(format(query)),
            None => Cow::Borrowed(query),
        }
    }

    fn last_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .rev()
            .find(|kv| kv.key.as_str() == key)
            .and_then(|kv| match &kv.value {
                Value::String(value) => Some(value.as_str()),
                _ => None,
            })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("attributes", &self.attributes)
            .field("query_formatter", &self.query_formatter.is_some())
            .finish_non_exhaustive()
    }
}

/// Accumulates options into a [`Config`].
pub struct ConfigBuilder {
    attributes: Vec<KeyValue>,
    meter_provider: GlobalMeterProvider,
    query_formatter: Option<QueryFormatter>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Start from the process-wide meter provider and no attributes.
    pub fn new() -> Self {
        Self {
            attributes: Vec::new(),
            meter_provider: global::meter_provider(),
            query_formatter: None,
        }
    }

    /// Apply one option.
    pub fn apply(mut self, option: ConfigOption) -> Self {
        match option {
            ConfigOption::Attributes(attrs) => self.attributes.extend(attrs),
            ConfigOption::DbSystem(system) => {
                self.attributes.push(KeyValue::new(Key::from_static_str(DB_SYSTEM), system))
            }
            ConfigOption::DbName(name) => {
                self.attributes.push(KeyValue::new(Key::from_static_str(DB_NAME), name))
            }
            ConfigOption::MeterProvider(provider) => self.meter_provider = provider,
            ConfigOption::QueryFormatter(format) => self.query_formatter = Some(format),
        }
        self
    }

    pub fn with_attributes(self, attrs: impl IntoIterator<Item = KeyValue>) -> Self {
        self.apply(ConfigOption::Attributes(attrs.into_iter().collect()))
    }

    /// Set the database system. Prefer the names from the OpenTelemetry
    /// semantic conventions (`postgresql`, `mysql`, `sqlite`, ...).
    pub fn with_db_system(self, system: impl Into<String>) -> Self {
        self.apply(ConfigOption::DbSystem(system.into()))
    }

    pub fn with_db_name(self, name: impl Into<String>) -> Self {
        self.apply(ConfigOption::DbName(name.into()))
    }

    /// Create instruments on `provider` rather than the global provider.
    pub fn with_meter_provider<P>(self, provider: P) -> Self
    where
        P: MeterProvider + Send + Sync + 'static,
    {
        self.apply(ConfigOption::MeterProvider(GlobalMeterProvider::new(provider)))
    }

    pub fn with_query_formatter<F>(self, format: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.apply(ConfigOption::QueryFormatter(Arc::new(format)))
    }

    pub fn build(self) -> Config {
        Config {
            attributes: self.attributes.into(),
            meter_provider: self.meter_provider,
            query_formatter: self.query_formatter,
        }
    }
}
