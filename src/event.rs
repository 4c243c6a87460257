//! The per-query record a database client hands to its hooks.

use std::error::Error as StdError;

use sea_orm::DbErr;

use crate::error::Result;

/// Structured view of a query, as far as the client knows it.
pub trait QueryModel: Send + Sync {
    /// The primary table the query targets, if known.
    fn table_name(&self) -> Option<&str>;
}

/// Handle to a finished query's result.
pub trait RowsAffected: Send + Sync {
    /// Number of rows the query affected or returned.
    fn rows_affected(&self) -> Result<i64>;
}

/// A row count reported by the client as an unsigned number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCount(pub u64);

impl RowsAffected for RowCount {
    fn rows_affected(&self) -> Result<i64> {
        Ok(i64::try_from(self.0)?)
    }
}

/// How a query ended.
#[derive(Debug, Clone, Copy, Default)]
pub enum QueryOutcome<'a> {
    /// The query succeeded, or has not run yet.
    #[default]
    Success,
    /// The query matched no row. Expected, so not treated as a failure.
    NotFound,
    /// Any other error.
    Failed(&'a (dyn StdError + Send + Sync + 'static)),
}

impl<'a> QueryOutcome<'a> {
    /// Classify a SeaORM result. `DbErr::RecordNotFound` is the not-found sentinel.
    pub fn of<T>(result: &'a Result<T, DbErr>) -> Self {
        match result {
            Ok(_) => QueryOutcome::Success,
            Err(err) => Self::from(err),
        }
    }

    /// The error to record on the span, if any.
    pub fn error(&self) -> Option<&'a (dyn StdError + Send + Sync + 'static)> {
        match self {
            QueryOutcome::Failed(err) => Some(*err),
            QueryOutcome::Success | QueryOutcome::NotFound => None,
        }
    }
}

impl<'a> From<&'a DbErr> for QueryOutcome<'a> {
    fn from(err: &'a DbErr) -> Self {
        match err {
            DbErr::RecordNotFound(_) => QueryOutcome::NotFound,
            other => QueryOutcome::Failed(other),
        }
    }
}

/// Everything a hook learns about one query.
///
/// The client builds the event before execution (outcome `Success`, no
/// result) and completes it with [`with_outcome`](Self::with_outcome) and
/// [`with_result`](Self::with_result) before calling `after_query`.
#[derive(Clone, Copy)]
pub struct QueryEvent<'a> {
    operation: &'a str,
    query: &'a str,
    model: Option<&'a dyn QueryModel>,
    outcome: QueryOutcome<'a>,
    result: Option<&'a dyn RowsAffected>,
}

impl<'a> QueryEvent<'a> {
    pub fn new(operation: &'a str, query: &'a str) -> Self {
        Self {
            operation,
            query,
            model: None,
            outcome: QueryOutcome::Success,
            result: None,
        }
    }

    pub fn with_model(mut self, model: &'a dyn QueryModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_outcome(mut self, outcome: QueryOutcome<'a>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_result(mut self, result: &'a dyn RowsAffected) -> Self {
        self.result = Some(result);
        self
    }

    /// Operation kind, e.g. `SELECT`.
    pub fn operation(&self) -> &'a str {
        self.operation
    }

    /// Raw query text.
    pub fn query(&self) -> &'a str {
        self.query
    }

    pub fn model(&self) -> Option<&'a dyn QueryModel> {
        self.model
    }

    pub fn outcome(&self) -> QueryOutcome<'a> {
        self.outcome
    }

    pub fn result(&self) -> Option<&'a dyn RowsAffected> {
        self.result
    }

    /// Table name from the query object, empty names filtered out.
    pub fn table_name(&self) -> Option<&'a str> {
        self.model
            .and_then(|model| model.table_name())
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for QueryEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEvent")
            .field("operation", &self.operation)
            .field("query", &self.query)
            .field("table", &self.table_name())
            .field("outcome", &self.outcome)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}
