//! Semantic attributes for a finished query.

use tracing::Span;

use crate::caller::Caller;
use crate::event::QueryEvent;

pub const CODE_FUNCTION: &str = "code.function.name";
pub const CODE_FILEPATH: &str = "code.filepath";
pub const CODE_LINENO: &str = "code.line.number";
pub const DB_SYSTEM: &str = "db.system.name";
pub const DB_NAME: &str = "db.name";
pub const DB_OPERATION: &str = "db.operation.name";
pub const DB_STATEMENT: &str = "db.statement";
pub const DB_TABLE: &str = "db.sql.table";
pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";

/// A recorded attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue<'a> {
    Str(&'a str),
    Int(i64),
}

/// Attributes of one query, computed once.
///
/// The keys are fixed; only `db.sql.table` and `db.rows_affected` may be
/// absent.
#[derive(Debug, Clone)]
pub struct QueryAttributes<'a> {
    caller: Caller,
    db_system: &'a str,
    operation: &'a str,
    statement: &'a str,
    table: Option<&'a str>,
    rows_affected: Option<i64>,
}

impl<'a> QueryAttributes<'a> {
    /// Collect the attributes for `event`, attributed to `caller`.
    ///
    /// A failing row count is dropped without a trace: it is a telemetry
    /// detail, never a reason to disturb the query path.
    pub fn build(caller: Caller, db_system: &'a str, event: &QueryEvent<'a>) -> Self {
        let rows_affected = event
            .result()
            .and_then(|result| result.rows_affected().ok());

        Self {
            caller,
            db_system,
            operation: event.operation(),
            statement: event.query(),
            table: event.table_name(),
            rows_affected,
        }
    }

    /// Key/value pairs in emission order.
    pub fn fields(&self) -> Vec<(&'static str, AttributeValue<'_>)> {
        let mut fields = vec![
            (CODE_FUNCTION, AttributeValue::Str(&self.caller.function)),
            (CODE_FILEPATH, AttributeValue::Str(&self.caller.file)),
            (CODE_LINENO, AttributeValue::Int(i64::from(self.caller.line))),
            (DB_SYSTEM, AttributeValue::Str(self.db_system)),
            (DB_OPERATION, AttributeValue::Str(self.operation)),
            (DB_STATEMENT, AttributeValue::Str(self.statement)),
        ];
        if let Some(table) = self.table {
            fields.push((DB_TABLE, AttributeValue::Str(table)));
        }
        if let Some(rows) = self.rows_affected {
            fields.push((DB_ROWS_AFFECTED, AttributeValue::Int(rows)));
        }
        fields
    }

    /// Record every attribute on `span`. The span must declare the keys.
    pub fn record(&self, span: &Span) {
        for (key, value) in self.fields() {
            match value {
                AttributeValue::Str(value) => span.record(key, value),
                AttributeValue::Int(value) => span.record(key, value),
            };
        }
    }
}
