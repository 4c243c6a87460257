//! SeaORM connection wrapper that runs a [`QueryHook`] around every statement.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement,
};
use tracing::Instrument;

use crate::config::{Config, ConfigOption};
use crate::event::{QueryEvent, QueryOutcome, RowCount};
use crate::hook::{QueryContext, QueryHook, TracingHook};
use crate::parser::ParsedSql;

/// A `DatabaseConnection` whose statements are reported to a [`QueryHook`].
///
/// Implements `ConnectionTrait`, so it can be passed wherever SeaORM expects
/// a connection. Transactions and streams are not hooked; reach them through
/// [`inner`](Self::inner).
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sea_orm_otel::{Config, HookedConnection, TracingHook};
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let hooked = HookedConnection::new(db, TracingHook::new(Config::default()));
///
/// let users = Users::find().all(&hooked).await?;
/// ```
pub struct HookedConnection {
    inner: DatabaseConnection,
    hook: Arc<dyn QueryHook>,
}

impl HookedConnection {
    pub fn new(connection: DatabaseConnection, hook: impl QueryHook + 'static) -> Self {
        Self::with_shared_hook(connection, Arc::new(hook))
    }

    /// Share one hook between several connections.
    pub fn with_shared_hook(connection: DatabaseConnection, hook: Arc<dyn QueryHook>) -> Self {
        Self {
            inner: connection,
            hook,
        }
    }

    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    pub fn hook(&self) -> &Arc<dyn QueryHook> {
        &self.hook
    }

    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }

    /// Run `execute` between the two hook phases and hand its result back
    /// untouched.
    async fn hooked<T, F, Fut>(
        &self,
        sql: &str,
        execute: F,
        rows: impl FnOnce(&T) -> u64,
    ) -> Result<T, DbErr>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DbErr>>,
    {
        let parsed = ParsedSql::parse(sql);
        let event = QueryEvent::new(parsed.operation.as_str(), sql).with_model(&parsed);

        let ctx = self.hook.before_query(QueryContext::current(), &event);
        let result = execute().instrument(ctx.span().clone()).await;

        let count = result.as_ref().ok().map(rows).map(RowCount);
        let mut event = event.with_outcome(QueryOutcome::of(&result));
        if let Some(count) = &count {
            event = event.with_result(count);
        }
        self.hook.after_query(ctx, &event);

        result
    }
}

impl std::fmt::Debug for HookedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookedConnection")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl AsRef<DatabaseConnection> for HookedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for HookedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let sql = stmt.sql.clone();
        self.hooked(&sql, || self.inner.execute(stmt), exec_rows).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        self.hooked(sql, || self.inner.execute_unprepared(sql), exec_rows).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        self.hooked(&sql, || self.inner.query_one(stmt), |row: &Option<QueryResult>| {
            u64::from(row.is_some())
        })
        .await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        self.hooked(&sql, || self.inner.query_all(stmt), |rows: &Vec<QueryResult>| {
            rows.len() as u64
        })
        .await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

fn exec_rows(result: &ExecResult) -> u64 {
    result.rows_affected()
}

/// `db.system.name` for a SeaORM backend, as named by the OpenTelemetry
/// semantic conventions.
pub fn db_system(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "postgresql",
        DbBackend::MySql => "mysql",
        DbBackend::Sqlite => "sqlite",
    }
}

/// Extension trait for wrapping a connection with the tracing hook.
pub trait TracingExt {
    /// Wrap with a [`TracingHook`] whose database system is the backend's.
    fn with_query_tracing(self) -> HookedConnection;

    /// Same, with extra options applied after the backend's system, so an
    /// explicit `DbSystem` option still wins.
    fn with_query_tracing_options(
        self,
        options: impl IntoIterator<Item = ConfigOption>,
    ) -> HookedConnection;
}

impl TracingExt for DatabaseConnection {
    fn with_query_tracing(self) -> HookedConnection {
        self.with_query_tracing_options([])
    }

    fn with_query_tracing_options(
        self,
        options: impl IntoIterator<Item = ConfigOption>,
    ) -> HookedConnection {
        let system = ConfigOption::DbSystem(db_system(self.get_database_backend()).to_string());
        let config = Config::from_options(std::iter::once(system).chain(options));
        HookedConnection::new(self, TracingHook::new(config))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{MockDatabase, MockExecResult, Value};

    use super::*;
    use crate::testing;

    fn update(backend: DbBackend) -> Statement {
        Statement::from_string(backend, "UPDATE users SET active = true WHERE id = 1")
    }

    #[tokio::test]
    async fn test_execute_reports_rows() {
        let capture = testing::capture();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection()
            .with_query_tracing();

        let result = db
            .execute(update(DbBackend::Postgres))
            .instrument(tracing::info_span!("request"))
            .await
            .unwrap();
        assert_eq!(result.rows_affected(), 3);

        let span = capture.single("db.query");
        assert_eq!(span.field("otel.name"), Some("UPDATE"));
        assert_eq!(span.field("db.system.name"), Some("postgresql"));
        assert_eq!(span.field("db.sql.table"), Some("users"));
        assert_eq!(span.field("db.rows_affected"), Some("3"));
        assert_eq!(span.field("otel.status_code"), None);
        assert!(span.closed);
    }

    #[tokio::test]
    async fn test_error_is_recorded_and_returned() {
        let capture = testing::capture();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_errors(vec![DbErr::Custom("constraint violation".into())])
            .into_connection()
            .with_query_tracing();

        let err = db
            .execute(Statement::from_string(
                DbBackend::Postgres,
                "INSERT INTO users (id) VALUES (1)",
            ))
            .instrument(tracing::info_span!("request"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbErr::Custom(ref msg) if msg == "constraint violation"));

        let span = capture.single("db.query");
        assert_eq!(span.field("otel.name"), Some("INSERT"));
        assert_eq!(span.field("otel.status_code"), Some("ERROR"));
        assert_eq!(span.field("db.rows_affected"), None);
        assert_eq!(span.errors().len(), 1);
        assert!(span.errors()[0].contains("constraint violation"));
        assert!(span.closed);
    }

    #[tokio::test]
    async fn test_record_not_found_is_not_an_error() {
        let capture = testing::capture();
        let db = MockDatabase::new(DbBackend::MySql)
            .append_exec_errors(vec![DbErr::RecordNotFound("user 1".into())])
            .into_connection()
            .with_query_tracing();

        let err = db
            .execute(update(DbBackend::MySql))
            .instrument(tracing::info_span!("request"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbErr::RecordNotFound(_)));

        let span = capture.single("db.query");
        assert_eq!(span.field("db.system.name"), Some("mysql"));
        assert_eq!(span.field("otel.status_code"), None);
        assert!(span.errors().is_empty());
    }

    #[tokio::test]
    async fn test_query_all_counts_returned_rows() {
        let capture = testing::capture();
        let row = |id: i32| BTreeMap::from([("id", Value::from(id))]);
        let db = MockDatabase::new(DbBackend::Sqlite)
            .append_query_results(vec![vec![row(1), row(2)]])
            .into_connection()
            .with_query_tracing_options([ConfigOption::DbName("main".into())]);

        let rows = db
            .query_all(Statement::from_string(DbBackend::Sqlite, "SELECT id FROM users"))
            .instrument(tracing::info_span!("request"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let span = capture.single("db.query");
        assert_eq!(span.field("otel.name"), Some("SELECT"));
        assert_eq!(span.field("db.rows_affected"), Some("2"));
        assert_eq!(span.field("db.name"), Some("main"));
        assert_eq!(span.field("db.system.name"), Some("sqlite"));
    }

    #[tokio::test]
    async fn test_untraced_caller_gets_no_span() {
        let capture = testing::capture();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection()
            .with_query_tracing();

        let result = db.execute(update(DbBackend::Postgres)).await.unwrap();
        assert_eq!(result.rows_affected(), 1);
        assert!(capture.named("db.query").is_empty());
    }

    #[tokio::test]
    async fn test_shared_hook_serves_several_connections() {
        let capture = testing::capture();
        let hook: Arc<dyn QueryHook> = Arc::new(TracingHook::new(
            Config::builder().with_db_system("postgresql").build(),
        ));
        let connect = || {
            MockDatabase::new(DbBackend::Postgres)
                .append_exec_results(vec![MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection()
        };
        let primary = HookedConnection::with_shared_hook(connect(), hook.clone());
        let replica = HookedConnection::with_shared_hook(connect(), hook);

        for db in [&primary, &replica] {
            db.execute(update(DbBackend::Postgres))
                .instrument(tracing::info_span!("request"))
                .await
                .unwrap();
        }

        assert!(Arc::ptr_eq(primary.hook(), replica.hook()));
        let spans = capture.named("db.query");
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|span| span.field("db.rows_affected") == Some("1")));
    }

    #[tokio::test]
    async fn test_explicit_system_overrides_backend() {
        let capture = testing::capture();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection()
            .with_query_tracing_options([ConfigOption::DbSystem("cockroachdb".into())]);

        db.execute_unprepared("TRUNCATE TABLE sessions")
            .instrument(tracing::info_span!("request"))
            .await
            .unwrap();

        let span = capture.single("db.query");
        assert_eq!(span.field("db.system.name"), Some("cockroachdb"));
        assert_eq!(span.field("otel.name"), Some("TRUNCATE"));
        assert_eq!(span.field("db.rows_affected"), Some("0"));
    }
}
