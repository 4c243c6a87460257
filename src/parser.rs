//! Derives the operation name and primary table from SQL text.
//!
//! SeaORM hands the connection plain statements, so the hook's query object
//! is reconstructed here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::QueryModel;

/// SQL operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Begin,
    Commit,
    Rollback,
    Set,
    Other,
}

/// Leading keywords and the operation they introduce. `WITH` is treated as a
/// read since CTEs are overwhelmingly used in front of `SELECT`.
const KEYWORDS: &[(&str, SqlOperation)] = &[
    ("SELECT", SqlOperation::Select),
    ("WITH", SqlOperation::Select),
    ("INSERT", SqlOperation::Insert),
    ("UPDATE", SqlOperation::Update),
    ("DELETE", SqlOperation::Delete),
    ("CREATE", SqlOperation::Create),
    ("DROP", SqlOperation::Drop),
    ("ALTER", SqlOperation::Alter),
    ("TRUNCATE", SqlOperation::Truncate),
    ("BEGIN", SqlOperation::Begin),
    ("START", SqlOperation::Begin),
    ("COMMIT", SqlOperation::Commit),
    ("ROLLBACK", SqlOperation::Rollback),
    ("SET", SqlOperation::Set),
];

impl SqlOperation {
    /// Returns the operation as used for span names.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperation::Select => "SELECT",
            SqlOperation::Insert => "INSERT",
            SqlOperation::Update => "UPDATE",
            SqlOperation::Delete => "DELETE",
            SqlOperation::Create => "CREATE",
            SqlOperation::Drop => "DROP",
            SqlOperation::Alter => "ALTER",
            SqlOperation::Truncate => "TRUNCATE",
            SqlOperation::Begin => "BEGIN",
            SqlOperation::Commit => "COMMIT",
            SqlOperation::Rollback => "ROLLBACK",
            SqlOperation::Set => "SET",
            SqlOperation::Other => "QUERY",
        }
    }

    /// Parse the operation from the first keyword of a statement.
    pub fn parse(sql: &str) -> Self {
        let first = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
            .next()
            .unwrap_or_default();

        KEYWORDS
            .iter()
            .find(|(keyword, _)| first.eq_ignore_ascii_case(keyword))
            .map(|(_, op)| *op)
            .unwrap_or(SqlOperation::Other)
    }

    fn table_regex(&self) -> Option<&'static Regex> {
        let regex = match self {
            SqlOperation::Select => &SELECT_TABLE,
            SqlOperation::Insert => &INSERT_TABLE,
            SqlOperation::Update => &UPDATE_TABLE,
            SqlOperation::Delete => &DELETE_TABLE,
            SqlOperation::Create => &CREATE_TABLE,
            SqlOperation::Drop => &DROP_TABLE,
            SqlOperation::Alter => &ALTER_TABLE,
            SqlOperation::Truncate => &TRUNCATE_TABLE,
            _ => return None,
        };
        Some(Lazy::force(regex))
    }
}

impl std::fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// An identifier, optionally quoted with backticks, double quotes or brackets.
macro_rules! table_pattern {
    ($prefix:literal) => {
        Lazy::new(|| {
            Regex::new(concat!("(?i)", $prefix, r#"[`"\[]?(\w+)[`"\]]?"#))
                .expect("table pattern is a valid regex")
        })
    };
}

static SELECT_TABLE: Lazy<Regex> = table_pattern!(r"\bFROM\s+");
static INSERT_TABLE: Lazy<Regex> = table_pattern!(r"\bINSERT\s+INTO\s+");
static UPDATE_TABLE: Lazy<Regex> = table_pattern!(r"\bUPDATE\s+");
static DELETE_TABLE: Lazy<Regex> = table_pattern!(r"\bDELETE\s+FROM\s+");
static CREATE_TABLE: Lazy<Regex> = table_pattern!(
    r"\bCREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?"
);
static DROP_TABLE: Lazy<Regex> = table_pattern!(r"\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?");
static ALTER_TABLE: Lazy<Regex> = table_pattern!(r"\bALTER\s+TABLE\s+");
static TRUNCATE_TABLE: Lazy<Regex> = table_pattern!(r"\bTRUNCATE\s+(?:TABLE\s+)?");

/// Operation and table of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    pub operation: SqlOperation,
    pub table: Option<String>,
}

impl ParsedSql {
    pub fn parse(sql: &str) -> Self {
        let operation = SqlOperation::parse(sql);
        let table = operation
            .table_regex()
            .and_then(|regex| regex.captures(sql))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase());
        Self { operation, table }
    }
}

impl QueryModel for ParsedSql {
    fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }
}
