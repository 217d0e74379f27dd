//! Lightweight SQL classification for span fields.
//!
//! Only the leading keyword and the primary table are inspected; the text is
//! never rewritten.

use once_cell::sync::Lazy;
use regex::Regex;

/// Statement kind, recorded as `db.operation`.
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

impl SqlOperation {
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

    /// Classify by the first keyword, ignoring leading comments.
    pub fn classify(sql: &str) -> Self {
        let keyword = LEADING_KEYWORD
            .captures(sql)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_uppercase())
            .unwrap_or_default();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" | "TABLE" => SqlOperation::Select,
            "INSERT" => SqlOperation::Insert,
            "UPDATE" => SqlOperation::Update,
            "DELETE" => SqlOperation::Delete,
            "CREATE" => SqlOperation::Create,
            "DROP" => SqlOperation::Drop,
            "ALTER" => SqlOperation::Alter,
            "TRUNCATE" => SqlOperation::Truncate,
            "BEGIN" | "START" => SqlOperation::Begin,
            "COMMIT" | "END" => SqlOperation::Commit,
            "ROLLBACK" | "ABORT" => SqlOperation::Rollback,
            "SET" => SqlOperation::Set,
            _ => SqlOperation::Other,
        }
    }

    fn table_pattern(&self) -> Option<&'static Regex> {
        let pattern = match self {
            SqlOperation::Select | SqlOperation::Delete => &FROM_TABLE,
            SqlOperation::Insert => &INTO_TABLE,
            SqlOperation::Update => &UPDATE_TABLE,
            SqlOperation::Create | SqlOperation::Drop | SqlOperation::Alter => &DDL_TABLE,
            SqlOperation::Truncate => &TRUNCATE_TABLE,
            _ => return None,
        };
        Some(&**pattern)
    }
}

impl std::fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Skips whitespace, `-- line` and `/* block */` comments and opening parentheses.
static LEADING_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s+|--[^\n]*\n?|/\*(?s:.*?)\*/|\()*([A-Za-z]+)").expect("valid regex")
});

// A possibly schema-qualified, possibly quoted identifier; group 1 is the bare name.
const IDENT: &str = r#"(?:[`"\[]?\w+[`"\]]?\.)?[`"\[]?(\w+)[`"\]]?"#;

static FROM_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bFROM\s+(?:ONLY\s+)?{IDENT}")).expect("valid regex"));

static INTO_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bINTO\s+{IDENT}")).expect("valid regex"));

static UPDATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\bUPDATE\s+(?:ONLY\s+)?{IDENT}")).expect("valid regex")
});

static DDL_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:CREATE|DROP|ALTER)\s+(?:(?:GLOBAL|LOCAL)\s+)?(?:TEMP(?:ORARY)?\s+|UNLOGGED\s+)?TABLE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?{IDENT}"
    ))
    .expect("valid regex")
});

static TRUNCATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\bTRUNCATE\s+(?:TABLE\s+)?(?:ONLY\s+)?{IDENT}")).expect("valid regex")
});

/// Operation and primary table of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSummary {
    pub operation: SqlOperation,
    pub table: Option<String>,
}

impl SqlSummary {
    pub fn parse(sql: &str) -> Self {
        let operation = SqlOperation::classify(sql);
        let table = operation
            .table_pattern()
            .and_then(|re| re.captures(sql))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase());
        Self { operation, table }
    }
}
